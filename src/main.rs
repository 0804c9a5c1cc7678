mod cli;

use hlsvod::{
    config, server,
    session::{playlist, EncodingPlan, QualityLadder},
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    // Load config
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting hlsvod server");
    tracing::info!(
        "Serving media from {:?}, writing sessions to {:?}",
        config.server.media_path,
        config.streaming.output_root
    );

    server::start_server(config).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            // Verbose mode: trace for the engine, debug for HTTP
            "hlsvod=trace,hlsvod_av=debug,hlsvod_media=debug,tower_http=debug".to_string()
        } else {
            // Normal mode: debug for the engine, info for HTTP requests
            "hlsvod=debug,hlsvod_av=info,hlsvod_media=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            // Create tokio runtime
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Probe { file, json } => probe_file(&file, cli.config.as_deref(), json),
        Commands::Segments { file } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(print_segments(&file, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("hlsvod {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn format_duration(secs: f64) -> String {
    let total = secs as u64;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total / 3600,
        (total / 60) % 60,
        total % 60,
        ((secs - total as f64) * 1000.0).round() as u64 % 1000
    )
}

fn probe_file(
    file: &std::path::Path,
    config_path: Option<&std::path::Path>,
    json: bool,
) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let media = hlsvod_av::probe_with(file, config.tools.ffprobe_path.as_deref())
        .with_context(|| format!("Failed to probe {:?}", file))?;

    if json {
        let json_str = serde_json::to_string_pretty(&media)?;
        println!("{}", json_str);
        return Ok(());
    }

    println!("File: {}", media.file_path.display());
    println!("Container: {}", media.container);
    println!("Size: {} bytes", media.file_size);
    println!("Duration: {}", format_duration(media.duration));
    if let Some(rate) = media.video_bit_rate() {
        println!("Video bitrate: {} kb/s", rate / 1000);
    }

    let video = &media.video;
    print!("\nVideo: [{}] {}", video.index, video.codec);
    if let (Some(w), Some(h)) = (video.width, video.height) {
        print!(" {}x{} ({})", w, h, media.resolution_label());
    }
    if let Some(fps) = video.frame_rate {
        print!(", {:.3} fps", fps);
    }
    println!();

    println!("\nAudio Tracks: {}", media.audio_streams.len());
    for track in &media.audio_streams {
        print!("  [{}] {}", track.index, track.codec);
        if let Some(channels) = track.channels {
            print!(" {}ch", channels);
        }
        if let Some(ref lang) = track.language {
            print!(" ({})", lang);
        }
        if track.default {
            print!(" [default]");
        }
        println!();
    }

    println!("\nSubtitle Tracks: {}", media.subtitle_streams.len());
    for track in &media.subtitle_streams {
        print!("  [{}] {}", track.index, track.codec);
        if let Some(ref lang) = track.language {
            print!(" ({})", lang);
        }
        if track.forced {
            print!(" [forced]");
        }
        if track.default {
            print!(" [default]");
        }
        println!();
    }

    Ok(())
}

async fn print_segments(file: &std::path::Path, config_path: Option<&std::path::Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let options = config.session_options();
    let ffprobe = config.tools.ffprobe_path.clone();

    let probe_path = file.to_path_buf();
    let media = tokio::task::spawn_blocking(move || hlsvod_av::probe_with(&probe_path, ffprobe.as_deref()))
        .await?
        .with_context(|| format!("Failed to probe {:?}", file))?;

    let ladder = QualityLadder::build(&media, &options.ladder_options());
    let plan = EncodingPlan::new(&media, options.segment_length, options.hardcode_subtitles);
    let timelines = playlist::build_timelines(
        &media,
        &plan,
        &ladder,
        config.tools.ffprobe_path.as_deref(),
    )
    .await?;

    println!("Duration: {}", format_duration(media.duration));
    println!(
        "Segment length: {}s{}",
        plan.actual_segment_length_string(),
        if plan.is_ntsc() { " (NTSC)" } else { "" }
    );
    if ladder.is_fallback() {
        println!("Warning: source bitrate is below every rendition, using fallback");
    }

    for rendition in ladder.renditions() {
        let (width, height) = rendition.encode_size(&media);
        let marker = if rendition.name == ladder.selected().name { "*" } else { " " };
        println!(
            "\n{} {} {}x{} {} kb/s{}",
            marker,
            rendition.name,
            width,
            height,
            rendition.bandwidth() / 1000,
            if plan.copies_video(&media, rendition) { " (copy)" } else { "" }
        );

        let Some(timeline) = timelines.get(&rendition.name) else {
            continue;
        };
        println!(
            "  {} segments, total {:.3}s, longest {:.3}s",
            timeline.segment_count(),
            timeline.total_duration(),
            timeline.max_segment_duration()
        );
        for segment in &timeline.segments {
            println!(
                "  {:>5}  {}  {:.6}",
                segment.index,
                format_duration(segment.start_secs),
                segment.duration_secs
            );
        }
    }

    Ok(())
}

fn check_tools(config_path: Option<&std::path::Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = hlsvod_av::check_tools(
        config.tools.ffmpeg_path.as_deref(),
        config.tools.ffprobe_path.as_deref(),
    );
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. ffmpeg and ffprobe are both required to stream.");
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    let streaming = &config.streaming;
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Media path: {:?}", config.server.media_path);
    println!("  Output root: {:?}", streaming.output_root);
    println!("  Segment length: {}s", streaming.segment_length);
    println!("  Lookahead window: {} segments", streaming.window_size);
    println!("  Restart cool-down: {}ms", streaming.restart_cooldown_ms);
    println!("  Watch mode: {:?}", streaming.watch_mode);
    match streaming.idle_timeout() {
        Some(timeout) => println!("  Idle timeout: {}s", timeout.as_secs()),
        None => println!("  Idle timeout: disabled"),
    }

    Ok(())
}
