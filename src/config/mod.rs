mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./hlsvod.toml",
        "./config.toml",
        "~/.config/hlsvod/config.toml",
        "/etc/hlsvod/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file: {:?}", path);
            return load_config(path);
        }
    }

    // Return default config if no file found
    Ok(Config::default())
}

fn expand_paths(config: &mut Config) {
    let expand = |path: &Path| -> std::path::PathBuf {
        std::path::PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
    };

    config.server.media_path = expand(&config.server.media_path);
    config.streaming.output_root = expand(&config.streaming.output_root);
    if let Some(path) = &config.tools.ffmpeg_path {
        config.tools.ffmpeg_path = Some(expand(path));
    }
    if let Some(path) = &config.tools.ffprobe_path {
        config.tools.ffprobe_path = Some(expand(path));
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if !config.server.media_path.exists() {
        tracing::warn!("Media path does not exist: {:?}", config.server.media_path);
    }

    let streaming = &config.streaming;
    if streaming.output_root.as_os_str().is_empty() {
        anyhow::bail!("Streaming output root cannot be empty");
    }
    if streaming.segment_length == 0 {
        anyhow::bail!("Segment length must be at least 1 second");
    }
    if streaming.window_size == 0 {
        anyhow::bail!("Lookahead window size must be at least 1 segment");
    }
    if streaming.wait_attempts == 0 {
        tracing::warn!("wait_attempts is 0: segments not yet written will never be waited for");
    }

    Ok(())
}
