//! FFprobe-based media probing.

use super::types::*;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: String,
    format_long_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: String,
    codec_name: Option<String>,
    profile: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<String>,
    bit_rate: Option<String>,
    #[serde(default)]
    disposition: FfprobeDisposition,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    default: u8,
    #[serde(default)]
    forced: u8,
    #[serde(default)]
    attached_pic: u8,
}

impl FfprobeStream {
    fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Stream bitrate, falling back to the statistics tags muxers such as
    /// mkvmerge write (`BPS`, `BPS-eng`, `NUMBER_OF_BYTES` over `DURATION`).
    fn bit_rate(&self) -> Option<u64> {
        if let Some(rate) = self.bit_rate.as_deref().and_then(|s| s.parse().ok()) {
            return Some(rate);
        }
        for key in ["BPS", "BPS-eng"] {
            if let Some(rate) = self.tag(key).and_then(|s| s.trim().parse().ok()) {
                return Some(rate);
            }
        }

        let bytes: u64 = self
            .tag("NUMBER_OF_BYTES")
            .or_else(|| self.tag("NUMBER_OF_BYTES-eng"))?
            .trim()
            .parse()
            .ok()?;
        let seconds = self
            .tag("DURATION")
            .or_else(|| self.tag("DURATION-eng"))
            .and_then(parse_timestamp)?;
        if seconds <= 0.0 {
            return None;
        }
        Some((bytes as f64 * 8.0 / seconds).round() as u64)
    }

    fn frame_rate(&self) -> Option<f64> {
        self.avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| self.r_frame_rate.as_deref().and_then(parse_frame_rate))
    }
}

/// Probe a media file using the given ffprobe binary.
pub fn probe_with_ffprobe(ffprobe: &Path, path: &Path) -> Result<SourceMedia> {
    if !path.exists() {
        return Err(Error::file_not_found(path));
    }

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found("ffprobe")
            } else {
                Error::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::tool_failed("ffprobe", stderr.to_string()));
    }

    let json_str = String::from_utf8(output.stdout)
        .map_err(|e| Error::parse_error("ffprobe", format!("Invalid UTF-8: {}", e)))?;

    parse_ffprobe_json(path, &json_str)
}

/// Parse ffprobe `-print_format json -show_format -show_streams` output.
pub fn parse_ffprobe_json(path: &Path, json: &str) -> Result<SourceMedia> {
    let output: FfprobeOutput = serde_json::from_str(json)?;
    parse_ffprobe_output(path, output)
}

fn parse_ffprobe_output(path: &Path, output: FfprobeOutput) -> Result<SourceMedia> {
    let duration = output
        .format
        .duration
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| Error::parse_error("ffprobe", "missing or invalid duration"))?;

    let mut video = None;
    let mut audio_streams = Vec::new();
    let mut subtitle_streams = Vec::new();

    for stream in &output.streams {
        match stream.codec_type.as_str() {
            // First video stream wins; embedded cover art is reported as video.
            "video" if video.is_none() && !is_cover_art(stream) => {
                video = Some(VideoStream {
                    index: stream.index,
                    codec: stream.codec_name.clone().unwrap_or_default(),
                    profile: stream.profile.clone(),
                    width: stream.width,
                    height: stream.height,
                    bit_rate: stream.bit_rate(),
                    frame_rate: stream.frame_rate(),
                    pix_fmt: stream.pix_fmt.clone(),
                });
            }
            "audio" => {
                audio_streams.push(AudioStream {
                    index: stream.index,
                    codec: stream.codec_name.clone().unwrap_or_default(),
                    channels: stream.channels,
                    sample_rate: stream.sample_rate.as_deref().and_then(|s| s.parse().ok()),
                    bit_rate: stream.bit_rate(),
                    language: stream.tag("language").map(str::to_string),
                    title: stream.tag("title").map(str::to_string),
                    default: stream.disposition.default == 1,
                });
            }
            "subtitle" => {
                subtitle_streams.push(SubtitleStream {
                    index: stream.index,
                    codec: stream.codec_name.clone().unwrap_or_default(),
                    language: stream.tag("language").map(str::to_string),
                    title: stream.tag("title").map(str::to_string),
                    default: stream.disposition.default == 1,
                    forced: stream.disposition.forced == 1,
                });
            }
            _ => {}
        }
    }

    let video = video.ok_or_else(|| Error::NoVideoStream {
        path: path.to_path_buf(),
    })?;

    let container = output
        .format
        .format_long_name
        .unwrap_or(output.format.format_name);

    Ok(SourceMedia {
        file_path: path.to_path_buf(),
        file_size: output.format.size.and_then(|s| s.parse().ok()).unwrap_or(0),
        container,
        duration,
        bit_rate: output.format.bit_rate.and_then(|s| s.parse().ok()),
        video,
        audio_streams,
        subtitle_streams,
    })
}

fn is_cover_art(stream: &FfprobeStream) -> bool {
    stream.disposition.attached_pic == 1
}

pub(crate) fn parse_frame_rate(rate_str: &str) -> Option<f64> {
    let parts: Vec<&str> = rate_str.split('/').collect();
    if parts.len() == 2 {
        let num: f64 = parts[0].parse().ok()?;
        let den: f64 = parts[1].parse().ok()?;
        if den != 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    rate_str.parse().ok().filter(|r: &f64| *r > 0.0)
}

/// Parse an `HH:MM:SS.fraction` timestamp into seconds.
fn parse_timestamp(s: &str) -> Option<f64> {
    let mut total = 0.0;
    for part in s.trim().split(':') {
        total = total * 60.0 + part.parse::<f64>().ok()?;
    }
    Some(total)
}
