//! Quality ladder.
//!
//! The ladder is the set of renditions offered for one source, ordered by
//! descending video bitrate, plus the one currently being encoded.

use super::{Error, Result};
use hlsvod_av::SourceMedia;
use serde::Serialize;

/// Candidate renditions, highest first.
const CANDIDATES: &[(&str, u32, u64, u64)] = &[
    ("1080p", 1080, 7_200_000, 224_000),
    ("720p", 720, 4_000_000, 160_000),
    ("480p", 480, 2_400_000, 128_000),
    ("360p", 360, 1_200_000, 112_000),
];

/// Audio bitrate used for a direct rendition when the source does not say.
const DEFAULT_AUDIO_BIT_RATE: u64 = 128_000;

/// Default network bitrate cap.
pub const DEFAULT_MAX_NETWORK_BITRATE: u64 = 7_200_000;

/// Video codecs the HLS/MPEG-TS output can carry without re-encoding.
const DIRECT_VIDEO_CODECS: &[&str] = &["h264"];

/// The exact source geometry a direct rendition mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DirectSource {
    pub width: u32,
    pub height: u32,
    pub bit_rate: u64,
}

/// One quality variant of the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rendition {
    /// Name used in playlist and segment file names.
    pub name: String,
    /// Target vertical resolution.
    pub height: u32,
    /// Nominal video bitrate in bits per second.
    pub video_bit_rate: u64,
    /// Nominal audio bitrate in bits per second.
    pub audio_bit_rate: u64,
    /// Set when this rendition copies the source video instead of encoding it.
    pub direct: Option<DirectSource>,
}

impl Rendition {
    fn candidate(&(name, height, video_bit_rate, audio_bit_rate): &(&str, u32, u64, u64)) -> Self {
        Self {
            name: name.to_string(),
            height,
            video_bit_rate,
            audio_bit_rate,
            direct: None,
        }
    }

    /// Whether this rendition passes the source video through.
    pub fn is_direct(&self) -> bool {
        self.direct.is_some()
    }

    /// Combined bitrate advertised in the master playlist.
    pub fn bandwidth(&self) -> u64 {
        self.video_bit_rate + self.audio_bit_rate
    }

    /// Nominal 3:2 width for this rendition's height.
    pub fn nominal_width(&self) -> u32 {
        self.height * 3 / 2
    }

    /// Output frame size for a given source.
    ///
    /// Direct renditions keep the source size. Otherwise the height follows
    /// the source aspect ratio at the nominal width, truncated to even.
    pub fn encode_size(&self, source: &SourceMedia) -> (u32, u32) {
        if let Some(direct) = self.direct {
            return (direct.width, direct.height);
        }

        let width = self.nominal_width();
        let height = match source.aspect_ratio() {
            Some(aspect) => even((width as f64 / aspect).trunc() as u32),
            None => self.height,
        };
        (width, height.max(2))
    }
}

fn even(n: u32) -> u32 {
    n - n % 2
}

/// Inputs to ladder construction beyond the source itself.
#[derive(Debug, Clone, Copy)]
pub struct LadderOptions {
    /// Highest video bitrate any rendition may use.
    pub max_network_bitrate: u64,
}

impl Default for LadderOptions {
    fn default() -> Self {
        Self {
            max_network_bitrate: DEFAULT_MAX_NETWORK_BITRATE,
        }
    }
}

/// Ordered renditions plus the selected one.
#[derive(Debug, Clone, Serialize)]
pub struct QualityLadder {
    renditions: Vec<Rendition>,
    selected: usize,
    fallback: bool,
}

impl QualityLadder {
    /// Build the ladder for a source.
    ///
    /// Never empty: when no candidate fits under both the network cap and the
    /// source bitrate, the lowest candidate is offered alone and the ladder
    /// is flagged as a fallback.
    pub fn build(source: &SourceMedia, options: &LadderOptions) -> Self {
        let cap = options.max_network_bitrate;
        let source_rate = source.video_bit_rate();

        let mut renditions: Vec<Rendition> = CANDIDATES
            .iter()
            .filter(|c| c.2 <= cap && source_rate.map_or(true, |rate| c.2 <= rate))
            .map(Rendition::candidate)
            .collect();
        let mut selected = 0;

        if let Some(direct) = direct_rendition(source, cap) {
            renditions.retain(|r| r.video_bit_rate != direct.video_bit_rate);
            let index = renditions
                .iter()
                .position(|r| r.video_bit_rate < direct.video_bit_rate)
                .unwrap_or(renditions.len());
            renditions.insert(index, direct);
            selected = index;
        }

        let fallback = renditions.is_empty();
        if fallback {
            tracing::error!(
                source_bit_rate = ?source_rate,
                cap,
                "Source bitrate too low for any rendition, falling back to lowest"
            );
            if let Some(lowest) = CANDIDATES.last() {
                renditions.push(Rendition::candidate(lowest));
            }
            selected = 0;
        }

        Self {
            renditions,
            selected,
            fallback,
        }
    }

    /// All renditions, highest bitrate first.
    pub fn renditions(&self) -> &[Rendition] {
        &self.renditions
    }

    /// The rendition currently being encoded.
    pub fn selected(&self) -> &Rendition {
        &self.renditions[self.selected]
    }

    /// Index of the selected rendition.
    pub fn selected_index(&self) -> usize {
        self.selected
    }

    /// Whether the ladder had to fall back to a single low rendition.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// Look up a rendition by name.
    pub fn get(&self, name: &str) -> Option<&Rendition> {
        self.renditions.iter().find(|r| r.name == name)
    }

    /// Rendition names in ladder order.
    pub fn names(&self) -> Vec<String> {
        self.renditions.iter().map(|r| r.name.clone()).collect()
    }

    /// Select a rendition by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RenditionNotFound`] and leaves the selection alone if
    /// no rendition has this name.
    pub fn select_by_name(&mut self, name: &str) -> Result<&Rendition> {
        let Some(index) = self.renditions.iter().position(|r| r.name == name) else {
            tracing::warn!(rendition = %name, "Rendition not found");
            return Err(Error::RenditionNotFound(name.to_string()));
        };
        self.selected = index;
        Ok(&self.renditions[index])
    }

    /// Output frame size of the selected rendition.
    pub fn encode_size(&self, source: &SourceMedia) -> (u32, u32) {
        self.selected().encode_size(source)
    }
}

/// The passthrough rendition, when the source video can be copied as-is and
/// fits under the network cap.
fn direct_rendition(source: &SourceMedia, cap: u64) -> Option<Rendition> {
    let codec = source.video.codec.to_lowercase();
    if !DIRECT_VIDEO_CODECS.contains(&codec.as_str()) {
        return None;
    }
    let bit_rate = source.video_bit_rate()?;
    if bit_rate > cap {
        return None;
    }
    let (width, height) = (source.video.width?, source.video.height?);

    Some(Rendition {
        name: format!("{}_direct", source.resolution_label()),
        height,
        video_bit_rate: bit_rate,
        audio_bit_rate: source
            .default_audio()
            .map(|a| a.bit_rate.unwrap_or(DEFAULT_AUDIO_BIT_RATE))
            .unwrap_or(0),
        direct: Some(DirectSource {
            width,
            height,
            bit_rate,
        }),
    })
}
