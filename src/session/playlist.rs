//! Master and variant playlists for a session.
//!
//! Playlists are written once at open, before the encoder produces anything.
//! Each variant lists every segment of the whole source with the duration the
//! encoder will actually give it, taken from a [`Timeline`].

use super::ladder::{QualityLadder, Rendition};
use super::plan::EncodingPlan;
use super::tracker::segment_file_name;
use super::Result;
use hlsvod_av::SourceMedia;
use hlsvod_media::hls::codecs_attribute;
use hlsvod_media::{MasterPlaylist, MediaPlaylist, StreamInfo, Timeline};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name of the master playlist.
pub const MASTER_PLAYLIST: &str = "master.m3u8";

/// File name of a rendition's variant playlist.
pub fn variant_playlist_name(rendition: &str) -> String {
    format!("{}.m3u8", rendition)
}

/// Build the segment timeline of one rendition.
///
/// Stream-copied renditions are cut on source keyframes; if those cannot be
/// listed the fixed-interval timeline is used instead.
pub async fn rendition_timeline(
    source: &SourceMedia,
    plan: &EncodingPlan,
    rendition: &Rendition,
    ffprobe: Option<&Path>,
) -> Result<Timeline> {
    if plan.copies_video(source, rendition) {
        let path = source.file_path.clone();
        let ffprobe = ffprobe.map(Path::to_path_buf);
        let keyframes = tokio::task::spawn_blocking(move || {
            hlsvod_av::list_keyframes(&path, ffprobe.as_deref())
        })
        .await;

        match keyframes {
            Ok(Ok(keyframes)) if !keyframes.is_empty() => {
                tracing::debug!(
                    rendition = %rendition.name,
                    keyframes = keyframes.len(),
                    "Cutting on source keyframes"
                );
                return Ok(Timeline::builder(source.duration)
                    .segment_length(plan.segment_length as f64)
                    .keyframes(keyframes)
                    .build()?);
            }
            Ok(Ok(_)) => {
                tracing::warn!(rendition = %rendition.name, "No keyframes listed, using fixed segments");
            }
            Ok(Err(e)) => {
                tracing::warn!(rendition = %rendition.name, "Keyframe listing failed, using fixed segments: {}", e);
            }
            Err(e) => {
                tracing::warn!(rendition = %rendition.name, "Keyframe listing task failed: {}", e);
            }
        }
    }

    Ok(Timeline::builder(source.duration)
        .segment_length(plan.actual_segment_length())
        .build()?)
}

/// Build timelines for every rendition in the ladder, keyed by name.
pub async fn build_timelines(
    source: &SourceMedia,
    plan: &EncodingPlan,
    ladder: &QualityLadder,
    ffprobe: Option<&Path>,
) -> Result<BTreeMap<String, Timeline>> {
    let mut timelines = BTreeMap::new();
    for rendition in ladder.renditions() {
        let timeline = rendition_timeline(source, plan, rendition, ffprobe).await?;
        timelines.insert(rendition.name.clone(), timeline);
    }
    Ok(timelines)
}

/// Master playlist listing every rendition.
pub fn master_playlist(source: &SourceMedia, plan: &EncodingPlan, ladder: &QualityLadder) -> MasterPlaylist {
    let audio = source.default_audio().map(|_| "aac");

    ladder
        .renditions()
        .iter()
        .fold(MasterPlaylist::new(), |master, rendition| {
            let (width, height) = rendition.encode_size(source);
            master.add_stream(StreamInfo {
                uri: variant_playlist_name(&rendition.name),
                bandwidth: rendition.bandwidth(),
                width,
                height,
                codecs: codecs_attribute(Some("h264"), audio),
                frame_rate: Some(plan.frame_rate()),
            })
        })
}

/// Variant playlist of one rendition.
pub fn variant_playlist(rendition: &str, timeline: &Timeline) -> MediaPlaylist {
    MediaPlaylist::from_timeline(timeline, |index| segment_file_name(rendition, index))
}

/// Write the master playlist and every variant playlist into `dir`.
///
/// Returns the path of the master playlist.
pub async fn write_playlists(
    dir: &Path,
    source: &SourceMedia,
    plan: &EncodingPlan,
    ladder: &QualityLadder,
    timelines: &BTreeMap<String, Timeline>,
) -> Result<PathBuf> {
    for (rendition, timeline) in timelines {
        let path = dir.join(variant_playlist_name(rendition));
        tokio::fs::write(&path, variant_playlist(rendition, timeline).render()).await?;
        tracing::debug!(
            rendition = %rendition,
            segments = timeline.segment_count(),
            "Wrote variant playlist"
        );
    }

    let master_path = dir.join(MASTER_PLAYLIST);
    tokio::fs::write(&master_path, master_playlist(source, plan, ladder).render()).await?;
    Ok(master_path)
}
