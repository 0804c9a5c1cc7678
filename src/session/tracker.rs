//! Segment bookkeeping.
//!
//! Two independent per-rendition sets: segments the encoder has finished
//! writing, and segments that have been served. Only the first one is ever
//! consulted when deciding what to do with a request.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// A parsed `<rendition>-<number>.ts` file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentName {
    pub rendition: String,
    pub number: u32,
}

impl SegmentName {
    /// File name for this segment.
    pub fn file_name(&self) -> String {
        segment_file_name(&self.rendition, self.number)
    }
}

/// File name of a segment.
pub fn segment_file_name(rendition: &str, number: u32) -> String {
    format!("{}-{}.ts", rendition, number)
}

/// Parse a segment file name such as `720p-14.ts`.
pub fn parse_segment_name(file_name: &str) -> Option<SegmentName> {
    let stem = file_name.strip_suffix(".ts")?;
    let (rendition, number) = stem.split_once('-')?;
    if rendition.is_empty() || number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(SegmentName {
        rendition: rendition.to_string(),
        number: number.parse().ok()?,
    })
}

/// What kind of file appeared in a session directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFile {
    Playlist,
    Segment(SegmentName),
    /// A `.ts` file whose name does not parse.
    Invalid(String),
    /// Anything else, such as encoder temp files.
    Other,
}

impl OutputFile {
    /// Classify a path observed in the output directory.
    pub fn classify(path: &Path) -> Self {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return OutputFile::Other;
        };
        if name.ends_with(".m3u8") {
            return OutputFile::Playlist;
        }
        if !name.ends_with(".ts") {
            return OutputFile::Other;
        }
        match parse_segment_name(name) {
            Some(segment) => OutputFile::Segment(segment),
            None => OutputFile::Invalid(name.to_string()),
        }
    }
}

/// Created/fetched progress for one rendition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RenditionProgress {
    pub created: usize,
    pub fetched: usize,
}

/// Thread-safe record of created and fetched segments.
#[derive(Debug, Default)]
pub struct SegmentTracker {
    created: RwLock<HashMap<String, BTreeSet<u32>>>,
    fetched: RwLock<HashMap<String, BTreeSet<u32>>>,
}

impl SegmentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a segment as fully written. Returns `false` if already known.
    pub fn record_created(&self, rendition: &str, number: u32) -> bool {
        self.created
            .write()
            .entry(rendition.to_string())
            .or_default()
            .insert(number)
    }

    /// Record a segment as served. Returns `false` if already known.
    pub fn record_fetched(&self, rendition: &str, number: u32) -> bool {
        self.fetched
            .write()
            .entry(rendition.to_string())
            .or_default()
            .insert(number)
    }

    /// Whether a segment has been fully written.
    pub fn is_created(&self, rendition: &str, number: u32) -> bool {
        self.created
            .read()
            .get(rendition)
            .is_some_and(|set| set.contains(&number))
    }

    /// Whether a segment has been served.
    pub fn is_fetched(&self, rendition: &str, number: u32) -> bool {
        self.fetched
            .read()
            .get(rendition)
            .is_some_and(|set| set.contains(&number))
    }

    /// Created segment numbers of a rendition, ascending.
    pub fn created(&self, rendition: &str) -> Vec<u32> {
        self.created
            .read()
            .get(rendition)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Progress of one rendition.
    pub fn progress(&self, rendition: &str) -> RenditionProgress {
        RenditionProgress {
            created: self.created.read().get(rendition).map_or(0, BTreeSet::len),
            fetched: self.fetched.read().get(rendition).map_or(0, BTreeSet::len),
        }
    }

    /// Progress of every rendition seen so far.
    pub fn snapshot(&self) -> HashMap<String, RenditionProgress> {
        let mut out: HashMap<String, RenditionProgress> = HashMap::new();
        for (rendition, set) in self.created.read().iter() {
            out.entry(rendition.clone()).or_default().created = set.len();
        }
        for (rendition, set) in self.fetched.read().iter() {
            out.entry(rendition.clone()).or_default().fetched = set.len();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_segment_name() {
        assert_eq!(
            parse_segment_name("720p-14.ts"),
            Some(SegmentName {
                rendition: "720p".to_string(),
                number: 14
            })
        );
        assert_eq!(
            parse_segment_name("1080p_direct-0.ts").map(|s| s.rendition),
            Some("1080p_direct".to_string())
        );
        assert_eq!(parse_segment_name("720p.ts"), None);
        assert_eq!(parse_segment_name("720p-x.ts"), None);
        assert_eq!(parse_segment_name("-3.ts"), None);
        assert_eq!(parse_segment_name("720p-3.ts.tmp"), None);
        assert_eq!(parse_segment_name("720p--3.ts"), None);
    }

    #[test]
    fn test_segment_file_name_round_trip() {
        let name = SegmentName {
            rendition: "480p".to_string(),
            number: 7,
        };
        assert_eq!(name.file_name(), "480p-7.ts");
        assert_eq!(parse_segment_name(&name.file_name()), Some(name));
    }

    #[test]
    fn test_classify_output_files() {
        assert_eq!(
            OutputFile::classify(Path::new("/out/master.m3u8")),
            OutputFile::Playlist
        );
        assert_eq!(
            OutputFile::classify(Path::new("/out/720p.encoder.m3u8")),
            OutputFile::Playlist
        );
        assert_eq!(
            OutputFile::classify(Path::new("/out/720p-3.ts.tmp")),
            OutputFile::Other
        );
        assert_eq!(
            OutputFile::classify(Path::new("/out/garbage.ts")),
            OutputFile::Invalid("garbage.ts".to_string())
        );
        assert!(matches!(
            OutputFile::classify(Path::new("/out/720p-3.ts")),
            OutputFile::Segment(SegmentName { number: 3, .. })
        ));
    }

    #[test]
    fn test_created_and_fetched_are_independent() {
        let tracker = SegmentTracker::new();

        assert!(tracker.record_created("720p", 0));
        assert!(!tracker.record_created("720p", 0));
        tracker.record_created("720p", 1);
        tracker.record_fetched("720p", 0);

        assert!(tracker.is_created("720p", 1));
        assert!(!tracker.is_created("480p", 1));
        assert!(!tracker.is_fetched("720p", 1));
        assert_eq!(tracker.created("720p"), vec![0, 1]);
        assert_eq!(
            tracker.progress("720p"),
            RenditionProgress {
                created: 2,
                fetched: 1
            }
        );
    }

    #[test]
    fn test_fetched_without_created() {
        let tracker = SegmentTracker::new();
        tracker.record_fetched("360p", 4);

        assert!(!tracker.is_created("360p", 4));
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot["360p"].fetched, 1);
        assert_eq!(snapshot["360p"].created, 0);
    }
}
