//! WAL segment filename classification and start-position discovery.
//!
//! Classification is by filename alone — the directory listing never opens
//! a file just to decide what kind of entry it is, so a corrupt or
//! half-written file still classifies the same way a healthy one would.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use regex::Regex;

use crate::xlog::{Timeline, XLogRecPtr};

use super::error::ArchiveError;

lazy_static! {
    static ref WAL_PLAIN: Regex = Regex::new(r"^[0-9A-Fa-f]{24}$").unwrap();
    static ref WAL_COMPRESSED: Regex = Regex::new(r"^[0-9A-Fa-f]{24}\.(gz|zst)$").unwrap();
    static ref WAL_PARTIAL: Regex = Regex::new(r"^[0-9A-Fa-f]{24}\.partial$").unwrap();
    static ref WAL_PARTIAL_COMPRESSED: Regex =
        Regex::new(r"^[0-9A-Fa-f]{24}\.partial\.(gz|zst)$").unwrap();
    static ref WAL_HISTORY: Regex = Regex::new(r"^[0-9A-Fa-f]{8}\.history$").unwrap();
    static ref WAL_HISTORY_COMPRESSED: Regex =
        Regex::new(r"^[0-9A-Fa-f]{8}\.history\.(gz|zst)$").unwrap();
    static ref WAL_ANY_PREFIX: Regex = Regex::new(r"^[0-9A-Fa-f]{8,24}").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Complete,
    CompleteCompressed,
    Partial,
    PartialCompressed,
    History,
    HistoryCompressed,
    InvalidFilename,
    Unknown,
}

impl SegmentKind {
    #[must_use]
    pub fn is_wal_segment(self) -> bool {
        matches!(
            self,
            SegmentKind::Complete
                | SegmentKind::CompleteCompressed
                | SegmentKind::Partial
                | SegmentKind::PartialCompressed
        )
    }

    #[must_use]
    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            SegmentKind::CompleteCompressed
                | SegmentKind::PartialCompressed
                | SegmentKind::HistoryCompressed
        )
    }

    #[must_use]
    pub fn is_partial(self) -> bool {
        matches!(self, SegmentKind::Partial | SegmentKind::PartialCompressed)
    }
}

/// Classify a bare filename (no directory component) found in `log/`.
#[must_use]
pub fn classify(filename: &str) -> SegmentKind {
    if WAL_PLAIN.is_match(filename) {
        SegmentKind::Complete
    } else if WAL_COMPRESSED.is_match(filename) {
        SegmentKind::CompleteCompressed
    } else if WAL_PARTIAL.is_match(filename) {
        SegmentKind::Partial
    } else if WAL_PARTIAL_COMPRESSED.is_match(filename) {
        SegmentKind::PartialCompressed
    } else if WAL_HISTORY.is_match(filename) {
        SegmentKind::History
    } else if WAL_HISTORY_COMPRESSED.is_match(filename) {
        SegmentKind::HistoryCompressed
    } else if WAL_ANY_PREFIX.is_match(filename) {
        SegmentKind::InvalidFilename
    } else {
        SegmentKind::Unknown
    }
}

/// `(timeline, segment_number)` parsed out of a WAL segment or history
/// filename, per the `TTTTTTTTXXXXXXXXYYYYYYYY` naming convention: the
/// first 8 hex digits are the timeline, the remaining 16 are a 64-bit
/// segment counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SegmentPosition {
    pub segment_number: u64,
    pub timeline: Timeline,
}

pub fn parse_segment_position(filename: &str) -> Result<SegmentPosition, ArchiveError> {
    let stem = filename
        .split('.')
        .next()
        .ok_or_else(|| ArchiveError::InvalidSegmentFilename(filename.to_owned()))?;
    if stem.len() < 24 {
        return Err(ArchiveError::InvalidSegmentFilename(filename.to_owned()));
    }
    let timeline = u32::from_str_radix(&stem[0..8], 16)
        .map_err(|_| ArchiveError::InvalidSegmentFilename(filename.to_owned()))?;
    let segment_number = u64::from_str_radix(&stem[8..24], 16)
        .map_err(|_| ArchiveError::InvalidSegmentFilename(filename.to_owned()))?;
    Ok(SegmentPosition {
        segment_number,
        timeline: Timeline(timeline),
    })
}

/// Timeline parsed out of a `.history` filename's 8-hex-digit prefix, for
/// callers that only care which timeline a history file belongs to and
/// don't need the full [`SegmentPosition`] a WAL segment name carries.
#[must_use]
pub fn parse_history_timeline(filename: &str) -> Option<Timeline> {
    let stem = filename.split('.').next()?;
    if stem.len() != 8 || !stem.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(stem, 16).ok().map(Timeline)
}

/// Read the uncompressed size of a gzip member from its ISIZE trailer: the
/// last four bytes of the file, little-endian, mod 2^32 per RFC 1952. We
/// never decompress to discover this — the trailer is authoritative and
/// decompressing a multi-gigabyte segment just to learn its size would be
/// wasteful and is explicitly out of scope here.
pub fn gzip_isize(path: &Path) -> Result<u64, ArchiveError> {
    let mut file = File::open(path)?;
    let len = file.seek(SeekFrom::End(0))?;
    if len < 8 {
        return Err(ArchiveError::GzipTrailerTruncated(path.to_path_buf()));
    }
    file.seek(SeekFrom::End(-4))?;
    let mut trailer = [0u8; 4];
    file.read_exact(&mut trailer)?;
    Ok(u64::from(LittleEndian::read_u32(&trailer)))
}

/// One candidate for WAL start-position discovery: a classified, parsed
/// directory entry.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub filename: String,
    pub kind: SegmentKind,
    pub position: SegmentPosition,
}

/// Scan `entries` (bare filenames from `log/`) and pick the resume point:
/// highest `(segment_number, timeline)`, preferring a partial over a
/// complete segment at the same position. Returns `None` if there are no
/// WAL segment candidates at all (an empty or history-only archive).
#[must_use]
pub fn discover_start_position(entries: &[String], segment_size: u64) -> Option<XLogRecPtr> {
    let mut candidates: Vec<Candidate> = entries
        .iter()
        .filter_map(|name| {
            let kind = classify(name);
            if !kind.is_wal_segment() {
                return None;
            }
            parse_segment_position(name)
                .ok()
                .map(|position| Candidate { filename: name.clone(), kind, position })
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| a.kind.is_partial().cmp(&b.kind.is_partial()))
    });

    let best = candidates.pop()?;
    let base = XLogRecPtr::new(best.position.segment_number * segment_size);
    Some(if best.kind.is_partial() {
        base
    } else {
        XLogRecPtr::new(base.0 + segment_size)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_every_kind() {
        assert_eq!(classify("000000010000000000000007"), SegmentKind::Complete);
        assert_eq!(
            classify("000000010000000000000007.gz"),
            SegmentKind::CompleteCompressed
        );
        assert_eq!(
            classify("000000010000000000000007.partial"),
            SegmentKind::Partial
        );
        assert_eq!(
            classify("000000010000000000000007.partial.zst"),
            SegmentKind::PartialCompressed
        );
        assert_eq!(classify("00000001.history"), SegmentKind::History);
        assert_eq!(
            classify("00000001.history.gz"),
            SegmentKind::HistoryCompressed
        );
        assert_eq!(classify("0000000100000007"), SegmentKind::InvalidFilename);
        assert_eq!(classify("backup_label"), SegmentKind::Unknown);
    }

    #[test]
    fn history_timeline_parses_prefix() {
        assert_eq!(parse_history_timeline("00000002.history"), Some(Timeline(2)));
        assert_eq!(parse_history_timeline("00000002.history.gz"), Some(Timeline(2)));
        assert_eq!(parse_history_timeline("000000010000000000000007"), None);
        assert_eq!(parse_history_timeline("backup_label"), None);
    }

    #[test]
    fn start_position_prefers_highest_segment_and_partial_on_tie() {
        let entries = vec![
            "000000010000000000000007".to_owned(),
            "000000010000000000000008.partial".to_owned(),
            "000000020000000000000008".to_owned(),
        ];
        let ptr = discover_start_position(&entries, crate::xlog::DEFAULT_WAL_SEGMENT_SIZE).unwrap();
        let expected =
            parse_segment_position("000000020000000000000008").unwrap().segment_number
                * crate::xlog::DEFAULT_WAL_SEGMENT_SIZE
                + crate::xlog::DEFAULT_WAL_SEGMENT_SIZE;
        assert_eq!(ptr.0, expected);
    }

    #[test]
    fn partial_wins_over_complete_at_same_position() {
        let entries = vec![
            "000000010000000000000008".to_owned(),
            "000000010000000000000008.partial".to_owned(),
        ];
        let ptr = discover_start_position(&entries, crate::xlog::DEFAULT_WAL_SEGMENT_SIZE).unwrap();
        let seg = parse_segment_position("000000010000000000000008").unwrap().segment_number;
        assert_eq!(ptr.0, seg * crate::xlog::DEFAULT_WAL_SEGMENT_SIZE);
    }
}
