//! XLOG record pointers and WAL segment/timeline arithmetic.
//!
//! An [`XLogRecPtr`] is a 64-bit byte offset into a timeline's WAL stream.
//! Its canonical textual form is `hex/hex` (high 32 bits, low 32 bits),
//! and that round-trip (`encode(decode(s)) == s`) is relied on throughout
//! the catalog, since positions are persisted as text.

use std::fmt;
use std::str::FromStr;

/// Default WAL segment size, in bytes (16 MiB). Archives may override this
/// per-backup (`BaseBackup::wal_segment_size`), since it is a compile-time
/// choice of the upstream database, not a constant of this program.
pub const DEFAULT_WAL_SEGMENT_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct XLogRecPtr(pub u64);

impl XLogRecPtr {
    pub const ZERO: XLogRecPtr = XLogRecPtr(0);

    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// The WAL segment number this pointer falls within, given `segment_size`.
    #[must_use]
    pub fn segment_number(&self, segment_size: u64) -> u64 {
        self.0 / segment_size
    }

    /// The pointer at the start of the segment this pointer falls within.
    #[must_use]
    pub fn segment_start(&self, segment_size: u64) -> XLogRecPtr {
        XLogRecPtr(self.segment_number(segment_size) * segment_size)
    }

    /// The pointer at the start of the segment *preceding* this one.
    ///
    /// Used by the retention engine to move the per-timeline cleanup cutoff
    /// back by one segment so that the segment containing a kept backup's
    /// starting position always survives.
    #[must_use]
    pub fn preceding_segment_start(&self, segment_size: u64) -> XLogRecPtr {
        let seg = self.segment_number(segment_size);
        XLogRecPtr(seg.saturating_sub(1) * segment_size)
    }
}

impl fmt::Display for XLogRecPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hi = (self.0 >> 32) as u32;
        let lo = self.0 as u32;
        write!(f, "{hi:X}/{lo:X}")
    }
}

#[derive(thiserror::Error, Debug)]
pub enum XLogRecPtrParseError {
    #[error("xlog record pointer {0:?} is not in the form hex/hex")]
    BadFormat(String),
    #[error("xlog record pointer {0:?} has an invalid hex component")]
    BadHex(String, #[source] std::num::ParseIntError),
}

impl FromStr for XLogRecPtr {
    type Err = XLogRecPtrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hi, lo) = s
            .split_once('/')
            .ok_or_else(|| XLogRecPtrParseError::BadFormat(s.to_owned()))?;
        let hi = u32::from_str_radix(hi, 16)
            .map_err(|e| XLogRecPtrParseError::BadHex(s.to_owned(), e))?;
        let lo = u32::from_str_radix(lo, 16)
            .map_err(|e| XLogRecPtrParseError::BadHex(s.to_owned(), e))?;
        Ok(XLogRecPtr((u64::from(hi) << 32) | u64::from(lo)))
    }
}

/// A timeline identifier. A new timeline starts at each point-in-time
/// divergence, recorded in a `.history` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timeline(pub u32);

impl fmt::Display for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_hex_pairs() {
        for s in ["0/0", "1/0", "0/1", "16ADC38/FF00FF", "FFFFFFFF/FFFFFFFF"] {
            let ptr: XLogRecPtr = s.parse().unwrap();
            assert_eq!(ptr.to_string(), s);
        }
    }

    #[test]
    fn rejects_bad_format() {
        assert!("nope".parse::<XLogRecPtr>().is_err());
        assert!("1/2/3".parse::<XLogRecPtr>().is_err());
        assert!("zz/11".parse::<XLogRecPtr>().is_err());
    }

    #[test]
    fn segment_arithmetic() {
        let seg_size = DEFAULT_WAL_SEGMENT_SIZE;
        let ptr = XLogRecPtr(seg_size * 3 + 100);
        assert_eq!(ptr.segment_number(seg_size), 3);
        assert_eq!(ptr.segment_start(seg_size), XLogRecPtr(seg_size * 3));
        assert_eq!(
            ptr.preceding_segment_start(seg_size),
            XLogRecPtr(seg_size * 2)
        );
        // Preceding segment of the very first segment saturates at zero.
        let first = XLogRecPtr(50);
        assert_eq!(first.preceding_segment_start(seg_size), XLogRecPtr(0));
    }
}
