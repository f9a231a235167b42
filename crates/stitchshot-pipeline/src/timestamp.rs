//! Capture timestamps: parsing, comparison, and averaging.
//!
//! A [`Timestamp`] is a second-precision wall-clock capture time. Absence
//! is modelled as `Option<Timestamp>` throughout the crate: an image
//! without a usable timestamp is valid, it just cannot be paired.

use std::fmt;

use chrono::{NaiveDateTime, SubsecRound, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::metadata::MetadataSnapshot;

/// EXIF tag holding the moment the image was captured.
pub const CAPTURE_TIME_TAG: &str = "DateTimeOriginal";

/// Default pairing tolerance in minutes.
pub const DEFAULT_TOLERANCE_MINUTES: u32 = 15;

/// Accepted textual layouts, tried in order.
///
/// EXIF stores `YYYY:MM:DD HH:MM:SS`; some tools rewrite it with dashes.
const FORMATS: [&str; 2] = ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// A capture time with whole-second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// Wrap a date-time, dropping any sub-second part.
    #[must_use]
    pub fn new(datetime: NaiveDateTime) -> Self {
        Self(datetime.trunc_subsecs(0))
    }

    /// Parse a metadata value such as `2023:11:20 13:16:43`.
    ///
    /// Trailing NUL padding and surrounding whitespace are ignored.
    /// Returns `None` for anything that is not a valid date-time, including
    /// the all-zero placeholder some cameras write.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
            .map(Self::new)
    }

    /// The underlying date-time.
    #[must_use]
    pub const fn datetime(self) -> NaiveDateTime {
        self.0
    }

    /// Format as `YYYY-MM-DD-HHMMSS`, the stem used for stitched outputs.
    #[must_use]
    pub fn file_stem(self) -> String {
        self.0.format("%Y-%m-%d-%H%M%S").to_string()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Midpoint of two timestamps, truncated to the whole second.
///
/// Symmetric: `average(a, b) == average(b, a)`.
#[must_use]
pub fn average(a: Timestamp, b: Timestamp) -> Timestamp {
    let (earlier, later) = if a <= b { (a, b) } else { (b, a) };
    let half = (later.0 - earlier.0) / 2;
    Timestamp::new(earlier.0 + half)
}

/// Returns `true` if the two timestamps are at most `tolerance` apart.
#[must_use]
pub fn within_tolerance(a: Timestamp, b: Timestamp, tolerance: TimeDelta) -> bool {
    (a.0 - b.0).abs() <= tolerance
}

/// Pairing tolerance for a number of minutes.
#[must_use]
pub fn tolerance_minutes(minutes: u32) -> TimeDelta {
    TimeDelta::minutes(i64::from(minutes))
}

/// Arrange two items as `(earlier, later)` by their timestamps.
///
/// Items are swapped only when both timestamps are present and the second
/// is strictly earlier. With partial or missing metadata the input order
/// is kept as-is.
pub fn order<T>(
    first: T,
    first_time: Option<Timestamp>,
    second: T,
    second_time: Option<Timestamp>,
) -> (T, T) {
    match (first_time, second_time) {
        (Some(a), Some(b)) if b < a => (second, first),
        _ => (first, second),
    }
}

/// Reads the capture time from a metadata snapshot.
///
/// The tag name is injected so callers can point the extractor at a
/// different field (or a fake snapshot in tests).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampExtractor {
    tag: String,
}

impl TimestampExtractor {
    /// Extractor reading the given tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    /// The tag this extractor reads.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Extract the timestamp, or `None` if metadata, tag, or value is
    /// missing or malformed.
    #[must_use]
    pub fn extract(&self, metadata: Option<&MetadataSnapshot>) -> Option<Timestamp> {
        metadata?.get(&self.tag).and_then(Timestamp::parse)
    }
}

impl Default for TimestampExtractor {
    fn default() -> Self {
        Self::new(CAPTURE_TIME_TAG)
    }
}

/// Extract the capture time using the default [`CAPTURE_TIME_TAG`].
#[must_use]
pub fn extract_timestamp(metadata: &MetadataSnapshot) -> Option<Timestamp> {
    TimestampExtractor::default().extract(Some(metadata))
}
