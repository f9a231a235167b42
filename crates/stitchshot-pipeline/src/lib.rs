//! stitchshot-pipeline: Pure screenshot stitching core (sans-IO).
//!
//! Joins vertically overlapping screenshots through:
//! overlap detection -> stitching, and groups images into pairs by
//! capture time.
//!
//! This crate has **no I/O dependencies** -- it operates on decoded
//! rasters and metadata snapshots handed to it. Filesystem discovery,
//! EXIF reading, encoding, and the parallel batch runner live in
//! `stitchshot-batch`.

pub mod metadata;
pub mod overlap;
pub mod pairing;
pub mod stitch;
pub mod timestamp;
pub mod types;

pub use metadata::{MetadataReader, MetadataSnapshot};
pub use overlap::find_overlap;
pub use pairing::{ImagePair, IndexPairing, PairingOutcome, pair_paths, pair_timestamps};
pub use stitch::{BACKGROUND, stitch};
pub use timestamp::{
    Timestamp, TimestampExtractor, average, extract_timestamp, order, within_tolerance,
};
pub use types::{Dimensions, OverlapConfig, OverlapOffset, PipelineError, RgbImage};

/// Result of stitching one pair.
#[derive(Debug, Clone)]
pub struct Stitched {
    /// The combined image.
    pub image: RgbImage,
    /// The overlap that was removed.
    pub offset: OverlapOffset,
}

impl Stitched {
    /// Dimensions of the combined image.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.image)
    }
}

/// Detect the overlap between `upper` and `lower` and stitch them.
///
/// # Pipeline steps
///
/// 1. Sampled overlap search ([`find_overlap`])
/// 2. Composition on a white canvas ([`stitch`])
///
/// Never fails: when no overlap is found the images are stacked.
#[must_use]
pub fn stitch_pair(upper: &RgbImage, lower: &RgbImage, config: &OverlapConfig) -> Stitched {
    let offset = find_overlap(upper, lower, config);
    Stitched {
        image: stitch(upper, lower, offset),
        offset,
    }
}
