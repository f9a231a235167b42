//! Shared types for the stitchshot pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `RgbImage` so downstream crates can hand decoded rasters to
/// the pipeline without depending on `image` directly.
pub use image::RgbImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an existing raster.
    #[must_use]
    pub fn of(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }
}

/// Rows to discard before two images are concatenated.
///
/// `bottom_trim` rows are removed from the bottom of the upper image and
/// `top_trim` rows from the top of the lower image. `(0, 0)` means no
/// overlap was found and the images are simply stacked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverlapOffset {
    /// Rows removed from the bottom of the upper image.
    pub bottom_trim: u32,
    /// Rows removed from the top of the lower image.
    pub top_trim: u32,
}

impl OverlapOffset {
    /// The "no overlap found" offset.
    pub const NONE: Self = Self {
        bottom_trim: 0,
        top_trim: 0,
    };

    /// Create a new offset.
    #[must_use]
    pub const fn new(bottom_trim: u32, top_trim: u32) -> Self {
        Self {
            bottom_trim,
            top_trim,
        }
    }

    /// Total number of rows removed from the combined height.
    #[must_use]
    pub fn total(self) -> u64 {
        u64::from(self.bottom_trim) + u64::from(self.top_trim)
    }

    /// Returns `true` if no overlap was detected.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.bottom_trim == 0 && self.top_trim == 0
    }
}

/// Tunables for the sampled overlap search.
///
/// The search assumes the overlap lies in the lower part of the upper
/// image (`bottom_fraction` onwards) and the upper part of the lower image
/// (up to `top_fraction`). Candidate alignments are rejected by a single
/// probe pixel before a sparse grid of `sample_stride`-spaced pixels is
/// compared over a window of `window_height` rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlapConfig {
    /// Fraction of the upper image's height where the searched strip starts.
    pub bottom_fraction: f64,

    /// Fraction of the lower image's height covered by the searched strip.
    pub top_fraction: f64,

    /// Column used for the single-pixel rejection probe. Clamped to the
    /// narrower image's last column.
    pub probe_column: u32,

    /// Height in rows of the window compared at each candidate alignment.
    pub window_height: u32,

    /// Step between candidate rows in the upper image. Larger strides
    /// search faster but may miss the true alignment.
    pub coarse_stride: u32,

    /// Spacing of the verification grid, both horizontally and vertically.
    pub sample_stride: u32,
}

impl OverlapConfig {
    /// Default start of the upper image's searched strip.
    pub const DEFAULT_BOTTOM_FRACTION: f64 = 0.5;
    /// Default extent of the lower image's searched strip.
    pub const DEFAULT_TOP_FRACTION: f64 = 0.75;
    /// Default probe column.
    pub const DEFAULT_PROBE_COLUMN: u32 = 150;
    /// Default verification window height.
    pub const DEFAULT_WINDOW_HEIGHT: u32 = 500;
    /// Default stride over upper-image candidate rows.
    pub const DEFAULT_COARSE_STRIDE: u32 = 5;
    /// Default verification grid spacing.
    pub const DEFAULT_SAMPLE_STRIDE: u32 = 15;

    /// Check the configuration for values the search cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if a fraction is outside
    /// `0.0..=1.0`, or if the window height or either stride is zero.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, value) in [
            ("bottom_fraction", self.bottom_fraction),
            ("top_fraction", self.top_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be within 0.0..=1.0, got {value}"
                )));
            }
        }
        for (name, value) in [
            ("window_height", self.window_height),
            ("coarse_stride", self.coarse_stride),
            ("sample_stride", self.sample_stride),
        ] {
            if value == 0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            bottom_fraction: Self::DEFAULT_BOTTOM_FRACTION,
            top_fraction: Self::DEFAULT_TOP_FRACTION,
            probe_column: Self::DEFAULT_PROBE_COLUMN,
            window_height: Self::DEFAULT_WINDOW_HEIGHT,
            coarse_stride: Self::DEFAULT_COARSE_STRIDE,
            sample_stride: Self::DEFAULT_SAMPLE_STRIDE,
        }
    }
}

/// Errors raised by pipeline configuration.
///
/// Overlap detection and stitching themselves never fail; a missing
/// overlap degrades to plain concatenation.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}
