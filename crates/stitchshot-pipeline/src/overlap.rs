//! Vertical overlap detection between two screenshots.
//!
//! Scrolling captures overlap somewhere between the lower part of the
//! upper image and the upper part of the lower image. Comparing every
//! pixel of those strips at every alignment is far too slow, so the search
//! is coarse-to-fine:
//!
//! 1. Candidate rows in the upper strip are visited from the bottom up in
//!    steps of `coarse_stride`; for each, every row of the lower strip is
//!    tried from the bottom up.
//! 2. A single probe pixel rejects most candidates.
//! 3. Survivors are verified on a sparse grid spanning the shared width
//!    and `window_height` rows. The first full match wins.
//!
//! This is sampled matching: repetitive content can produce a false match
//! and a coarse stride can skip the true one. Both outcomes are accepted;
//! the worst case is a visible seam or a duplicated band.

use image::GenericImageView;

use crate::types::{OverlapConfig, OverlapOffset};

/// Find the offset at which the bottom of `upper` continues into the top
/// of `lower`.
///
/// Returns [`OverlapOffset::NONE`] when no candidate passes verification,
/// when either searched strip is shorter than the window, or when the
/// images share no columns. The returned trims never exceed the heights
/// of their source images.
#[must_use]
pub fn find_overlap<I>(upper: &I, lower: &I, config: &OverlapConfig) -> OverlapOffset
where
    I: GenericImageView,
    I::Pixel: PartialEq,
{
    let Some(search) = Search::new(upper, lower, config) else {
        return OverlapOffset::NONE;
    };

    let coarse = stride(config.coarse_stride);
    for y_bot in (0..=search.bottom_start).rev().step_by(coarse) {
        for y_top in (0..=search.top_start).rev() {
            if search.matches(upper, lower, y_bot, y_top) {
                return OverlapOffset::new(search.bottom_height - y_bot, y_top);
            }
        }
    }

    OverlapOffset::NONE
}

/// Geometry of one search, with every row range checked up front.
struct Search {
    /// First row of the upper image's strip.
    strip_origin: u32,
    /// Rows in the upper image's strip.
    bottom_height: u32,
    /// Largest candidate row in the upper strip.
    bottom_start: u32,
    /// Largest candidate row in the lower strip.
    top_start: u32,
    /// Columns sampled in both images.
    sample_width: u32,
    window: u32,
    probe_x: u32,
    sample_stride: usize,
}

impl Search {
    fn new<I: GenericImageView>(upper: &I, lower: &I, config: &OverlapConfig) -> Option<Self> {
        let (upper_width, upper_height) = upper.dimensions();
        let (lower_width, lower_height) = lower.dimensions();

        let strip_origin = scaled_rows(upper_height, config.bottom_fraction);
        let bottom_height = upper_height - strip_origin;
        let top_height = scaled_rows(lower_height, config.top_fraction);
        let sample_width = upper_width.min(lower_width);
        let window = config.window_height;

        if window == 0 || sample_width == 0 || bottom_height < window || top_height < window {
            return None;
        }

        let bottom_start = bottom_height - window;
        // The lower strip may be shorter than the upper one; candidates whose
        // window would run off its end are never tried.
        let top_start = bottom_start.min(top_height - window);

        Some(Self {
            strip_origin,
            bottom_height,
            bottom_start,
            top_start,
            sample_width,
            window,
            probe_x: config.probe_column.min(sample_width - 1),
            sample_stride: stride(config.sample_stride),
        })
    }

    /// Probe, then verify, one `(y_bot, y_top)` alignment.
    fn matches<I>(&self, upper: &I, lower: &I, y_bot: u32, y_top: u32) -> bool
    where
        I: GenericImageView,
        I::Pixel: PartialEq,
    {
        let upper_row = self.strip_origin + y_bot;
        if upper.get_pixel(self.probe_x, upper_row) != lower.get_pixel(self.probe_x, y_top) {
            return false;
        }

        (0..self.sample_width)
            .step_by(self.sample_stride)
            .all(|x| {
                (0..self.window).step_by(self.sample_stride).all(|y| {
                    upper.get_pixel(x, upper_row + y) == lower.get_pixel(x, y_top + y)
                })
            })
    }
}

/// `fraction` of `height`, rounded to the nearest row and clamped to it.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_rows(height: u32, fraction: f64) -> u32 {
    let rows = (f64::from(height) * fraction.clamp(0.0, 1.0)).round_ties_even();
    (rows as u32).min(height)
}

/// Convert a configured stride to a usable step, treating 0 as 1.
fn stride(value: u32) -> usize {
    usize::try_from(value.max(1)).unwrap_or(usize::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    /// A tall source whose every row is distinct, used to cut overlapping
    /// screenshots from. `tint` lands in the blue channel so differently
    /// tinted images never share a pixel.
    pub(crate) fn rows_image(width: u32, first_row: u32, height: u32, tint: u8) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let row = first_row + y;
            Rgb([
                (row % 256) as u8,
                (row / 256) as u8 ^ (x % 7) as u8,
                tint,
            ])
        })
    }

    /// Small search settings so tests stay fast.
    pub(crate) fn test_config() -> OverlapConfig {
        OverlapConfig {
            probe_column: 10,
            window_height: 40,
            coarse_stride: 5,
            sample_stride: 4,
            ..OverlapConfig::default()
        }
    }

    #[test]
    fn detects_synthetic_overlap() {
        let k = 80;
        let upper = rows_image(32, 0, 200, 0);
        let lower = rows_image(32, 200 - k, 200, 0);

        let offset = find_overlap(&upper, &lower, &test_config());
        assert_eq!(offset, OverlapOffset::new(40, 40));
        assert_eq!(offset.total(), u64::from(k));
    }

    #[test]
    fn detected_trim_matches_overlap_for_several_sizes() {
        for k in [40, 57, 63, 100, 140] {
            let upper = rows_image(24, 0, 200, 0);
            let lower = rows_image(24, 200 - k, 220, 0);
            let offset = find_overlap(&upper, &lower, &test_config());
            assert_eq!(offset.total(), u64::from(k), "overlap of {k} rows");
        }
    }

    #[test]
    fn overlap_smaller_than_window_is_not_found() {
        let upper = rows_image(32, 0, 200, 0);
        let lower = rows_image(32, 200 - 20, 200, 0);
        assert_eq!(
            find_overlap(&upper, &lower, &test_config()),
            OverlapOffset::NONE
        );
    }

    #[test]
    fn disjoint_content_returns_none() {
        let upper = rows_image(32, 0, 200, 0);
        let lower = rows_image(32, 0, 200, 255);
        assert_eq!(
            find_overlap(&upper, &lower, &test_config()),
            OverlapOffset::NONE
        );
    }

    #[test]
    fn strips_shorter_than_window_return_none() {
        let upper = rows_image(32, 0, 60, 0);
        let lower = rows_image(32, 0, 60, 0);
        // Upper strip is 30 rows, window is 40.
        assert_eq!(
            find_overlap(&upper, &lower, &test_config()),
            OverlapOffset::NONE
        );
    }

    #[test]
    fn zero_sized_images_return_none() {
        let empty = RgbImage::new(0, 0);
        let img = rows_image(32, 0, 200, 0);
        let config = test_config();
        assert_eq!(find_overlap(&empty, &img, &config), OverlapOffset::NONE);
        assert_eq!(find_overlap(&img, &empty, &config), OverlapOffset::NONE);
        assert_eq!(
            find_overlap(&RgbImage::new(0, 200), &img, &config),
            OverlapOffset::NONE
        );
    }

    #[test]
    fn probe_column_is_clamped_for_narrow_images() {
        let config = OverlapConfig {
            probe_column: 1_000,
            ..test_config()
        };
        let upper = rows_image(8, 0, 200, 0);
        let lower = rows_image(8, 120, 200, 0);
        assert_eq!(find_overlap(&upper, &lower, &config).total(), 80);
    }

    #[test]
    fn uniform_content_matches_first_candidate() {
        // Repetitive content yields the maximal candidate: a known
        // false positive of sampled matching.
        let upper = RgbImage::from_pixel(32, 200, Rgb([255, 255, 255]));
        let lower = RgbImage::from_pixel(32, 200, Rgb([255, 255, 255]));
        assert_eq!(
            find_overlap(&upper, &lower, &test_config()),
            OverlapOffset::new(40, 60)
        );
    }

    #[test]
    fn short_lower_strip_limits_candidates() {
        // Lower strip is 75 rows; the window never leaves it.
        let upper = rows_image(16, 0, 300, 0);
        let lower = rows_image(16, 300 - 60, 100, 0);
        let offset = find_overlap(&upper, &lower, &test_config());
        assert!(offset.top_trim + 40 <= 75);
        assert_eq!(offset.total(), 60);
    }

    #[test]
    fn trims_never_exceed_source_heights() {
        for (h1, h2) in [(81, 81), (100, 54), (54, 300), (400, 90)] {
            let upper = RgbImage::from_pixel(16, h1, Rgb([1, 2, 3]));
            let lower = RgbImage::from_pixel(16, h2, Rgb([1, 2, 3]));
            let offset = find_overlap(&upper, &lower, &test_config());
            assert!(offset.bottom_trim <= h1, "{h1}x{h2}: {offset:?}");
            assert!(offset.top_trim <= h2, "{h1}x{h2}: {offset:?}");
        }
    }

    #[test]
    fn scaled_rows_rounds_and_clamps() {
        assert_eq!(scaled_rows(200, 0.5), 100);
        assert_eq!(scaled_rows(201, 0.75), 151);
        assert_eq!(scaled_rows(10, 2.0), 10);
        assert_eq!(scaled_rows(10, -1.0), 0);
    }

    #[test]
    fn scaled_rows_rounds_halves_to_even() {
        assert_eq!(scaled_rows(5, 0.5), 2);
        assert_eq!(scaled_rows(7, 0.5), 4);
        assert_eq!(scaled_rows(6, 0.75), 4);
        assert_eq!(scaled_rows(10, 0.75), 8);
    }
}
