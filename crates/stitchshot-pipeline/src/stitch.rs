//! Composition of two images into one tall canvas.
//!
//! The upper image is pasted at the top with its last `bottom_trim` rows
//! removed; the lower image follows with its first `top_trim` rows
//! removed. The canvas is as wide as the wider input and any area neither
//! image covers is filled with [`BACKGROUND`].

use image::{Pixel, Rgb, RgbImage};

use crate::types::OverlapOffset;

/// Fill color for canvas areas not covered by either image.
pub const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Stack `upper` above `lower`, discarding the overlapping rows.
///
/// Trims larger than their source image are clamped to its height, so the
/// output height is never negative. Degenerate inputs (zero width or
/// height) produce a well-formed, possibly empty, canvas.
#[must_use]
pub fn stitch(upper: &RgbImage, lower: &RgbImage, offset: OverlapOffset) -> RgbImage {
    let bottom_trim = offset.bottom_trim.min(upper.height());
    let top_trim = offset.top_trim.min(lower.height());

    let upper_rows = upper.height() - bottom_trim;
    let lower_rows = lower.height() - top_trim;
    let width = upper.width().max(lower.width());

    let mut canvas = RgbImage::from_pixel(width, upper_rows + lower_rows, BACKGROUND);
    paste_rows(&mut canvas, upper, 0, upper_rows, 0);
    paste_rows(&mut canvas, lower, top_trim, lower_rows, upper_rows);
    canvas
}

/// Copy `rows` rows of `source`, starting at `source_row`, into the
/// left edge of `canvas` starting at `canvas_row`.
fn paste_rows(
    canvas: &mut RgbImage,
    source: &RgbImage,
    source_row: u32,
    rows: u32,
    canvas_row: u32,
) {
    if source.width() == 0 || rows == 0 {
        return;
    }

    let channels = usize::from(Rgb::<u8>::CHANNEL_COUNT);
    let source_stride = source.width() as usize * channels;
    let canvas_stride = canvas.width() as usize * channels;

    let source_rows = source
        .as_raw()
        .chunks_exact(source_stride)
        .skip(source_row as usize)
        .take(rows as usize);
    let canvas_rows = canvas
        .chunks_exact_mut(canvas_stride)
        .skip(canvas_row as usize);

    for (dst, src) in canvas_rows.zip(source_rows) {
        dst[..source_stride].copy_from_slice(src);
    }
}
