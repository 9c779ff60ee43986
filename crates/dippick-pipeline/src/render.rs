//! Composite display image: the strip on the left, the accumulator on the
//! right.
//!
//! The strip is drawn in gray through a [`ContrastState`]. The
//! accumulator panel is scaled so its largest vote is white, with a
//! green/blue crosshair through its centre and the peak neighbourhood
//! tinted red.

use image::{Rgb, RgbImage};

use crate::contrast::ContrastState;
use crate::peak::Peak;
use crate::types::FloatImage;

const PEAK_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);

/// Accumulator and its peak, for the right-hand panel.
#[derive(Debug, Clone, Copy)]
pub struct Overlay<'a> {
    /// Post-smoothed accumulator, `tside × tside`.
    pub accumulator: &'a FloatImage,
    /// Peak found in `accumulator`.
    pub peak: &'a Peak,
    /// Neighbourhood radius in accumulator cells.
    pub peak_radius: f64,
}

/// Render the display buffer.
///
/// The output is `(strip_width + tside) × max(strip_height, tside)`.
/// Without an overlay the accumulator panel stays black apart from the
/// crosshair. Pixels the strip does not cover below a short strip are
/// black.
#[must_use]
pub fn render_display(
    strip: &FloatImage,
    contrast: &ContrastState,
    overlay: Option<Overlay<'_>>,
    tside: u32,
) -> RgbImage {
    let (sw, sh) = strip.dimensions();
    let mut out = RgbImage::new(sw + tside, sh.max(tside));

    for (x, y, pixel) in strip.enumerate_pixels() {
        let v = contrast.apply(pixel.0[0]);
        out.put_pixel(x, y, Rgb([v, v, v]));
    }

    if let Some(overlay) = overlay {
        draw_accumulator(&mut out, sw, tside, overlay);
    }
    draw_crosshair(&mut out, sw, tside);
    if let Some(overlay) = overlay
        && overlay.peak.col < tside
        && overlay.peak.row < tside
    {
        out.put_pixel(sw + overlay.peak.col, overlay.peak.row, PEAK_COLOUR);
    }
    out
}

fn draw_accumulator(out: &mut RgbImage, left: u32, tside: u32, overlay: Overlay<'_>) {
    let acc = overlay.accumulator;
    let max = acc
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0_f32, f32::max);
    let scale = if max > 0.0 { 255.0 / max } else { 0.0 };

    for (col, row, pixel) in acc.enumerate_pixels() {
        if col >= tside || row >= tside {
            continue;
        }
        let v = pixel.0[0];
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let level = if v.is_finite() {
            (v * scale).clamp(0.0, 255.0) as u8
        } else {
            0
        };
        let colour = if overlay.peak.is_near(row, col, overlay.peak_radius) {
            Rgb([level.saturating_mul(2), level, level / 2])
        } else {
            Rgb([level, level, level])
        };
        out.put_pixel(left + col, row, colour);
    }
}

/// Centre row and column of the accumulator panel. The centre pixel is
/// tinted once.
fn draw_crosshair(out: &mut RgbImage, left: u32, tside: u32) {
    if tside == 0 {
        return;
    }
    let mid = tside / 2;
    let tint = |p: &mut Rgb<u8>| {
        p.0[1] /= 2;
        p.0[2] = 255;
    };
    for col in 0..tside {
        tint(out.get_pixel_mut(left + col, mid));
    }
    for row in (0..tside).filter(|&row| row != mid) {
        tint(out.get_pixel_mut(left + mid, row));
    }
}
