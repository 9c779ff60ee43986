//! Accumulator peak and its interpretation as a dip.

use serde::{Deserialize, Serialize};

use crate::transform::ParameterGrid;
use crate::types::{FloatImage, WindowSize};
use crate::viewport::ViewportState;

/// Highest accumulator cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Amplitude bin (accumulator row).
    pub row: u32,
    /// Phase bin (accumulator column).
    pub col: u32,
    /// Vote score at the peak.
    pub value: f32,
}

impl Peak {
    /// Whether `(row, col)` lies strictly within `radius` cells of the peak.
    #[must_use]
    pub fn is_near(&self, row: u32, col: u32, radius: f64) -> bool {
        let dr = f64::from(row) - f64::from(self.row);
        let dc = f64::from(col) - f64::from(self.col);
        dr.hypot(dc) < radius
    }
}

/// Find the maximum of `accumulator`.
///
/// Ties go to the first cell in row-major (amplitude-major) order, and
/// a flat accumulator reports cell `(0, 0)`. NaN cells are never chosen.
#[must_use]
pub fn find_peak(accumulator: &FloatImage) -> Peak {
    let mut peak = Peak {
        row: 0,
        col: 0,
        value: accumulator.get_pixel_checked(0, 0).map_or(0.0, |p| p.0[0]),
    };
    for (col, row, pixel) in accumulator.enumerate_pixels() {
        let value = pixel.0[0];
        if value > peak.value || (peak.value.is_nan() && !value.is_nan()) {
            peak = Peak { row, col, value };
        }
    }
    peak
}

/// Cells strictly within `radius` of `peak`, as `(row, col)`, in
/// row-major order.
#[must_use]
pub fn neighbourhood(accumulator: &FloatImage, peak: &Peak, radius: f64) -> Vec<(u32, u32)> {
    let (width, height) = accumulator.dimensions();
    (0..height)
        .flat_map(|row| (0..width).map(move |col| (row, col)))
        .filter(|&(row, col)| peak.is_near(row, col, radius))
        .collect()
}

/// Dip read from an accumulator peak, in octave-0 image terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DipEstimate {
    /// Image row at the vertical centre of the strip.
    pub center_depth: f64,
    /// Sinusoid amplitude in octave-0 image pixels.
    pub amplitude: f64,
    /// Sinusoid phase in radians.
    pub phase: f64,
    /// Dip angle from horizontal, in degrees, assuming square pixels.
    pub dip_degrees: f64,
    /// Phase expressed in degrees.
    pub azimuth_degrees: f64,
}

impl DipEstimate {
    /// Interpret `peak` for a strip sampled at `viewport` with `window`
    /// on an image `azimuth_width` pixels around.
    ///
    /// The borehole circumference spans `azimuth_width` pixels, so its
    /// radius is `azimuth_width / 2π` and `tan(dip) = amplitude / radius`.
    #[must_use]
    pub fn from_peak(
        peak: &Peak,
        grid: ParameterGrid,
        viewport: &ViewportState,
        window: WindowSize,
        azimuth_width: u32,
    ) -> Self {
        let amplitude = grid.amplitude(peak.row) / viewport.zoom_y;
        let phase = grid.phase(peak.col);
        let (_, center_depth) = viewport.to_image(0.0, f64::from(window.height) / 2.0);
        let radius = f64::from(azimuth_width.max(1)) / std::f64::consts::TAU;
        Self {
            center_depth,
            amplitude,
            phase,
            dip_degrees: (amplitude / radius).atan().to_degrees(),
            azimuth_degrees: phase.to_degrees(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn acc(values: &[f32], side: u32) -> FloatImage {
        FloatImage::from_raw(side, side, values.to_vec()).unwrap()
    }

    #[test]
    fn finds_maximum_cell() {
        let a = acc(&[0.0, 1.0, 0.0, 0.0, 0.0, 5.0, 0.0, 2.0, 0.0], 3);
        let peak = find_peak(&a);
        assert_eq!((peak.row, peak.col, peak.value), (1, 2, 5.0));
    }

    #[test]
    fn ties_break_row_major() {
        let a = acc(&[0.0, 4.0, 4.0, 0.0], 2);
        let peak = find_peak(&a);
        assert_eq!((peak.row, peak.col), (0, 1));
    }

    #[test]
    fn flat_accumulator_reports_first_cell() {
        let peak = find_peak(&FloatImage::new(8, 8));
        assert_eq!((peak.row, peak.col, peak.value), (0, 0, 0.0));
    }

    #[test]
    fn nan_cells_are_skipped() {
        let a = acc(&[f32::NAN, 1.0, f32::NAN, 0.5], 2);
        let peak = find_peak(&a);
        assert_eq!((peak.row, peak.col), (0, 1));
    }

    #[test]
    fn neighbourhood_is_strict_euclidean_disc() {
        let a = FloatImage::new(7, 7);
        let peak = Peak {
            row: 3,
            col: 3,
            value: 0.0,
        };
        let cells = neighbourhood(&a, &peak, 2.0);
        // Distance exactly 2 is excluded: centre, 4 at distance 1, 4 at √2.
        assert_eq!(cells.len(), 9);
        assert!(cells.contains(&(2, 2)));
        assert!(!cells.contains(&(1, 3)));
        assert_eq!(neighbourhood(&a, &peak, 0.0), Vec::new());
    }

    #[test]
    fn neighbourhood_is_clipped_at_edges() {
        let a = FloatImage::new(4, 4);
        let peak = Peak {
            row: 0,
            col: 0,
            value: 0.0,
        };
        assert_eq!(neighbourhood(&a, &peak, 1.5), vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn estimate_converts_to_image_units() {
        let grid = ParameterGrid::new(40.0, 129);
        let peak = Peak {
            row: 64,
            col: 32,
            value: 1.0,
        };
        let viewport = ViewportState {
            zoom_y: 0.25,
            offset_y: 1000.0,
            ..ViewportState::IDENTITY
        };
        let estimate =
            DipEstimate::from_peak(&peak, grid, &viewport, WindowSize::new(361, 200), 361);
        assert_eq!(estimate.amplitude, 80.0);
        assert_eq!(estimate.center_depth, 1400.0);
        assert!((estimate.azimuth_degrees - 32.0 * 360.0 / 129.0).abs() < 1e-9);
        let expected = (80.0 * std::f64::consts::TAU / 361.0).atan().to_degrees();
        assert!((estimate.dip_degrees - expected).abs() < 1e-9);
    }

    #[test]
    fn zero_amplitude_is_horizontal() {
        let peak = Peak {
            row: 0,
            col: 5,
            value: 1.0,
        };
        let estimate = DipEstimate::from_peak(
            &peak,
            ParameterGrid::new(40.0, 64),
            &ViewportState::IDENTITY,
            WindowSize::default(),
            361,
        );
        assert_eq!(estimate.dip_degrees, 0.0);
    }
}
