//! Generalized Hough transform over sinusoids.
//!
//! A plane cutting the borehole wall traces, in an unrolled strip of
//! width `w` and height `h`,
//!
//! ```text
//! depth(x) = h/2 + A·cos(2π·x/w − B)
//! ```
//!
//! The accumulator discretizes `(A, B)`: row `i` holds amplitude
//! `A_i = aradius·i/(tside−1)` and column `j` holds phase
//! `B_j = 2π·j/tside`. Each cell sums, over every strip column, the vote
//! weight found on its predicted curve (linearly interpolated along
//! depth). Cost is `O(w·tside²)`.
//!
//! How the strip becomes per-cell weights is pluggable via
//! [`VoteWeight`]; [`VoteWeighting`] is the built-in set.

use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::FloatImage;

// ─── Vote weighting ──────────────────────────────────────────────────

/// Converts a (gap-free, smoothed) strip into non-negative vote weights.
pub trait VoteWeight {
    /// Write one weight per strip cell into `weights`, which has the same
    /// dimensions as `strip`. Every written value must be finite and
    /// `>= 0`.
    fn weigh(&self, strip: &FloatImage, weights: &mut FloatImage);
}

/// Built-in vote weightings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteWeighting {
    /// `|∂²v/∂y²|`: strongest on thin layers, bright or dark.
    #[default]
    DepthCurvature,
    /// `|∂v/∂y|`: strongest on layer boundaries.
    DepthGradient,
    /// `max(v, 0)`: the raw intensity.
    Intensity,
}

impl VoteWeighting {
    /// Every built-in weighting.
    pub const ALL: [Self; 3] = [Self::DepthCurvature, Self::DepthGradient, Self::Intensity];

    /// Name used in configuration files and on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DepthCurvature => "depth_curvature",
            Self::DepthGradient => "depth_gradient",
            Self::Intensity => "intensity",
        }
    }
}

impl fmt::Display for VoteWeighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A vote weighting name that is not built in.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown vote weighting {0:?} (expected one of: depth_curvature, depth_gradient, intensity)")]
pub struct UnknownVoteWeighting(pub String);

impl FromStr for VoteWeighting {
    type Err = UnknownVoteWeighting;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|w| w.name().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| UnknownVoteWeighting(s.to_string()))
    }
}

impl VoteWeight for VoteWeighting {
    fn weigh(&self, strip: &FloatImage, weights: &mut FloatImage) {
        let (w, h) = (strip.width() as usize, strip.height() as usize);
        let src: &[f32] = strip;
        let dst: &mut [f32] = &mut **weights;
        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                let interior = y > 0 && y + 1 < h;
                let value = match self {
                    Self::DepthCurvature if interior => {
                        (src[i + w] - 2.0 * src[i] + src[i - w]).abs()
                    }
                    Self::DepthGradient if interior => 0.5 * (src[i + w] - src[i - w]).abs(),
                    Self::DepthCurvature | Self::DepthGradient => 0.0,
                    Self::Intensity => src[i].max(0.0),
                };
                dst[i] = if value.is_finite() { value } else { 0.0 };
            }
        }
    }
}

/// Zero the weights of cells flagged in `mask` (row-major, same layout).
pub fn mask_weights(weights: &mut FloatImage, mask: &[bool]) {
    for (weight, &masked) in weights.iter_mut().zip(mask) {
        if masked {
            *weight = 0.0;
        }
    }
}

// ─── Parameter grid ──────────────────────────────────────────────────

/// Discretization of the `(amplitude, phase)` plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterGrid {
    /// Largest amplitude, in strip pixels.
    pub aradius: f64,
    /// Number of bins on each axis.
    pub tside: u32,
}

impl ParameterGrid {
    /// Create a grid.
    #[must_use]
    pub const fn new(aradius: f64, tside: u32) -> Self {
        Self { aradius, tside }
    }

    /// Amplitude of accumulator row `row`.
    #[must_use]
    pub fn amplitude(self, row: u32) -> f64 {
        if self.tside <= 1 {
            return 0.0;
        }
        self.aradius * f64::from(row) / f64::from(self.tside - 1)
    }

    /// Phase (radians, `[0, 2π)`) of accumulator column `col`.
    #[must_use]
    pub fn phase(self, col: u32) -> f64 {
        TAU * f64::from(col) / f64::from(self.tside.max(1))
    }

    /// Fill `table` with `cos(2π·x/width − B_j)`, indexed `[j * width + x]`.
    pub fn cosine_table(self, width: u32, table: &mut Vec<f64>) {
        table.clear();
        table.reserve(self.tside as usize * width as usize);
        for j in 0..self.tside {
            let phase = self.phase(j);
            for x in 0..width {
                table.push((TAU * f64::from(x) / f64::from(width) - phase).cos());
            }
        }
    }
}

// ─── Accumulation ────────────────────────────────────────────────────

/// Vote every `(A, B)` cell of `grid` against `weights`.
///
/// `accumulator` is resized to `tside × tside` if needed and fully
/// overwritten; `cosines` is scratch for the per-phase cosine table.
/// Rows are amplitude bins, columns are phase bins.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn accumulate_into(
    weights: &FloatImage,
    grid: ParameterGrid,
    cosines: &mut Vec<f64>,
    accumulator: &mut FloatImage,
) {
    let tside = grid.tside;
    if accumulator.dimensions() != (tside, tside) {
        *accumulator = FloatImage::new(tside, tside);
    }
    let (w, h) = (weights.width() as usize, weights.height() as usize);
    if tside == 0 {
        return;
    }
    if w == 0 || h < 2 {
        accumulator.fill(0.0);
        return;
    }
    grid.cosine_table(weights.width(), cosines);

    let src: &[f32] = weights;
    let centre = h as f64 / 2.0;
    let last = (h - 1) as f64;

    for (row, votes) in (0..tside).zip(accumulator.chunks_exact_mut(tside as usize)) {
        let amplitude = grid.amplitude(row);
        for (col, vote) in votes.iter_mut().enumerate() {
            let curve = &cosines[col * w..(col + 1) * w];
            let mut sum = 0.0_f64;
            for (x, &c) in curve.iter().enumerate() {
                let y = amplitude.mul_add(c, centre);
                if !(0.0..last).contains(&y) {
                    continue;
                }
                let y0 = y as usize;
                let t = y - y0 as f64;
                let above = f64::from(src[y0 * w + x]);
                let below = f64::from(src[(y0 + 1) * w + x]);
                sum += (below - above).mul_add(t, above);
            }
            *vote = (sum as f32).max(0.0);
        }
    }
}

/// Allocate and return the accumulator for `weights`.
#[must_use = "returns the accumulator"]
pub fn accumulate(weights: &FloatImage, grid: ParameterGrid) -> FloatImage {
    let mut accumulator = FloatImage::new(grid.tside, grid.tside);
    accumulate_into(weights, grid, &mut Vec::new(), &mut accumulator);
    accumulator
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::cast_precision_loss)]
mod tests {
    use super::*;

    fn column_ramp(w: u32, h: u32) -> FloatImage {
        FloatImage::from_fn(w, h, |_, y| image::Luma([(y * y) as f32]))
    }

    // ─── Weighting ────────────────────────────────────────────────

    #[test]
    fn curvature_of_quadratic_is_constant() {
        let strip = column_ramp(4, 6);
        let mut weights = FloatImage::new(4, 6);
        VoteWeighting::DepthCurvature.weigh(&strip, &mut weights);
        for (_, y, p) in weights.enumerate_pixels() {
            let expected = if y == 0 || y == 5 { 0.0 } else { 2.0 };
            assert_eq!(p.0[0], expected);
        }
    }

    #[test]
    fn gradient_is_central_difference() {
        let strip = column_ramp(1, 5);
        let mut weights = FloatImage::new(1, 5);
        VoteWeighting::DepthGradient.weigh(&strip, &mut weights);
        assert_eq!(weights.as_raw(), &vec![0.0, 2.0, 4.0, 6.0, 0.0]);
    }

    #[test]
    fn intensity_clamps_negative_and_invalid() {
        let strip = FloatImage::from_raw(4, 1, vec![-1.0, 2.5, f32::NAN, f32::INFINITY]).unwrap();
        let mut weights = FloatImage::new(4, 1);
        VoteWeighting::Intensity.weigh(&strip, &mut weights);
        assert_eq!(weights.as_raw(), &vec![0.0, 2.5, 0.0, 0.0]);
    }

    #[test]
    fn masked_cells_carry_no_weight() {
        let mut weights = FloatImage::from_pixel(3, 1, image::Luma([1.0]));
        mask_weights(&mut weights, &[false, true, false]);
        assert_eq!(weights.as_raw(), &vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn weighting_names_parse() {
        for weighting in VoteWeighting::ALL {
            assert_eq!(weighting.to_string().parse::<VoteWeighting>().unwrap(), weighting);
        }
        assert_eq!(
            "depth-gradient".parse::<VoteWeighting>().unwrap(),
            VoteWeighting::DepthGradient
        );
        assert!("laplacian".parse::<VoteWeighting>().is_err());
        assert_eq!(
            serde_json::to_string(&VoteWeighting::DepthCurvature).unwrap(),
            "\"depth_curvature\""
        );
    }

    // ─── Grid ─────────────────────────────────────────────────────

    #[test]
    fn grid_spans_amplitude_and_phase() {
        let grid = ParameterGrid::new(40.0, 128);
        assert_eq!(grid.amplitude(0), 0.0);
        assert_eq!(grid.amplitude(127), 40.0);
        assert_eq!(grid.phase(0), 0.0);
        assert!((grid.phase(16) - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
        assert_eq!(ParameterGrid::new(40.0, 1).amplitude(0), 0.0);
    }

    // ─── Accumulation ─────────────────────────────────────────────

    #[test]
    fn accumulator_is_square_and_non_negative() {
        let weights = FloatImage::from_fn(37, 23, |x, y| {
            image::Luma([((x * 31 + y * 17) % 11) as f32 - 5.0])
        });
        let acc = accumulate(&weights, ParameterGrid::new(9.0, 16));
        assert_eq!(acc.dimensions(), (16, 16));
        assert!(acc.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn zero_weights_give_zero_accumulator() {
        let acc = accumulate(&FloatImage::new(20, 10), ParameterGrid::new(4.0, 8));
        assert!(acc.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn flat_line_votes_for_zero_amplitude() {
        // A single bright row through the centre: every phase of A = 0
        // sees the full row.
        let weights = FloatImage::from_fn(24, 16, |_, y| image::Luma([f32::from(y == 8)]));
        let acc = accumulate(&weights, ParameterGrid::new(6.0, 7));
        for col in 0..7 {
            assert_eq!(acc.get_pixel(col, 0).0[0], 24.0);
        }
        for row in 1..7 {
            for col in 0..7 {
                assert!(acc.get_pixel(col, row).0[0] < 24.0);
            }
        }
    }

    #[test]
    fn curve_outside_strip_casts_no_vote() {
        let weights = FloatImage::from_pixel(10, 4, image::Luma([1.0]));
        let acc = accumulate(&weights, ParameterGrid::new(100.0, 2));
        // Row 1 has A = 100: every column lands far outside the 4-row strip
        // except where the cosine is near zero.
        assert!(acc.get_pixel(0, 1).0[0] < acc.get_pixel(0, 0).0[0]);
    }

    #[test]
    fn reused_buffers_match_fresh_allocation() {
        let weights = FloatImage::from_fn(30, 12, |x, y| image::Luma([((x + y) % 3) as f32]));
        let grid = ParameterGrid::new(5.0, 10);
        let mut cosines = Vec::new();
        let mut acc = FloatImage::new(3, 3);
        accumulate_into(&weights, ParameterGrid::new(2.0, 4), &mut cosines, &mut acc);
        accumulate_into(&weights, grid, &mut cosines, &mut acc);
        assert_eq!(acc, accumulate(&weights, grid));
    }
}
