//! Gap filling by recursive diffusion.
//!
//! Invalid (non-finite) cells of a raster are replaced by an approximate
//! solution of the discrete Laplace equation with the finite cells as
//! boundary values. Each level runs damped Gauss–Seidel sweeps over the
//! holes only:
//!
//! ```text
//! u += timestep * Σ (n - u)     over the available 4-neighbours
//! ```
//!
//! Sweeps alone propagate information one cell per sweep, so the starting
//! guess for each hole comes from solving the same problem on a grid
//! twice as coarse (a coarse cell is known if any of its children is, and
//! holds their mean). This makes every hole reachable regardless of its
//! size, up to `max_depth` levels of recursion.
//!
//! A raster with no finite cell at all settles to zero everywhere.

use serde::{Deserialize, Serialize};

use crate::types::{FloatImage, PipelineError};

/// Relaxation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InpaintParams {
    /// Damping factor of each update. Must be in `(0, 0.5)`.
    pub timestep: f32,
    /// Maximum Gauss–Seidel sweeps per level.
    pub sweeps: u32,
    /// Maximum number of coarser levels to recurse into.
    pub max_depth: u32,
    /// Stop sweeping a level once the largest update falls below this.
    pub tolerance: f32,
    /// Treat the left and right edges as neighbours (azimuth wraparound).
    pub wrap_azimuth: bool,
}

impl InpaintParams {
    /// Default damping factor.
    pub const DEFAULT_TIMESTEP: f32 = 0.4;
    /// Default sweep budget per level.
    pub const DEFAULT_SWEEPS: u32 = 10;
    /// Default recursion limit.
    pub const DEFAULT_MAX_DEPTH: u32 = 99;
    /// Default convergence tolerance.
    pub const DEFAULT_TOLERANCE: f32 = 1e-4;

    /// Check that the relaxation is stable.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the timestep is outside
    /// `(0, 0.5)` or the tolerance is negative or not finite.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.timestep > 0.0 && self.timestep < 0.5) {
            return Err(PipelineError::InvalidConfig(format!(
                "inpaint timestep must be in (0, 0.5), got {}",
                self.timestep
            )));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "inpaint tolerance must be finite and non-negative, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

impl Default for InpaintParams {
    fn default() -> Self {
        Self {
            timestep: Self::DEFAULT_TIMESTEP,
            sweeps: Self::DEFAULT_SWEEPS,
            max_depth: Self::DEFAULT_MAX_DEPTH,
            tolerance: Self::DEFAULT_TOLERANCE,
            wrap_azimuth: false,
        }
    }
}

/// What [`fill_gaps`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InpaintStats {
    /// Cells that were invalid on entry.
    pub holes: usize,
    /// Grid levels visited, including the full-resolution one. Zero when
    /// there was nothing to fill.
    pub levels: u32,
}

/// Replace every non-finite cell of `image` with a diffused value.
///
/// Finite cells are never modified.
pub fn fill_gaps(image: &mut FloatImage, params: &InpaintParams) -> InpaintStats {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let data: &mut [f32] = &mut **image;
    let known: Vec<bool> = data.iter().map(|v| v.is_finite()).collect();
    let holes = known.iter().filter(|k| !**k).count();
    if holes == 0 {
        return InpaintStats::default();
    }

    let mut levels = 0;
    solve_level(
        &mut Level {
            values: data,
            known: &known,
            width: w,
            height: h,
        },
        params,
        params.max_depth,
        &mut levels,
    );
    log::trace!("filled {holes} holes over {levels} levels");
    InpaintStats { holes, levels }
}

struct Level<'a> {
    values: &'a mut [f32],
    known: &'a [bool],
    width: usize,
    height: usize,
}

fn solve_level(level: &mut Level<'_>, params: &InpaintParams, depth_left: u32, levels: &mut u32) {
    *levels += 1;
    let (w, h) = (level.width, level.height);

    if depth_left > 0 && (w > 1 || h > 1) {
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        let mut coarse_values = vec![0.0_f32; cw * ch];
        let mut coarse_known = vec![false; cw * ch];
        restrict(level, cw, ch, &mut coarse_values, &mut coarse_known);

        if coarse_known.iter().any(|k| !k) {
            solve_level(
                &mut Level {
                    values: &mut coarse_values,
                    known: &coarse_known,
                    width: cw,
                    height: ch,
                },
                params,
                depth_left - 1,
                levels,
            );
        }

        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                if !level.known[i] {
                    level.values[i] = coarse_values[(y / 2) * cw + x / 2];
                }
            }
        }
    } else {
        for (v, &k) in level.values.iter_mut().zip(level.known) {
            if !k {
                *v = 0.0;
            }
        }
    }

    relax(level, params);
}

/// Coarse cell = mean of its known children.
fn restrict(
    level: &Level<'_>,
    cw: usize,
    ch: usize,
    coarse_values: &mut [f32],
    coarse_known: &mut [bool],
) {
    let (w, h) = (level.width, level.height);
    for cy in 0..ch {
        for cx in 0..cw {
            let mut sum = 0.0_f32;
            let mut count = 0_u16;
            for y in (2 * cy)..(2 * cy + 2).min(h) {
                for x in (2 * cx)..(2 * cx + 2).min(w) {
                    let i = y * w + x;
                    if level.known[i] {
                        sum += level.values[i];
                        count += 1;
                    }
                }
            }
            if count > 0 {
                coarse_values[cy * cw + cx] = sum / f32::from(count);
                coarse_known[cy * cw + cx] = true;
            }
        }
    }
}

fn relax(level: &mut Level<'_>, params: &InpaintParams) {
    let (w, h) = (level.width, level.height);
    let wrap = params.wrap_azimuth && w > 1;
    let values = &mut *level.values;

    for _ in 0..params.sweeps {
        let mut max_change = 0.0_f32;
        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                if level.known[i] {
                    continue;
                }
                let u = values[i];
                let mut flux = 0.0_f32;
                if x > 0 {
                    flux += values[i - 1] - u;
                } else if wrap {
                    flux += values[i + w - 1] - u;
                }
                if x + 1 < w {
                    flux += values[i + 1] - u;
                } else if wrap {
                    flux += values[i + 1 - w] - u;
                }
                if y > 0 {
                    flux += values[i - w] - u;
                }
                if y + 1 < h {
                    flux += values[i + w] - u;
                }
                let delta = params.timestep * flux;
                values[i] = u + delta;
                max_change = max_change.max(delta.abs());
            }
        }
        if max_change < params.tolerance {
            break;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    const NAN: f32 = f32::NAN;

    fn grid(w: u32, h: u32, values: &[f32]) -> FloatImage {
        FloatImage::from_raw(w, h, values.to_vec()).unwrap()
    }

    fn tight() -> InpaintParams {
        InpaintParams {
            sweeps: 200,
            tolerance: 1e-7,
            ..InpaintParams::default()
        }
    }

    #[test]
    fn single_hole_with_equal_neighbours_becomes_that_value() {
        let mut g = grid(3, 3, &[0.0, 7.0, 0.0, 7.0, NAN, 7.0, 0.0, 7.0, 0.0]);
        let stats = fill_gaps(&mut g, &tight());
        assert_eq!(stats.holes, 1);
        assert!((g.get_pixel(1, 1).0[0] - 7.0).abs() < 1e-4);
    }

    #[test]
    fn single_hole_in_uniform_field_uses_defaults() {
        let mut values = vec![4.5_f32; 25];
        values[12] = NAN;
        let mut g = grid(5, 5, &values);
        fill_gaps(&mut g, &InpaintParams::default());
        assert!((g.get_pixel(2, 2).0[0] - 4.5).abs() < 1e-4);
    }

    #[test]
    fn known_cells_are_untouched() {
        let original = [1.0, NAN, 3.0, NAN, 5.0, 6.0];
        let mut g = grid(3, 2, &original);
        fill_gaps(&mut g, &InpaintParams::default());
        for (v, o) in g.iter().zip(original) {
            if o.is_finite() {
                assert_eq!(*v, o);
            } else {
                assert!(v.is_finite());
            }
        }
    }

    #[test]
    fn edge_hole_uses_available_neighbours() {
        let mut g = grid(3, 1, &[1.0, NAN, 3.0]);
        fill_gaps(&mut g, &InpaintParams::default());
        assert!((g.get_pixel(1, 0).0[0] - 2.0).abs() < 1e-3);
    }

    #[test]
    fn large_gap_is_filled_smoothly() {
        // Left column 0, right column 10, everything in between missing.
        let (w, h) = (32_u32, 8_u32);
        let mut g = FloatImage::from_fn(w, h, |x, _| {
            image::Luma([match x {
                0 => 0.0,
                31 => 10.0,
                _ => NAN,
            }])
        });
        fill_gaps(&mut g, &InpaintParams::default());
        for y in 0..h {
            let mut previous = g.get_pixel(0, y).0[0];
            for x in 1..w {
                let v = g.get_pixel(x, y).0[0];
                assert!(v.is_finite());
                assert!((-0.5..=10.5).contains(&v), "({x}, {y}) = {v}");
                assert!(v >= previous - 0.5, "({x}, {y}) = {v} after {previous}");
                previous = v;
            }
        }
    }

    #[test]
    fn all_invalid_settles_to_zero() {
        let mut g = grid(4, 3, &[NAN; 12]);
        let stats = fill_gaps(&mut g, &InpaintParams::default());
        assert_eq!(stats.holes, 12);
        assert!(g.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn nothing_to_fill_is_a_no_op() {
        let mut g = grid(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let stats = fill_gaps(&mut g, &InpaintParams::default());
        assert_eq!(stats, InpaintStats::default());
        assert_eq!(g.as_raw(), &vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn azimuth_wrap_changes_edge_neighbourhood() {
        let row = [NAN, 0.0, 10.0];
        let mut open = grid(3, 1, &row);
        fill_gaps(&mut open, &tight());
        assert!(open.get_pixel(0, 0).0[0].abs() < 1e-3);

        let mut wrapped = grid(3, 1, &row);
        fill_gaps(
            &mut wrapped,
            &InpaintParams {
                wrap_azimuth: true,
                ..tight()
            },
        );
        assert!((wrapped.get_pixel(0, 0).0[0] - 5.0).abs() < 1e-3);
    }

    #[test]
    fn deterministic_for_fixed_inputs() {
        let values: Vec<f32> = (0..64_u8)
            .map(|i| if i % 5 == 0 { NAN } else { f32::from(i) })
            .collect();
        let mut a = grid(8, 8, &values);
        let mut b = grid(8, 8, &values);
        fill_gaps(&mut a, &InpaintParams::default());
        fill_gaps(&mut b, &InpaintParams::default());
        let bits = |g: &FloatImage| g.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn zero_depth_starts_holes_at_zero() {
        let mut g = grid(3, 1, &[4.0, NAN, 4.0]);
        let params = InpaintParams {
            max_depth: 0,
            sweeps: 1,
            ..InpaintParams::default()
        };
        let stats = fill_gaps(&mut g, &params);
        assert_eq!(stats.levels, 1);
        // One damped step from 0 towards 4: 0 + 0.4 * (4 + 4).
        assert!((g.get_pixel(1, 0).0[0] - 3.2).abs() < 1e-6);
    }

    #[test]
    fn unstable_timestep_is_rejected() {
        for timestep in [0.0, 0.5, -0.1, f32::NAN] {
            let params = InpaintParams {
                timestep,
                ..InpaintParams::default()
            };
            assert!(params.validate().is_err(), "{timestep}");
        }
        InpaintParams::default().validate().unwrap();
    }
}
