//! Affine mapping from raw sample values to display intensity.

use serde::{Deserialize, Serialize};

/// `display = clamp(scale * value + shift, 0, 255)`.
///
/// Like [`ViewportState`](crate::ViewportState), every operation returns
/// a new snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContrastState {
    /// Multiplier applied to raw values.
    pub scale: f64,
    /// Offset added after scaling.
    pub shift: f64,
}

/// Display intensity at the middle of the range.
const MID: f64 = 127.5;
/// Brightest display intensity.
const TOP: f64 = 255.0;

impl ContrastState {
    /// Raw values shown unchanged.
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        shift: 0.0,
    };

    /// Multiply the scale and add to the shift.
    #[must_use]
    pub fn changed(self, factor: f64, shift: f64) -> Self {
        Self {
            scale: self.scale * factor,
            shift: self.shift + shift,
        }
    }

    /// Map `[min, max]` onto `[0, 255]`.
    ///
    /// An empty, inverted or non-finite range falls back to `[0, 255]`.
    #[must_use]
    pub fn auto_range(min: f64, max: f64) -> Self {
        let (min, max) = if min.is_finite() && max.is_finite() && max > min {
            (min, max)
        } else {
            (0.0, TOP)
        };
        let scale = TOP / (max - min);
        Self {
            scale,
            shift: -scale * min,
        }
    }

    /// [`auto_range`](Self::auto_range) over the finite values of `samples`.
    #[must_use]
    pub fn auto_from<'a>(samples: impl IntoIterator<Item = &'a f32>) -> Self {
        let (min, max) = samples
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(f64::from(v)), hi.max(f64::from(v)))
            });
        Self::auto_range(min, max)
    }

    /// Keep the scale, shift so `value` lands mid-grey.
    #[must_use]
    pub fn centered_on(self, value: f32) -> Self {
        Self {
            shift: self.scale.mul_add(-finite_or_zero(value), MID),
            ..self
        }
    }

    /// Keep the scale, shift so `value` lands at full white.
    #[must_use]
    pub fn based_on(self, value: f32) -> Self {
        Self {
            shift: self.scale.mul_add(-finite_or_zero(value), TOP),
            ..self
        }
    }

    /// Scale contrast by `factor` around the value currently shown
    /// mid-grey. A zero scale or a degenerate factor is left alone.
    #[must_use]
    pub fn spanned(self, factor: f64) -> Self {
        if self.scale == 0.0 || !factor.is_finite() || factor == 0.0 {
            return self;
        }
        let centre = (MID - self.shift) / self.scale;
        let scale = self.scale * factor;
        Self {
            scale,
            shift: scale.mul_add(-centre, MID),
        }
    }

    /// Display intensity of a raw value. Invalid samples are black.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn apply(self, value: f32) -> u8 {
        if !value.is_finite() {
            return 0;
        }
        self.scale
            .mul_add(f64::from(value), self.shift)
            .clamp(0.0, TOP) as u8
    }
}

fn finite_or_zero(value: f32) -> f64 {
    if value.is_finite() { f64::from(value) } else { 0.0 }
}

impl Default for ContrastState {
    fn default() -> Self {
        Self::IDENTITY
    }
}
