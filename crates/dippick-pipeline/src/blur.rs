//! Separable smoothing of float rasters.
//!
//! A 1D kernel from a [`KernelFamily`] is convolved along each axis in
//! turn, with an independent sigma per axis. The same routine smooths the
//! inpainted strip before voting and the accumulator after it.
//!
//! Samples outside the grid contribute nothing; each output value is
//! divided by the sum of the kernel weights that landed inside the grid,
//! so a constant raster stays constant right up to its borders.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{FloatImage, PipelineError};

/// Shape of the 1D smoothing kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelFamily {
    /// `exp(-t²/2)`: bell-shaped, fast tail decay.
    #[default]
    Gaussian,
    /// `1 / (1 + t²)`: heavy-tailed.
    Cauchy,
    /// `exp(-|t|)`: exponential tail.
    Laplace,
}

struct FamilyEntry {
    name: &'static str,
    profile: fn(f32) -> f32,
    /// Kernel half-width in multiples of sigma.
    support: f32,
}

fn gaussian_profile(t: f32) -> f32 {
    (-0.5 * t * t).exp()
}

fn cauchy_profile(t: f32) -> f32 {
    1.0 / t.mul_add(t, 1.0)
}

fn laplace_profile(t: f32) -> f32 {
    (-t.abs()).exp()
}

/// Indexed by `KernelFamily as usize`.
static FAMILIES: [FamilyEntry; 3] = [
    FamilyEntry {
        name: "gaussian",
        profile: gaussian_profile,
        support: 4.0,
    },
    FamilyEntry {
        name: "cauchy",
        profile: cauchy_profile,
        support: 20.0,
    },
    FamilyEntry {
        name: "laplace",
        profile: laplace_profile,
        support: 8.0,
    },
];

impl KernelFamily {
    /// Every family, in registry order.
    pub const ALL: [Self; 3] = [Self::Gaussian, Self::Cauchy, Self::Laplace];

    fn entry(self) -> &'static FamilyEntry {
        &FAMILIES[self as usize]
    }

    /// Lowercase name used in configuration files and on the command line.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.entry().name
    }

    /// Build the (unnormalized) kernel for `sigma`.
    ///
    /// The kernel has odd length `2r + 1`, centred on index `r`. A
    /// non-positive or non-finite sigma gives the single-tap identity
    /// kernel `[1.0]`.
    #[must_use]
    pub fn kernel(self, sigma: f32) -> Vec<f32> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return vec![1.0];
        }
        let entry = self.entry();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let radius = (entry.support * sigma).ceil().max(1.0) as usize;
        #[allow(clippy::cast_precision_loss)]
        (0..=2 * radius)
            .map(|i| (entry.profile)((i as f32 - radius as f32) / sigma))
            .collect()
    }
}

impl fmt::Display for KernelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A kernel family name that is not in the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown kernel family {0:?} (expected one of: gaussian, cauchy, laplace)")]
pub struct UnknownKernelFamily(pub String);

impl FromStr for KernelFamily {
    type Err = UnknownKernelFamily;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|family| family.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownKernelFamily(s.to_string()))
    }
}

/// Kernel family plus one sigma per axis.
///
/// A sigma of zero (or below) leaves that axis untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Smoothing {
    /// Kernel shape.
    pub family: KernelFamily,
    /// Sigma along the horizontal (azimuth / phase) axis, in pixels.
    pub sigma_x: f32,
    /// Sigma along the vertical (depth / amplitude) axis, in pixels.
    pub sigma_y: f32,
}

impl Smoothing {
    /// Default sigma for both axes.
    pub const DEFAULT_SIGMA: f32 = 1.0;

    /// No smoothing at all.
    pub const NONE: Self = Self {
        family: KernelFamily::Gaussian,
        sigma_x: 0.0,
        sigma_y: 0.0,
    };

    /// Same sigma on both axes.
    #[must_use]
    pub const fn isotropic(family: KernelFamily, sigma: f32) -> Self {
        Self {
            family,
            sigma_x: sigma,
            sigma_y: sigma,
        }
    }

    /// Whether this smoothing leaves every raster unchanged.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.sigma_x <= 0.0 && self.sigma_y <= 0.0
    }

    /// Reject non-finite sigmas.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if either sigma is NaN or
    /// infinite.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.sigma_x.is_finite() || !self.sigma_y.is_finite() {
            return Err(PipelineError::InvalidConfig(format!(
                "{} smoothing sigmas must be finite, got ({}, {})",
                self.family, self.sigma_x, self.sigma_y
            )));
        }
        Ok(())
    }
}

impl Default for Smoothing {
    fn default() -> Self {
        Self::isotropic(KernelFamily::default(), Self::DEFAULT_SIGMA)
    }
}

/// Smooth `image` in place.
///
/// `scratch` is reused between calls to avoid reallocating line buffers;
/// its contents on entry are ignored.
pub fn smooth_in_place(image: &mut FloatImage, smoothing: &Smoothing, scratch: &mut Vec<f32>) {
    let (w, h) = (image.width() as usize, image.height() as usize);
    if w == 0 || h == 0 {
        return;
    }
    scratch.clear();
    scratch.resize(2 * w.max(h), 0.0);
    let data: &mut [f32] = &mut **image;

    if smoothing.sigma_x > 0.0 {
        let kernel = smoothing.family.kernel(smoothing.sigma_x);
        let line = &mut scratch[..w];
        for row in data.chunks_exact_mut(w) {
            line.copy_from_slice(row);
            convolve_line(line, &kernel, row);
        }
    }

    if smoothing.sigma_y > 0.0 {
        let kernel = smoothing.family.kernel(smoothing.sigma_y);
        let (column, out) = scratch.split_at_mut(h);
        let out = &mut out[..h];
        for x in 0..w {
            for (y, v) in column.iter_mut().enumerate() {
                *v = data[y * w + x];
            }
            convolve_line(column, &kernel, out);
            for (y, v) in out.iter().enumerate() {
                data[y * w + x] = *v;
            }
        }
    }
}

/// Smooth a copy of `image`.
#[must_use = "returns the smoothed image"]
pub fn smooth(image: &FloatImage, smoothing: &Smoothing) -> FloatImage {
    let mut out = image.clone();
    smooth_in_place(&mut out, smoothing, &mut Vec::new());
    out
}

/// Convolve `src` with a centred kernel, renormalizing at the borders.
fn convolve_line(src: &[f32], kernel: &[f32], dst: &mut [f32]) {
    let n = src.len();
    let r = kernel.len() / 2;
    for (i, out) in dst.iter_mut().enumerate() {
        let lo = i.saturating_sub(r);
        let hi = (i + r).min(n - 1);
        let mut sum = 0.0_f32;
        let mut norm = 0.0_f32;
        for (j, &v) in src.iter().enumerate().take(hi + 1).skip(lo) {
            let weight = kernel[j + r - i];
            sum = weight.mul_add(v, sum);
            norm += weight;
        }
        *out = if norm > 0.0 { sum / norm } else { src[i] };
    }
}
