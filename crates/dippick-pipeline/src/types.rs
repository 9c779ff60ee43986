//! Shared types for the dippick processing pipeline.

use serde::{Deserialize, Serialize};

use crate::blur::{KernelFamily, Smoothing};
use crate::inpaint::InpaintParams;
use crate::peak::{DipEstimate, Peak};
use crate::pyramid::PyramidError;
use crate::transform::{ParameterGrid, VoteWeighting};

/// Re-export `RgbImage` so downstream crates can handle the display
/// buffer without depending on `image` directly.
pub use image::RgbImage;

/// Single-channel `f32` raster used for strips, weight maps and the
/// Hough accumulator.
///
/// Row-major, `stride == width`. Invalid samples hold [`INVALID_SAMPLE`].
pub type FloatImage = image::ImageBuffer<image::Luma<f32>, Vec<f32>>;

/// Sentinel stored in a raster cell whose value is unknown (outside the
/// measured depth range, saturated, or missing from the source).
pub const INVALID_SAMPLE: f32 = f32::NAN;

/// Raw sample values above this are sensor clipping and are rejected
/// when a strip is sampled.
pub const SATURATION_THRESHOLD: f32 = 2000.0;

/// Raster dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels (azimuth axis for borehole images).
    pub width: u32,
    /// Height in pixels (depth axis for borehole images).
    pub height: u32,
}

impl Dimensions {
    /// Create a new set of dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Dimensions of the next octave: each axis halved, rounding up.
    #[must_use]
    pub const fn halved(self) -> Self {
        Self {
            width: self.width.div_ceil(2),
            height: self.height.div_ceil(2),
        }
    }

    /// Dimensions of octave `octave` below these: `ceil(d / 2^octave)`.
    #[must_use]
    pub const fn at_octave(self, octave: u32) -> Self {
        let mut dims = self;
        let mut k = 0;
        while k < octave {
            dims = dims.halved();
            k += 1;
        }
        dims
    }
}

/// Size of the strip window in display pixels.
///
/// The strip spans the full azimuth range of the borehole, so its width
/// is fixed by the image; the height is the depth extent of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    /// Strip width in display pixels (one per azimuth column).
    pub strip_width: u32,
    /// Strip height in display pixels.
    pub height: u32,
}

impl WindowSize {
    /// Azimuth width of the borehole images this tool is built for.
    pub const STRIP_WIDTH: u32 = 361;

    /// Default window height, matching the default accumulator side.
    pub const DEFAULT_HEIGHT: u32 = 512;

    /// Create a window size.
    #[must_use]
    pub const fn new(strip_width: u32, height: u32) -> Self {
        Self {
            strip_width,
            height,
        }
    }

    /// Window dimensions as a [`Dimensions`].
    #[must_use]
    pub const fn dimensions(self) -> Dimensions {
        Dimensions::new(self.strip_width, self.height)
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::new(Self::STRIP_WIDTH, Self::DEFAULT_HEIGHT)
    }
}

/// Configuration for one dip transform request.
///
/// All parameters have defaults matching the interactive viewer's
/// startup state. Call [`validate`](Self::validate) before running the
/// pipeline with user-supplied values; [`crate::process`] does so itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Inpainting of invalid strip samples.
    pub inpaint: InpaintParams,

    /// Smoothing applied to the inpainted strip before voting.
    pub pre_smooth: Smoothing,

    /// Largest sinusoid amplitude represented in the accumulator, in
    /// strip pixels.
    pub aradius: f64,

    /// Side length of the square accumulator.
    pub tside: u32,

    /// How the strip is turned into per-cell vote weights.
    pub weighting: VoteWeighting,

    /// Give zero weight to cells that were invalid before inpainting,
    /// so saturated or missing samples never vote directly.
    pub mask_invalid_votes: bool,

    /// Smoothing applied to the accumulator after voting.
    pub post_smooth: Smoothing,

    /// Radius (in accumulator cells) of the highlighted peak
    /// neighbourhood.
    pub peak_radius: f64,
}

impl PipelineConfig {
    /// Default amplitude radius: a slope of about 1.5 on a 361-column image.
    pub const DEFAULT_ARADIUS: f64 = 86.0;

    /// Default accumulator side.
    pub const DEFAULT_TSIDE: u32 = 512;

    /// Default pre-smoothing kernel family.
    pub const DEFAULT_PRE_SMOOTH_FAMILY: KernelFamily = KernelFamily::Gaussian;

    /// Default pre-smoothing sigma (both axes).
    pub const DEFAULT_PRE_SMOOTH_SIGMA: f32 = 1.0;

    /// Default post-smoothing kernel family.
    pub const DEFAULT_POST_SMOOTH_FAMILY: KernelFamily = KernelFamily::Cauchy;

    /// Default post-smoothing sigma (both axes).
    pub const DEFAULT_POST_SMOOTH_SIGMA: f32 = 1.0;

    /// Default peak neighbourhood radius.
    pub const DEFAULT_PEAK_RADIUS: f64 = 20.0;

    /// Check the invariants the pipeline relies on.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// violated invariant.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.tside == 0 {
            return Err(PipelineError::InvalidConfig(
                "tside must be at least 1".to_string(),
            ));
        }
        if !self.aradius.is_finite() || self.aradius < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "aradius must be finite and non-negative, got {}",
                self.aradius
            )));
        }
        if !self.peak_radius.is_finite() || self.peak_radius < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "peak_radius must be finite and non-negative, got {}",
                self.peak_radius
            )));
        }
        self.inpaint.validate()?;
        self.pre_smooth.validate()?;
        self.post_smooth.validate()?;
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inpaint: InpaintParams::default(),
            pre_smooth: Smoothing::isotropic(
                Self::DEFAULT_PRE_SMOOTH_FAMILY,
                Self::DEFAULT_PRE_SMOOTH_SIGMA,
            ),
            aradius: Self::DEFAULT_ARADIUS,
            tside: Self::DEFAULT_TSIDE,
            weighting: VoteWeighting::default(),
            mask_invalid_votes: true,
            post_smooth: Smoothing::isotropic(
                Self::DEFAULT_POST_SMOOTH_FAMILY,
                Self::DEFAULT_POST_SMOOTH_SIGMA,
            ),
            peak_radius: Self::DEFAULT_PEAK_RADIUS,
        }
    }
}

/// Output of one transform request.
#[derive(Debug, Clone)]
pub struct TransformResult {
    /// Post-smoothed `tside × tside` accumulator; rows are amplitude
    /// bins, columns phase bins.
    pub accumulator: FloatImage,
    /// Highest accumulator cell.
    pub peak: Peak,
    /// The peak read as a dip in image terms.
    pub estimate: DipEstimate,
    /// Discretization the accumulator was built on.
    pub grid: ParameterGrid,
}

/// Errors that can occur while running a transform request.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// The pyramid or its tile cache failed.
    #[error(transparent)]
    Pyramid(#[from] PyramidError),
}
