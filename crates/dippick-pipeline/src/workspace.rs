//! Reusable buffers for the transform pipeline.
//!
//! One transform touches a strip, a weight map, an accumulator and a few
//! scratch vectors. [`Workspace`] keeps them between requests so repeated
//! transforms on the same window do not reallocate. Stages treat every
//! buffer as write-then-read; nothing carries over between calls.

use crate::strip::Strip;
use crate::types::{FloatImage, WindowSize};
use crate::TransformResult;

/// Buffers shared by the pipeline stages.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub(crate) strip: Strip,
    pub(crate) weights: FloatImage,
    pub(crate) accumulator: FloatImage,
    pub(crate) cosines: Vec<f64>,
    pub(crate) scratch: Vec<f32>,
}

impl Workspace {
    /// Allocate buffers for a `window` strip and a `tside × tside`
    /// accumulator.
    #[must_use]
    pub fn new(window: WindowSize, tside: u32) -> Self {
        Self {
            strip: Strip::new(window),
            weights: FloatImage::new(window.strip_width, window.height),
            accumulator: FloatImage::new(tside, tside),
            cosines: Vec::with_capacity(tside as usize * window.strip_width as usize),
            scratch: Vec::with_capacity(2 * window.strip_width.max(window.height).max(tside) as usize),
        }
    }

    /// Resize buffers whose shape no longer matches the request.
    pub fn prepare(&mut self, window: WindowSize, tside: u32) {
        self.strip.resize(window);
        if self.weights.dimensions() != (window.strip_width, window.height) {
            self.weights = FloatImage::new(window.strip_width, window.height);
        }
        if self.accumulator.dimensions() != (tside, tside) {
            self.accumulator = FloatImage::new(tside, tside);
        }
    }

    /// Hand a finished result's accumulator back for reuse.
    pub fn recycle(&mut self, result: TransformResult) {
        self.accumulator = result.accumulator;
    }

    /// The strip as left by the last transform (inpainted and smoothed).
    #[must_use]
    pub const fn strip(&self) -> &Strip {
        &self.strip
    }

    /// Vote weights of the last transform.
    #[must_use]
    pub const fn weights(&self) -> &FloatImage {
        &self.weights
    }

    /// Window size the buffers are currently shaped for.
    #[must_use]
    pub fn window(&self) -> WindowSize {
        self.strip.window()
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(WindowSize::default(), crate::PipelineConfig::DEFAULT_TSIDE)
    }
}
