//! dippick-pipeline: dip picking on borehole image pyramids (sans-IO).
//!
//! A window of an unrolled borehole image is sampled from a tiled
//! pyramid, its gaps are filled, and every strip column votes for the
//! sinusoids `h/2 + A·cos(2πx/w − B)` passing through it. The strongest
//! `(A, B)` is the dip of the plane crossing the borehole:
//!
//! pyramid cache -> strip -> inpaint -> smooth -> vote weights ->
//! Hough accumulator -> smooth -> peak -> dip estimate.
//!
//! This crate has **no I/O dependencies**. Tiles come from a
//! [`TileSource`] implementation and results are in-memory rasters; all
//! filesystem interaction lives in `dippick-io`.

pub mod blur;
pub mod cache;
pub mod contrast;
pub mod diagnostics;
pub mod dump;
pub mod inpaint;
pub mod peak;
mod pipeline;
pub mod pyramid;
pub mod render;
pub mod session;
pub mod strip;
pub mod transform;
pub mod types;
pub mod viewport;
pub mod workspace;

pub use blur::{KernelFamily, Smoothing};
pub use cache::{CacheStats, TiledPyramidCache};
pub use contrast::ContrastState;
pub use diagnostics::{Clock, NullClock, TransformDiagnostics, process_with_diagnostics};
pub use dump::{DebugRaster, DebugSink, DumpStage};
pub use inpaint::InpaintParams;
pub use peak::{DipEstimate, Peak};
pub use pyramid::{
    MemoryPyramid, PyramidDescriptor, PyramidError, SampleFormat, TileKey, TileShape, TileSource,
};
pub use session::{Command, Probe, Session};
pub use transform::{ParameterGrid, VoteWeight, VoteWeighting};
pub use types::{
    Dimensions, FloatImage, PipelineConfig, PipelineError, RgbImage, TransformResult, WindowSize,
};
pub use viewport::ViewportState;
pub use workspace::Workspace;

/// Run the dip transform on the window under `viewport`.
///
/// # Pipeline steps
///
/// 1. Sample a `window` strip from the pyramid octave the viewport
///    selects; out-of-range and saturated samples are marked invalid
/// 2. Fill invalid cells by multigrid diffusion
/// 3. Smooth the strip
/// 4. Convert it to vote weights, zeroing invalid cells
/// 5. Accumulate votes over the `(A, B)` grid
/// 6. Smooth the accumulator
/// 7. Take the highest cell and read it as a dip
///
/// Buffers come from `workspace`; hand the result back with
/// [`Workspace::recycle`] to reuse its accumulator.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` does not
/// validate, and [`PipelineError::Pyramid`] if the viewport's octave is
/// not in the pyramid or a tile fails to decode.
pub fn process<S: TileSource>(
    cache: &mut TiledPyramidCache<S>,
    viewport: &ViewportState,
    window: WindowSize,
    config: &PipelineConfig,
    workspace: &mut Workspace,
) -> Result<TransformResult, PipelineError> {
    pipeline::run(cache, viewport, window, config, workspace, None, &NullClock)
        .map(|(result, _)| result)
}
