//! Interactive control loop.
//!
//! A [`Session`] owns everything one viewer needs: the tile cache, the
//! current viewport and contrast, the pipeline configuration, the
//! reusable [`Workspace`], and the last [`TransformResult`]. User actions
//! arrive as [`Command`] values, are queued, and are applied one at a
//! time on the caller's thread.
//!
//! Any command that moves the viewport discards the current transform,
//! since its accumulator no longer describes what is on screen.
//! Contrast commands only change how the strip is drawn.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::cache::TiledPyramidCache;
use crate::contrast::ContrastState;
use crate::diagnostics::{Clock, NullClock, TransformDiagnostics, process_with_diagnostics};
use crate::dump::DebugSink;
use crate::pyramid::TileSource;
use crate::render::{Overlay, render_display};
use crate::strip::{Strip, sample_strip_into};
use crate::types::{PipelineConfig, PipelineError, RgbImage, TransformResult, WindowSize};
use crate::viewport::ViewportState;
use crate::workspace::Workspace;

/// One user action. Coordinates are display pixels within the strip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Drag the view by `(dx, dy)` display pixels.
    Pan { dx: f64, dy: f64 },
    /// Zoom so one display pixel covers `(fx, fy)` image pixels, keeping
    /// `(x, y)` fixed.
    ZoomToFactor { x: f64, y: f64, fx: f64, fy: f64 },
    /// Sample one octave coarser, keeping `(x, y)` fixed.
    IncreaseOctave { x: f64, y: f64 },
    /// Sample one octave finer, keeping `(x, y)` fixed.
    DecreaseOctave { x: f64, y: f64 },
    /// Back to unit zoom at the image origin.
    ResetView,
    /// `scale *= factor`, `shift += shift`.
    ScaleContrast { factor: f64, shift: f64 },
    /// Stretch the window's finite range over the display range.
    AutoContrast,
    /// Map the value under `(x, y)` to mid-gray.
    CenterContrastAt { x: f64, y: f64 },
    /// Map the value under `(x, y)` to white.
    BaseContrastAt { x: f64, y: f64 },
    /// Scale contrast around the value currently shown as mid-gray.
    SpanContrast { factor: f64 },
    /// Run the dip transform on the current window.
    ComputeTransform,
}

impl Command {
    /// Whether applying this command moves the viewport.
    #[must_use]
    pub const fn moves_viewport(&self) -> bool {
        matches!(
            self,
            Self::Pan { .. }
                | Self::ZoomToFactor { .. }
                | Self::IncreaseOctave { .. }
                | Self::DecreaseOctave { .. }
                | Self::ResetView
        )
    }
}

/// What lies under a display pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    /// Octave-0 image x (before azimuth wrapping).
    pub image_x: f64,
    /// Octave-0 image y.
    pub image_y: f64,
    /// Raw sample, NaN outside the image.
    pub value: f32,
}

/// State of one interactive viewer.
pub struct Session<S> {
    cache: TiledPyramidCache<S>,
    viewport: ViewportState,
    contrast: ContrastState,
    config: PipelineConfig,
    window: WindowSize,
    workspace: Workspace,
    queue: VecDeque<Command>,
    result: Option<TransformResult>,
    display: Strip,
}

impl<S: TileSource> Session<S> {
    /// Start a session at unit zoom on the top of the image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` does not
    /// validate.
    pub fn new(
        cache: TiledPyramidCache<S>,
        window: WindowSize,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            cache,
            viewport: ViewportState::IDENTITY,
            contrast: ContrastState::IDENTITY,
            workspace: Workspace::new(window, config.tside),
            config,
            window,
            queue: VecDeque::new(),
            result: None,
            display: Strip::new(window),
        })
    }

    /// Queue a command for [`run_pending`](Self::run_pending).
    pub fn push(&mut self, command: Command) {
        self.queue.push_back(command);
    }

    /// Commands waiting to be applied.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Apply queued commands in order. Returns how many were applied.
    ///
    /// # Errors
    ///
    /// Stops at the first failing command; it is dropped and the rest
    /// stay queued.
    pub fn run_pending(&mut self) -> Result<usize, PipelineError> {
        let mut applied = 0;
        while let Some(command) = self.queue.pop_front() {
            self.apply(command)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Apply one command immediately.
    ///
    /// # Errors
    ///
    /// Contrast commands that read a sample and
    /// [`Command::ComputeTransform`] can fail on tile decoding.
    pub fn apply(&mut self, command: Command) -> Result<(), PipelineError> {
        log::debug!("command {command:?}");
        if command.moves_viewport() {
            self.invalidate();
        }
        match command {
            Command::Pan { dx, dy } => self.viewport = self.viewport.panned(dx, dy),
            Command::ZoomToFactor { x, y, fx, fy } => {
                self.viewport = self.viewport.zoomed_to_factor(x, y, fx, fy);
            }
            Command::IncreaseOctave { x, y } => {
                self.viewport = self.viewport.octave_increased(x, y, self.cache.depth());
            }
            Command::DecreaseOctave { x, y } => {
                self.viewport = self.viewport.octave_decreased(x, y);
            }
            Command::ResetView => self.viewport = ViewportState::reset(),
            Command::ScaleContrast { factor, shift } => {
                self.contrast = self.contrast.changed(factor, shift);
            }
            Command::AutoContrast => {
                sample_strip_into(&mut self.cache, &self.viewport, &mut self.display)?;
                self.contrast = ContrastState::auto_from(self.display.samples.iter());
            }
            Command::CenterContrastAt { x, y } => {
                let value = self.probe(x, y)?.value;
                self.contrast = self.contrast.centered_on(value);
            }
            Command::BaseContrastAt { x, y } => {
                let value = self.probe(x, y)?.value;
                self.contrast = self.contrast.based_on(value);
            }
            Command::SpanContrast { factor } => self.contrast = self.contrast.spanned(factor),
            Command::ComputeTransform => {
                self.compute()?;
            }
        }
        Ok(())
    }

    /// Run the transform on the current window and keep the result.
    ///
    /// # Errors
    ///
    /// See [`crate::process`].
    pub fn compute(&mut self) -> Result<&TransformResult, PipelineError> {
        self.compute_with_diagnostics(None, &NullClock)
            .map(|(result, _)| result)
    }

    /// [`compute`](Self::compute), also returning per-stage diagnostics
    /// and handing intermediate rasters to `sink`.
    ///
    /// # Errors
    ///
    /// See [`crate::process`].
    pub fn compute_with_diagnostics<C: Clock>(
        &mut self,
        sink: Option<&mut dyn DebugSink>,
        clock: &C,
    ) -> Result<(&TransformResult, TransformDiagnostics), PipelineError> {
        self.invalidate();
        let (result, diagnostics) = process_with_diagnostics(
            &mut self.cache,
            &self.viewport,
            self.window,
            &self.config,
            &mut self.workspace,
            sink,
            clock,
        )?;
        log::info!(
            "depth {:.1}: dip {:.2} deg, azimuth {:.1} deg",
            result.estimate.center_depth,
            result.estimate.dip_degrees,
            result.estimate.azimuth_degrees,
        );
        Ok((self.result.insert(result), diagnostics))
    }

    /// Compose the display buffer for the current state.
    ///
    /// # Errors
    ///
    /// Propagates tile decode failures while sampling the strip.
    pub fn render(&mut self) -> Result<RgbImage, PipelineError> {
        sample_strip_into(&mut self.cache, &self.viewport, &mut self.display)?;
        let overlay = self.result.as_ref().map(|result| Overlay {
            accumulator: &result.accumulator,
            peak: &result.peak,
            peak_radius: self.config.peak_radius,
        });
        Ok(render_display(
            &self.display.samples,
            &self.contrast,
            overlay,
            self.config.tside,
        ))
    }

    /// The image point and raw sample under display pixel `(x, y)`.
    ///
    /// # Errors
    ///
    /// Propagates tile decode failures.
    pub fn probe(&mut self, x: f64, y: f64) -> Result<Probe, PipelineError> {
        let (image_x, image_y) = self.viewport.to_image(x, y);
        let value = self
            .cache
            .sample(self.viewport.octave(), image_x, image_y)?;
        Ok(Probe {
            image_x,
            image_y,
            value,
        })
    }

    /// Replace the configuration. The current transform is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] and keeps the old
    /// configuration if `config` does not validate.
    pub fn set_config(&mut self, config: PipelineConfig) -> Result<(), PipelineError> {
        config.validate()?;
        self.invalidate();
        self.config = config;
        Ok(())
    }

    fn invalidate(&mut self) {
        if let Some(result) = self.result.take() {
            self.workspace.recycle(result);
        }
    }

    /// Current viewport.
    #[must_use]
    pub const fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    /// Current contrast mapping.
    #[must_use]
    pub const fn contrast(&self) -> &ContrastState {
        &self.contrast
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Strip window size.
    #[must_use]
    pub const fn window(&self) -> WindowSize {
        self.window
    }

    /// The transform for the current viewport, if one has been computed.
    #[must_use]
    pub const fn result(&self) -> Option<&TransformResult> {
        self.result.as_ref()
    }

    /// The tile cache.
    #[must_use]
    pub const fn cache(&self) -> &TiledPyramidCache<S> {
        &self.cache
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use crate::blur::Smoothing;
    use crate::pyramid::{MemoryPyramid, SampleFormat, TileShape};
    use crate::types::FloatImage;

    /// 32×64 image whose value is its row index.
    fn session() -> Session<MemoryPyramid> {
        let base = FloatImage::from_fn(32, 64, |_, y| image::Luma([y as f32]));
        let pyramid =
            MemoryPyramid::from_base(base, 3, SampleFormat::GRAY16, TileShape::new(16, 16))
                .unwrap();
        let cache = TiledPyramidCache::new(pyramid, 1).unwrap();
        let config = PipelineConfig {
            aradius: 4.0,
            tside: 8,
            post_smooth: Smoothing::NONE,
            ..PipelineConfig::default()
        };
        Session::new(cache, WindowSize::new(32, 16), config).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let pyramid = MemoryPyramid::from_base(
            FloatImage::new(8, 8),
            1,
            SampleFormat::GRAY16,
            TileShape::new(8, 8),
        )
        .unwrap();
        let cache = TiledPyramidCache::new(pyramid, 1).unwrap();
        let config = PipelineConfig {
            tside: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            Session::new(cache, WindowSize::new(8, 8), config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn queued_commands_apply_in_order() {
        let mut s = session();
        s.push(Command::Pan { dx: 0.0, dy: -10.0 });
        s.push(Command::Pan { dx: 0.0, dy: -5.0 });
        assert_eq!(s.pending(), 2);
        assert_eq!(s.run_pending().unwrap(), 2);
        assert_eq!(s.pending(), 0);
        assert_eq!(s.viewport().offset_y, 15.0);
    }

    #[test]
    fn viewport_commands_discard_the_transform() {
        let mut s = session();
        s.apply(Command::ComputeTransform).unwrap();
        assert!(s.result().is_some());
        s.apply(Command::ScaleContrast {
            factor: 2.0,
            shift: 0.0,
        })
        .unwrap();
        assert!(s.result().is_some());
        s.apply(Command::Pan { dx: 1.0, dy: 0.0 }).unwrap();
        assert!(s.result().is_none());
    }

    #[test]
    fn octave_changes_are_capped_by_pyramid_depth() {
        let mut s = session();
        for _ in 0..5 {
            s.apply(Command::IncreaseOctave { x: 0.0, y: 0.0 }).unwrap();
        }
        assert_eq!(s.viewport().zoom_level, 2);
        s.apply(Command::ResetView).unwrap();
        assert_eq!(*s.viewport(), ViewportState::IDENTITY);
    }

    #[test]
    fn probe_reads_the_raw_sample() {
        let mut s = session();
        s.apply(Command::Pan { dx: 0.0, dy: -20.0 }).unwrap();
        let probe = s.probe(3.0, 4.0).unwrap();
        assert_eq!((probe.image_x, probe.image_y), (3.0, 24.0));
        assert_eq!(probe.value, 24.0);
        assert!(s.probe(0.0, 100.0).unwrap().value.is_nan());
    }

    #[test]
    fn center_contrast_maps_probe_to_mid_gray() {
        let mut s = session();
        s.apply(Command::CenterContrastAt { x: 0.0, y: 10.0 }).unwrap();
        assert_eq!(s.contrast().apply(10.0), 127);
        s.apply(Command::BaseContrastAt { x: 0.0, y: 10.0 }).unwrap();
        assert_eq!(s.contrast().apply(10.0), 255);
    }

    #[test]
    fn auto_contrast_spans_the_window() {
        let mut s = session();
        s.apply(Command::AutoContrast).unwrap();
        // Window rows 0..16 hold values 0..15.
        assert_eq!(s.contrast().apply(0.0), 0);
        assert_eq!(s.contrast().apply(15.0), 255);
    }

    #[test]
    fn render_shows_strip_and_accumulator() {
        let mut s = session();
        let before = s.render().unwrap();
        assert_eq!(before.dimensions(), (32 + 8, 16));
        s.apply(Command::ComputeTransform).unwrap();
        let after = s.render().unwrap();
        assert_eq!(after.dimensions(), before.dimensions());
        let peak = s.result().unwrap().peak;
        assert_eq!(*after.get_pixel(32 + peak.col, peak.row), image::Rgb([255, 0, 0]));
    }

    #[test]
    fn set_config_validates_and_invalidates() {
        let mut s = session();
        s.compute().unwrap();
        let bad = PipelineConfig {
            aradius: f64::NAN,
            ..s.config().clone()
        };
        assert!(s.set_config(bad).is_err());
        assert!(s.result().is_some());
        let good = PipelineConfig {
            tside: 4,
            ..s.config().clone()
        };
        s.set_config(good).unwrap();
        assert!(s.result().is_none());
        assert_eq!(s.compute().unwrap().accumulator.dimensions(), (4, 4));
    }

    #[test]
    fn commands_round_trip_through_json() {
        let json = r#"[{"command":"pan","dx":1.0,"dy":2.0},{"command":"compute_transform"}]"#;
        let commands: Vec<Command> = serde_json::from_str(json).unwrap();
        assert_eq!(
            commands,
            vec![Command::Pan { dx: 1.0, dy: 2.0 }, Command::ComputeTransform]
        );
    }
}
