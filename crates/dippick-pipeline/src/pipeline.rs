//! The staged transform runner behind [`crate::process`] and
//! [`crate::diagnostics::process_with_diagnostics`].
//!
//! Stages, in order:
//!
//! 1. sample the strip under the viewport through the tile cache
//! 2. fill invalid cells
//! 3. pre-smooth the strip
//! 4. derive vote weights, zeroing cells that were invalid
//! 5. accumulate votes over the `(A, B)` grid
//! 6. post-smooth the accumulator
//! 7. pick the peak and read it as a dip
//!
//! Every buffer lives in the caller's [`Workspace`]; the accumulator is
//! moved into the returned [`TransformResult`].

use crate::blur::{Smoothing, smooth_in_place};
use crate::cache::TiledPyramidCache;
use crate::diagnostics::{
    Clock, StageDiagnostics, StageMetrics, TransformDiagnostics, TransformSummary,
};
use crate::dump::{DebugSink, DumpStage};
use crate::inpaint::fill_gaps;
use crate::peak::{DipEstimate, find_peak};
use crate::pyramid::TileSource;
use crate::strip::sample_strip_into;
use crate::transform::{ParameterGrid, VoteWeight, accumulate_into, mask_weights};
use crate::types::{FloatImage, PipelineConfig, PipelineError, WindowSize};
use crate::viewport::ViewportState;
use crate::workspace::Workspace;
use crate::TransformResult;

/// Run one timed stage.
fn timed<C: Clock, T>(
    clock: &C,
    stage: impl FnOnce() -> Result<(T, StageMetrics), PipelineError>,
) -> Result<(T, StageDiagnostics), PipelineError> {
    let start = clock.now();
    let (value, metrics) = stage()?;
    Ok((
        value,
        StageDiagnostics {
            duration: clock.elapsed(&start),
            metrics,
        },
    ))
}

fn emit(sink: &mut Option<&mut dyn DebugSink>, stage: DumpStage, raster: &FloatImage) {
    if let Some(sink) = sink.as_deref_mut() {
        sink.dump(stage, raster);
    }
}

fn smoothing_metrics(smoothing: &Smoothing) -> StageMetrics {
    StageMetrics::Smooth {
        family: smoothing.family,
        sigma_x: smoothing.sigma_x,
        sigma_y: smoothing.sigma_y,
    }
}

pub(crate) fn run<S: TileSource, C: Clock>(
    cache: &mut TiledPyramidCache<S>,
    viewport: &ViewportState,
    window: WindowSize,
    config: &PipelineConfig,
    workspace: &mut Workspace,
    mut sink: Option<&mut dyn DebugSink>,
    clock: &C,
) -> Result<(TransformResult, TransformDiagnostics), PipelineError> {
    config.validate()?;
    let total_start = clock.now();
    let grid = ParameterGrid::new(config.aradius, config.tside);
    log::debug!(
        "transform: {}x{} window at octave {} offset ({:.1}, {:.1}), tside {}",
        window.strip_width,
        window.height,
        viewport.octave(),
        viewport.offset_x,
        viewport.offset_y,
        config.tside,
    );
    workspace.prepare(window, config.tside);

    // 1. Strip sampling.
    let ((), sample) = timed(clock, || {
        let before = cache.stats();
        let stats = sample_strip_into(cache, viewport, &mut workspace.strip)?;
        Ok((
            (),
            StageMetrics::Sample {
                octave: viewport.octave(),
                out_of_range: stats.out_of_range,
                saturated: stats.saturated,
                cache: cache.stats().since(before),
            },
        ))
    })?;
    emit(&mut sink, DumpStage::Strip, &workspace.strip.samples);

    // 2. Gap filling.
    let ((), inpaint) = timed(clock, || {
        let stats = fill_gaps(&mut workspace.strip.samples, &config.inpaint);
        Ok((
            (),
            StageMetrics::Inpaint {
                holes: stats.holes,
                levels: stats.levels,
            },
        ))
    })?;
    emit(&mut sink, DumpStage::Inpainted, &workspace.strip.samples);

    // 3. Strip smoothing.
    let ((), pre_smooth) = timed(clock, || {
        smooth_in_place(
            &mut workspace.strip.samples,
            &config.pre_smooth,
            &mut workspace.scratch,
        );
        Ok(((), smoothing_metrics(&config.pre_smooth)))
    })?;
    emit(&mut sink, DumpStage::Smoothed, &workspace.strip.samples);

    // 4. Vote weights.
    let ((), weigh) = timed(clock, || {
        config
            .weighting
            .weigh(&workspace.strip.samples, &mut workspace.weights);
        let masked = if config.mask_invalid_votes {
            mask_weights(&mut workspace.weights, &workspace.strip.invalid);
            workspace.strip.invalid_count()
        } else {
            0
        };
        let total_weight = workspace.weights.iter().map(|v| f64::from(*v)).sum();
        Ok((
            (),
            StageMetrics::Weigh {
                weighting: config.weighting,
                masked,
                total_weight,
            },
        ))
    })?;

    // 5. Accumulation.
    let ((), accumulate) = timed(clock, || {
        accumulate_into(
            &workspace.weights,
            grid,
            &mut workspace.cosines,
            &mut workspace.accumulator,
        );
        let max_vote = workspace.accumulator.iter().copied().fold(0.0, f32::max);
        Ok((
            (),
            StageMetrics::Accumulate {
                tside: grid.tside,
                aradius: grid.aradius,
                max_vote,
            },
        ))
    })?;
    emit(&mut sink, DumpStage::Accumulator, &workspace.accumulator);

    // 6. Accumulator smoothing.
    let ((), post_smooth) = timed(clock, || {
        smooth_in_place(
            &mut workspace.accumulator,
            &config.post_smooth,
            &mut workspace.scratch,
        );
        Ok(((), smoothing_metrics(&config.post_smooth)))
    })?;

    // 7. Peak.
    let (peak_cell, peak) = timed(clock, || {
        let found = find_peak(&workspace.accumulator);
        Ok((
            found,
            StageMetrics::Peak {
                row: found.row,
                col: found.col,
                value: found.value,
            },
        ))
    })?;

    let estimate = DipEstimate::from_peak(
        &peak_cell,
        grid,
        viewport,
        window,
        cache.descriptor().base().width,
    );
    log::debug!(
        "peak at row {} col {}: dip {:.2} deg, azimuth {:.1} deg",
        peak_cell.row,
        peak_cell.col,
        estimate.dip_degrees,
        estimate.azimuth_degrees,
    );

    let accumulator = std::mem::replace(&mut workspace.accumulator, FloatImage::new(0, 0));
    let diagnostics = TransformDiagnostics {
        sample,
        inpaint,
        pre_smooth,
        weigh,
        accumulate,
        post_smooth,
        peak,
        total_duration: clock.elapsed(&total_start),
        summary: TransformSummary {
            strip_width: window.strip_width,
            strip_height: window.height,
            center_depth: estimate.center_depth,
            dip_degrees: estimate.dip_degrees,
            azimuth_degrees: estimate.azimuth_degrees,
        },
    };
    let result = TransformResult {
        accumulator,
        peak: peak_cell,
        estimate,
        grid,
    };
    Ok((result, diagnostics))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::panic)]
mod tests {
    use super::*;
    use crate::diagnostics::NullClock;
    use crate::dump::CollectingSink;
    use crate::pyramid::{MemoryPyramid, PyramidError, SampleFormat, TileShape};

    /// 64×200 image, dark except one bright row at depth 100.
    fn layered_cache() -> TiledPyramidCache<MemoryPyramid> {
        let base = FloatImage::from_fn(64, 200, |_, y| {
            image::Luma([if y == 100 { 100.0 } else { 0.0 }])
        });
        let pyramid =
            MemoryPyramid::from_base(base, 2, SampleFormat::GRAY16, TileShape::new(32, 32))
                .unwrap();
        TiledPyramidCache::new(pyramid, 4).unwrap()
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            aradius: 10.0,
            tside: 16,
            post_smooth: Smoothing::NONE,
            ..PipelineConfig::default()
        }
    }

    fn run_at(
        depth: f64,
        config: &PipelineConfig,
        sink: Option<&mut dyn DebugSink>,
    ) -> Result<(TransformResult, TransformDiagnostics), PipelineError> {
        let mut cache = layered_cache();
        let mut workspace = Workspace::default();
        run(
            &mut cache,
            &ViewportState::at_depth(depth),
            WindowSize::new(64, 40),
            config,
            &mut workspace,
            sink,
            &NullClock,
        )
    }

    #[test]
    fn horizontal_layer_gives_zero_dip() {
        let (result, diagnostics) = run_at(80.0, &small_config(), None).unwrap();
        assert_eq!(result.peak.row, 0);
        assert_eq!(result.estimate.dip_degrees, 0.0);
        assert_eq!(result.estimate.center_depth, 100.0);
        assert_eq!(result.accumulator.dimensions(), (16, 16));
        assert_eq!(diagnostics.summary.center_depth, 100.0);
        assert_eq!(diagnostics.summary.strip_width, 64);
    }

    #[test]
    fn dumps_every_stage_in_order() {
        let mut sink = CollectingSink::default();
        run_at(80.0, &small_config(), Some(&mut sink)).unwrap();
        let stages: Vec<_> = sink.dumps.iter().map(|(stage, _)| *stage).collect();
        assert_eq!(stages, DumpStage::ALL);
        assert_eq!(sink.get(DumpStage::Strip).unwrap().width, 64);
        assert_eq!(sink.get(DumpStage::Accumulator).unwrap().width, 16);
    }

    #[test]
    fn cells_below_the_image_are_filled_and_masked() {
        let mut sink = CollectingSink::default();
        let (_, diagnostics) = run_at(180.0, &small_config(), Some(&mut sink)).unwrap();

        // Display rows 20..40 map to image rows 200..220.
        let expected = 20 * 64;
        match diagnostics.sample.metrics {
            StageMetrics::Sample {
                out_of_range,
                saturated,
                ..
            } => assert_eq!((out_of_range, saturated), (expected, 0)),
            ref other => panic!("unexpected metrics {other:?}"),
        }
        match diagnostics.inpaint.metrics {
            StageMetrics::Inpaint { holes, .. } => assert_eq!(holes, expected),
            ref other => panic!("unexpected metrics {other:?}"),
        }
        match diagnostics.weigh.metrics {
            StageMetrics::Weigh { masked, .. } => assert_eq!(masked, expected),
            ref other => panic!("unexpected metrics {other:?}"),
        }

        let raw = sink.get(DumpStage::Strip).unwrap();
        assert!(raw.samples[expected..].iter().all(|v| v.is_nan()));
        let filled = sink.get(DumpStage::Inpainted).unwrap();
        assert!(filled.samples.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn unmasked_votes_are_counted_as_zero_masked() {
        let config = PipelineConfig {
            mask_invalid_votes: false,
            ..small_config()
        };
        let (_, diagnostics) = run_at(180.0, &config, None).unwrap();
        match diagnostics.weigh.metrics {
            StageMetrics::Weigh { masked, .. } => assert_eq!(masked, 0),
            ref other => panic!("unexpected metrics {other:?}"),
        }
    }

    #[test]
    fn invalid_config_is_rejected_before_sampling() {
        let config = PipelineConfig {
            tside: 0,
            ..small_config()
        };
        assert!(matches!(
            run_at(80.0, &config, None),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn octave_beyond_pyramid_is_an_error() {
        let mut cache = layered_cache();
        let viewport = ViewportState {
            zoom_level: 5,
            ..ViewportState::IDENTITY
        };
        let err = run(
            &mut cache,
            &viewport,
            WindowSize::new(64, 40),
            &small_config(),
            &mut Workspace::default(),
            None,
            &NullClock,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Pyramid(PyramidError::OctaveOutOfRange { octave: 5, .. })
        ));
    }

    #[test]
    fn accumulator_moves_into_result_and_back() {
        let mut cache = layered_cache();
        let mut workspace = Workspace::default();
        let viewport = ViewportState::at_depth(80.0);
        let window = WindowSize::new(64, 40);
        let config = small_config();
        let (first, _) = run(
            &mut cache, &viewport, window, &config, &mut workspace, None, &NullClock,
        )
        .unwrap();
        let first_peak = first.peak;
        workspace.recycle(first);
        let (second, _) = run(
            &mut cache, &viewport, window, &config, &mut workspace, None, &NullClock,
        )
        .unwrap();
        assert_eq!(second.peak, first_peak);
    }
}
