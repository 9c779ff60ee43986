//! Transform diagnostics: timing, counts, and other metrics per stage.
//!
//! These are permanent instrumentation for tuning transform parameters.
//! [`process_with_diagnostics`] runs the same stages as
//! [`process`](crate::process) and records a [`StageDiagnostics`] for
//! each one.
//!
//! Time is read through the [`Clock`] trait so the sans-IO core never
//! touches a platform timer itself; callers supply one (the bench CLI
//! uses `std::time::Instant`).
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::blur::KernelFamily;
use crate::cache::{CacheStats, TiledPyramidCache};
use crate::dump::DebugSink;
use crate::pyramid::TileSource;
use crate::transform::VoteWeighting;
use crate::types::{PipelineConfig, PipelineError, WindowSize};
use crate::viewport::ViewportState;
use crate::workspace::Workspace;
use crate::TransformResult;

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// Current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// A clock that never advances; every duration is zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullClock;

impl Clock for NullClock {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, _: &()) -> Duration {
        Duration::ZERO
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformDiagnostics {
    /// Stage 1: strip sampling through the tile cache.
    pub sample: StageDiagnostics,
    /// Stage 2: gap filling.
    pub inpaint: StageDiagnostics,
    /// Stage 3: strip smoothing.
    pub pre_smooth: StageDiagnostics,
    /// Stage 4: vote weighting.
    pub weigh: StageDiagnostics,
    /// Stage 5: Hough accumulation.
    pub accumulate: StageDiagnostics,
    /// Stage 6: accumulator smoothing.
    pub post_smooth: StageDiagnostics,
    /// Stage 7: peak extraction.
    pub peak: StageDiagnostics,
    /// Total wall-clock duration of the transform (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary of the request and its outcome.
    pub summary: TransformSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Strip sampling.
    Sample {
        /// Pyramid octave sampled.
        octave: u32,
        /// Cells whose depth fell outside the image.
        out_of_range: usize,
        /// Cells above the saturation threshold.
        saturated: usize,
        /// Tile cache activity during sampling.
        cache: CacheStats,
    },
    /// Gap filling.
    Inpaint {
        /// Cells that needed filling.
        holes: usize,
        /// Grid levels visited.
        levels: u32,
    },
    /// Separable smoothing.
    Smooth {
        /// Kernel family.
        family: KernelFamily,
        /// Horizontal sigma.
        sigma_x: f32,
        /// Vertical sigma.
        sigma_y: f32,
    },
    /// Vote weighting.
    Weigh {
        /// Weighting function.
        weighting: VoteWeighting,
        /// Cells forced to zero weight because they were invalid.
        masked: usize,
        /// Sum of all weights.
        total_weight: f64,
    },
    /// Hough accumulation.
    Accumulate {
        /// Accumulator side.
        tside: u32,
        /// Largest amplitude.
        aradius: f64,
        /// Highest vote before post-smoothing.
        max_vote: f32,
    },
    /// Peak extraction.
    Peak {
        /// Amplitude bin.
        row: u32,
        /// Phase bin.
        col: u32,
        /// Vote at the peak.
        value: f32,
    },
}

/// High-level summary of one transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformSummary {
    /// Strip width in display pixels.
    pub strip_width: u32,
    /// Strip height in display pixels.
    pub strip_height: u32,
    /// Image row at the strip's vertical centre.
    pub center_depth: f64,
    /// Estimated dip in degrees.
    pub dip_degrees: f64,
    /// Estimated dip azimuth in degrees.
    pub azimuth_degrees: f64,
}

impl TransformDiagnostics {
    /// Stages in pipeline order with display names.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 7] {
        [
            ("Sample", &self.sample),
            ("Inpaint", &self.inpaint),
            ("Pre-smooth", &self.pre_smooth),
            ("Weigh", &self.weigh),
            ("Accumulate", &self.accumulate),
            ("Post-smooth", &self.post_smooth),
            ("Peak", &self.peak),
        ]
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Transform Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Strip: {}x{} centred at depth {:.1}",
            self.summary.strip_width, self.summary.strip_height, self.summary.center_depth,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Dip: {:.2} deg  |  Azimuth: {:.1} deg",
            self.summary.dip_degrees, self.summary.azimuth_degrees,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Sample {
            octave,
            out_of_range,
            saturated,
            cache,
        } => format!(
            "octave={octave} out_of_range={out_of_range} saturated={saturated} tiles: {} hit, {} miss, {} evicted",
            cache.hits, cache.misses, cache.evictions,
        ),
        StageMetrics::Inpaint { holes, levels } => format!("{holes} holes over {levels} levels"),
        StageMetrics::Smooth {
            family,
            sigma_x,
            sigma_y,
        } => format!("{family} sigma=({sigma_x:.2}, {sigma_y:.2})"),
        StageMetrics::Weigh {
            weighting,
            masked,
            total_weight,
        } => format!("{weighting} masked={masked} total={total_weight:.3}"),
        StageMetrics::Accumulate {
            tside,
            aradius,
            max_vote,
        } => format!("{tside}x{tside} aradius={aradius:.1} max={max_vote:.3}"),
        StageMetrics::Peak { row, col, value } => format!("row={row} col={col} value={value:.3}"),
    }
}

/// Run the transform and record per-stage diagnostics.
///
/// Produces the same [`TransformResult`] as [`process`](crate::process).
///
/// # Errors
///
/// Same as [`process`](crate::process).
pub fn process_with_diagnostics<S: TileSource, C: Clock>(
    cache: &mut TiledPyramidCache<S>,
    viewport: &ViewportState,
    window: WindowSize,
    config: &PipelineConfig,
    workspace: &mut Workspace,
    sink: Option<&mut dyn DebugSink>,
    clock: &C,
) -> Result<(TransformResult, TransformDiagnostics), PipelineError> {
    crate::pipeline::run(cache, viewport, window, config, workspace, sink, clock)
}
