//! dippick-bench: CLI tool for dip transform experimentation and diagnostics.
//!
//! Loads a pyramid, positions a strip window on it, runs the dip
//! transform and prints per-stage diagnostics. Useful for:
//!
//! - Comparing smoothing kernels and vote weightings
//! - Tuning the accumulator size and amplitude range
//! - Measuring per-stage durations and tile cache behaviour
//! - Inspecting intermediate rasters via JSON dumps
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin dippick-bench -- [OPTIONS] <PYRAMID>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use dippick_io::FileDumpSink;
use dippick_pipeline::diagnostics::{Clock, StageDiagnostics, TransformDiagnostics};
use dippick_pipeline::{
    Command, DebugSink, InpaintParams, KernelFamily, PipelineConfig, Session, Smoothing,
    TileShape, TiledPyramidCache, VoteWeighting, WindowSize,
};

/// Dip transform experimentation and diagnostics for dippick.
///
/// Runs the transform on one window of a borehole image pyramid and
/// prints per-stage timing and count diagnostics.
#[derive(Parser)]
#[command(name = "dippick-bench", version)]
struct Cli {
    /// Octave-0 raster (PNG, TIFF), or a per-octave file pattern
    /// containing `%d` or `{}`.
    pyramid: String,

    /// Required octave-0 width (azimuth samples per revolution).
    #[arg(long, default_value_t = WindowSize::STRIP_WIDTH)]
    strip_width: u32,

    /// Strip window height in display pixels.
    #[arg(long, default_value_t = WindowSize::DEFAULT_HEIGHT, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    height: u32,

    /// Number of octaves to build from a single file (default: until the
    /// image fits the default window height).
    #[arg(long)]
    octaves: Option<u32>,

    /// Square tile side in pixels.
    #[arg(long, default_value_t = 256, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    tile_size: u32,

    /// Tile cache budget in MiB.
    #[arg(long, default_value_t = TiledPyramidCache::<dippick_pipeline::MemoryPyramid>::DEFAULT_MEGABYTES)]
    cache_mb: usize,

    /// Image row at the top of the window.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    at_depth: f64,

    /// Zoom level (pyramid octave; negative magnifies octave 0).
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    zoom_level: i32,

    /// Viewer commands applied before the transform, as a JSON array.
    #[arg(long)]
    commands: Option<String>,

    /// Accumulator side length.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_TSIDE, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    tside: u32,

    /// Largest sinusoid amplitude in strip pixels.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_ARADIUS)]
    aradius: f64,

    /// Strip smoothing kernel (gaussian, cauchy, laplace).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_PRE_SMOOTH_FAMILY)]
    pre_kernel: KernelFamily,

    /// Strip smoothing sigma, both axes.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_PRE_SMOOTH_SIGMA)]
    pre_sigma: f32,

    /// Accumulator smoothing kernel (gaussian, cauchy, laplace).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_POST_SMOOTH_FAMILY)]
    post_kernel: KernelFamily,

    /// Accumulator smoothing sigma, both axes.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_POST_SMOOTH_SIGMA)]
    post_sigma: f32,

    /// Vote weighting (depth_curvature, depth_gradient, intensity).
    #[arg(long, default_value_t = VoteWeighting::default())]
    weighting: VoteWeighting,

    /// Let cells that were invalid before inpainting vote.
    #[arg(long)]
    vote_invalid: bool,

    /// Inpainting relaxation timestep, in (0, 0.5).
    #[arg(long, default_value_t = InpaintParams::DEFAULT_TIMESTEP)]
    inpaint_timestep: f32,

    /// Inpainting sweeps per grid level.
    #[arg(long, default_value_t = InpaintParams::DEFAULT_SWEEPS)]
    inpaint_sweeps: u32,

    /// Inpainting grid levels below full resolution.
    #[arg(long, default_value_t = InpaintParams::DEFAULT_MAX_DEPTH)]
    inpaint_max_depth: u32,

    /// Treat the azimuth axis as periodic while inpainting.
    #[arg(long)]
    wrap_azimuth: bool,

    /// Radius of the highlighted peak neighbourhood, in accumulator cells.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_PEAK_RADIUS)]
    peak_radius: f64,

    /// Write the display image (strip + accumulator) as PNG.
    #[arg(long)]
    png: Option<PathBuf>,

    /// Write intermediate rasters as JSON into this directory.
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization; missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Log level specification (overridden by `RUST_LOG`).
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        inpaint: InpaintParams {
            timestep: cli.inpaint_timestep,
            sweeps: cli.inpaint_sweeps,
            max_depth: cli.inpaint_max_depth,
            wrap_azimuth: cli.wrap_azimuth,
            ..InpaintParams::default()
        },
        pre_smooth: Smoothing::isotropic(cli.pre_kernel, cli.pre_sigma),
        aradius: cli.aradius,
        tside: cli.tside,
        weighting: cli.weighting,
        mask_invalid_votes: !cli.vote_invalid,
        post_smooth: Smoothing::isotropic(cli.post_kernel, cli.post_sigma),
        peak_radius: cli.peak_radius,
    })
}

/// Viewer commands that bring a fresh session to the requested window.
fn initial_commands(cli: &Cli) -> Result<Vec<Command>, String> {
    let mut commands = vec![Command::Pan {
        dx: 0.0,
        dy: -cli.at_depth,
    }];
    let step = if cli.zoom_level >= 0 {
        Command::IncreaseOctave { x: 0.0, y: 0.0 }
    } else {
        Command::DecreaseOctave { x: 0.0, y: 0.0 }
    };
    commands.extend(std::iter::repeat_n(step, cli.zoom_level.unsigned_abs() as usize));

    if let Some(ref json) = cli.commands {
        let extra: Vec<Command> =
            serde_json::from_str(json).map_err(|e| format!("Error parsing --commands: {e}"))?;
        commands.extend(extra);
    }
    Ok(commands)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _logger = match flexi_logger::Logger::try_with_env_or_str(&cli.log_level)
        .and_then(|logger| logger.log_to_stderr().start())
    {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error initializing logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    let commands = match initial_commands(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let tile = TileShape::new(cli.tile_size, cli.tile_size);
    let pyramid = match dippick_io::load_pyramid(&cli.pyramid, cli.octaves, tile) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error loading {}: {e}", cli.pyramid);
            return ExitCode::FAILURE;
        }
    };
    let cache = match TiledPyramidCache::new(pyramid, cli.cache_mb) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error creating tile cache: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = cache.descriptor().expect_width(cli.strip_width) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    let window = WindowSize::new(cli.strip_width, cli.height);
    let mut session = match Session::new(cache, window, config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    for command in commands {
        session.push(command);
    }
    if let Err(e) = session.run_pending() {
        eprintln!("Command error: {e}");
        return ExitCode::FAILURE;
    }

    let mut dump_sink = match cli.dump_dir.as_ref().map(FileDumpSink::new).transpose() {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("Error preparing dump directory: {e}");
            return ExitCode::FAILURE;
        }
    };

    let base = session.cache().descriptor().base();
    eprintln!(
        "Pyramid: {} ({}x{}, {} octaves)",
        cli.pyramid,
        base.width,
        base.height,
        session.cache().depth(),
    );
    eprintln!("Viewport: {:?}", session.viewport());
    eprintln!("Config: {:#?}", session.config());
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        // Dump intermediates on the first run only.
        let sink = if run == 0 {
            dump_sink.as_mut().map(|s| s as &mut dyn DebugSink)
        } else {
            None
        };

        match session.compute_with_diagnostics(sink, &StdClock) {
            Ok((_, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }
                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if let Some(ref png_path) = cli.png {
        let written = session
            .render()
            .map_err(|e| e.to_string())
            .and_then(|display| {
                dippick_io::write_display_png(png_path, &display).map_err(|e| e.to_string())
            });
        match written {
            Ok(()) => eprintln!("Display written to {}", png_path.display()),
            Err(e) => eprintln!("Error writing display to {}: {e}", png_path.display()),
        }
    }

    if let Some(ref sink) = dump_sink {
        eprintln!("Dumped {} rasters", sink.written().len());
    }

    // Print summary when multiple runs.
    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[TransformDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let Some(first) = all_diagnostics.first() else {
        println!("Warning: no diagnostics to summarize");
        return;
    };

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-stage means.
    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    for (index, (name, _)) in first.stages().iter().enumerate() {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .map(|d| stage_ms(d.stages()[index].1))
            .collect();
        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }

    println!();
    println!(
        "Estimate: dip {:.2} deg, azimuth {:.1} deg at depth {:.1}",
        first.summary.dip_degrees, first.summary.azimuth_degrees, first.summary.center_depth,
    );
}

fn stage_ms(stage: &StageDiagnostics) -> f64 {
    stage.duration.as_secs_f64() * 1000.0
}
