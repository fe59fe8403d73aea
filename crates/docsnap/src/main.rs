//! docsnap: watch a frame source and save a still once a document is in
//! focus, properly framed, and held steady.
//!
//! Frames come from a directory of recorded images (played back in
//! file-name order) or a single image file repeated every tick. Useful for:
//!
//! - Tuning focus, area, and aspect thresholds against recorded footage
//! - Comparing the `loose` and `strict` presets
//! - Inspecting per-tick diagnostics (`--diagnostics`, `--json`)
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin docsnap -- [OPTIONS] <INPUT>
//! ```
//!
//! Logging goes to stderr and honours `RUST_LOG` (default `info`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use docsnap_io::{
    DirectoryCapture, FrameSource, ImageSequenceSource, Scheduler, Session, SessionConfig,
    SessionOutcome, StillCapture, StillFormat, StillImageSource, TracingFeedback,
};
use docsnap_pipeline::{DetectionConfig, VisionConfig};
use tracing_subscriber::EnvFilter;

/// Automatic document capture from a frame source.
///
/// Runs the detection pipeline once per tick and writes an annotated still
/// as soon as the same document has been seen, sharp and well framed, on
/// enough consecutive ticks.
#[derive(Parser)]
#[command(name = "docsnap", version)]
struct Cli {
    /// A directory of frames (PNG, JPEG, BMP, WebP) or a single image.
    input: PathBuf,

    /// Start over from the first frame when a directory runs out.
    #[arg(long = "loop")]
    looped: bool,

    /// Threshold preset the individual flags are applied on top of.
    #[arg(long, value_enum, default_value_t = Preset::Loose)]
    preset: Preset,

    /// Minimum Laplacian variance for a frame to count as in focus.
    #[arg(long)]
    min_focus: Option<f64>,

    /// Smallest accepted document area as a fraction of the container.
    #[arg(long)]
    min_area: Option<f64>,

    /// Largest accepted document area as a fraction of the container.
    #[arg(long)]
    max_area: Option<f64>,

    /// Smallest accepted width / height.
    #[arg(long)]
    min_aspect: Option<f64>,

    /// Largest accepted width / height.
    #[arg(long)]
    max_aspect: Option<f64>,

    /// Container width in logical units.
    #[arg(long, default_value_t = DetectionConfig::DEFAULT_CONTAINER_WIDTH)]
    container_width: f64,

    /// Container height in logical units.
    #[arg(long, default_value_t = DetectionConfig::DEFAULT_CONTAINER_HEIGHT)]
    container_height: f64,

    /// Largest position change (container units) still counted as steady.
    #[arg(long, default_value_t = DetectionConfig::DEFAULT_POSITION_THRESHOLD)]
    position_threshold: f64,

    /// Largest size change (container units) still counted as steady.
    #[arg(long, default_value_t = DetectionConfig::DEFAULT_SIZE_THRESHOLD)]
    size_threshold: f64,

    /// Consecutive steady detections required before capturing.
    #[arg(long, default_value_t = DetectionConfig::DEFAULT_STABILITY_THRESHOLD, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    stability_threshold: u32,

    /// Gaussian blur sigma applied before edge detection.
    #[arg(long, default_value_t = VisionConfig::DEFAULT_BLUR_SIGMA)]
    blur_sigma: f32,

    /// Canny low threshold.
    #[arg(long, default_value_t = VisionConfig::DEFAULT_CANNY_LOW)]
    canny_low: f32,

    /// Canny high threshold.
    #[arg(long, default_value_t = VisionConfig::DEFAULT_CANNY_HIGH)]
    canny_high: f32,

    /// Morphological closing radius in pixels (0 disables closing).
    #[arg(long, default_value_t = VisionConfig::DEFAULT_CLOSE_RADIUS)]
    close_radius: u8,

    /// Polygon approximation tolerance as a fraction of contour length.
    #[arg(long, default_value_t = VisionConfig::DEFAULT_APPROX_EPSILON_FACTOR)]
    epsilon_factor: f64,

    /// Full session config as a JSON string.
    ///
    /// When provided, the preset and all threshold and vision flags are
    /// ignored. Missing fields take their defaults.
    #[arg(long, conflicts_with = "config")]
    config_json: Option<String>,

    /// Full session config as a JSON file. Same rules as `--config-json`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Milliseconds between ticks (0 runs as fast as possible).
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,

    /// Give up after this many ticks.
    #[arg(long, default_value_t = Scheduler::DEFAULT_MAX_TICKS)]
    max_ticks: u64,

    /// Directory the captured still is written to.
    #[arg(long, default_value = "captures")]
    output_dir: PathBuf,

    /// Still image format.
    #[arg(long, value_enum, default_value_t = Format::Png)]
    format: Format,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = StillFormat::DEFAULT_JPEG_QUALITY, value_parser = clap::builder::RangedU64ValueParser::<u8>::new().range(1..=100))]
    jpeg_quality: u8,

    /// Print the per-stage diagnostics table after every tick.
    #[arg(long)]
    diagnostics: bool,

    /// Print one JSON object per tick, then the outcome, on stdout.
    #[arg(long)]
    json: bool,
}

/// Threshold preset selection.
#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    /// Focus >= 120, area 0.3-0.9, aspect 1.0-4.0.
    Loose,
    /// Focus >= 180, area 0.6-0.9, aspect 1.4-1.7 (ID cards).
    Strict,
}

/// Still format selection.
#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// Lossless PNG.
    Png,
    /// JPEG at `--jpeg-quality`.
    Jpeg,
}

/// Build a [`SessionConfig`] from CLI arguments.
///
/// `--config-json` or `--config` replaces everything; otherwise the preset
/// is loaded and the individual flags applied on top.
fn config_from_cli(cli: &Cli) -> Result<SessionConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }
    if let Some(ref path) = cli.config {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        return serde_json::from_str(&text)
            .map_err(|e| format!("Error parsing {}: {e}", path.display()));
    }

    let preset = match cli.preset {
        Preset::Loose => DetectionConfig::loose(),
        Preset::Strict => DetectionConfig::strict(),
    };
    let detection = DetectionConfig {
        min_focus_threshold: cli.min_focus.unwrap_or(preset.min_focus_threshold),
        min_area_fraction: cli.min_area.unwrap_or(preset.min_area_fraction),
        max_area_fraction: cli.max_area.unwrap_or(preset.max_area_fraction),
        min_aspect_ratio: cli.min_aspect.unwrap_or(preset.min_aspect_ratio),
        max_aspect_ratio: cli.max_aspect.unwrap_or(preset.max_aspect_ratio),
        container_width: cli.container_width,
        container_height: cli.container_height,
        position_threshold: cli.position_threshold,
        size_threshold: cli.size_threshold,
        stability_threshold: cli.stability_threshold,
    };
    let vision = VisionConfig {
        blur_sigma: cli.blur_sigma,
        canny_low: cli.canny_low,
        canny_high: cli.canny_high,
        close_radius: cli.close_radius,
        approx_epsilon_factor: cli.epsilon_factor,
    };
    Ok(SessionConfig { detection, vision })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    if cli.input.is_dir() {
        let source = ImageSequenceSource::new(&cli.input).looped(cli.looped);
        run(&cli, source, config)
    } else {
        run(&cli, StillImageSource::from_path(&cli.input), config)
    }
}

/// Start a session on `source` and run it to completion.
fn run<S: FrameSource>(cli: &Cli, source: S, config: SessionConfig) -> ExitCode {
    eprintln!("Input: {}", cli.input.display());
    eprintln!("Config: {config:#?}");
    eprintln!();

    let mut feedback = TracingFeedback;
    let mut session = match Session::start(source, config, &mut feedback) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error starting session: {e}");
            return ExitCode::FAILURE;
        }
    };

    let scheduler = Scheduler::new(Duration::from_millis(cli.interval_ms))
        .with_max_ticks(Some(cli.max_ticks));
    let format = match cli.format {
        Format::Png => StillFormat::Png,
        Format::Jpeg => StillFormat::Jpeg {
            quality: cli.jpeg_quality,
        },
    };
    let mut sink = DirectoryCapture::new(&cli.output_dir, StillCapture::new(format));

    let result = session.run(&scheduler, &mut sink, &mut feedback, |tick, report| {
        if cli.diagnostics {
            eprintln!("--- Tick {tick} ---");
            eprintln!("{}", report.diagnostics.report());
        }
        if cli.json {
            println!("{}", serde_json::json!({ "tick": tick, "report": report }));
        }
    });

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Session error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        println!("{}", outcome_json(&outcome));
    }

    match outcome {
        SessionOutcome::Captured { tick, rect, still } => {
            let path = still
                .path
                .as_deref()
                .map_or_else(|| "<memory>".to_owned(), |p| p.display().to_string());
            eprintln!(
                "Captured on tick {tick}: document at ({:.0}, {:.0}) {:.0}x{:.0}, written to {path} ({} bytes)",
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                still.bytes.len(),
            );
            ExitCode::SUCCESS
        }
        SessionOutcome::TickLimitReached { ticks } => {
            eprintln!("No document captured after {ticks} ticks");
            ExitCode::from(2)
        }
        SessionOutcome::SourceExhausted { ticks } => {
            eprintln!("Frames ran out after {ticks} ticks without a capture");
            ExitCode::from(2)
        }
    }
}

/// The final outcome as a JSON object (the still's bytes are left out).
fn outcome_json(outcome: &SessionOutcome) -> serde_json::Value {
    match outcome {
        SessionOutcome::Captured { tick, rect, still } => serde_json::json!({
            "outcome": "captured",
            "tick": tick,
            "rect": rect,
            "path": still.path,
            "mime_type": still.format.mime_type(),
            "bytes": still.bytes.len(),
        }),
        SessionOutcome::TickLimitReached { ticks } => serde_json::json!({
            "outcome": "tick_limit_reached",
            "ticks": ticks,
        }),
        SessionOutcome::SourceExhausted { ticks } => serde_json::json!({
            "outcome": "source_exhausted",
            "ticks": ticks,
        }),
    }
}
