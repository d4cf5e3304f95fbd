use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use posetrack::output::{read_json, write_json_atomic, RunResult};
use posetrack::{Config, PoseTracker, RawPoseDocument};

#[derive(Parser)]
#[command(
    name = "posetrack",
    about = "Track continuity for per-frame pose detections",
    version
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a raw detection dump (pose_raw.json) through the tracker
    Replay {
        /// Path to the raw detection dump
        input: PathBuf,

        /// Output path for the tracked document
        #[arg(short, long, default_value = "pose.json")]
        output: PathBuf,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory that receives result.json
        #[arg(long)]
        outdir: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Command::Replay {
            input,
            output,
            config,
            outdir,
        } => match replay(&input, &output, config.as_deref(), outdir.as_deref()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("{err:#}");
                if let Some(dir) = outdir.as_deref() {
                    let result = RunResult::error(
                        "TRACKING_FAILED",
                        format!("{err:#}"),
                        "check the input dump and config",
                    );
                    if let Err(write_err) = write_json_atomic(dir.join("result.json"), &result) {
                        error!("failed to write result.json: {write_err}");
                    }
                }
                ExitCode::from(2)
            }
        },
    }
}

fn replay(
    input: &Path,
    output: &Path,
    config: Option<&Path>,
    outdir: Option<&Path>,
) -> anyhow::Result<()> {
    let started = Instant::now();
    let config = match config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    let raw: RawPoseDocument =
        read_json(input).with_context(|| format!("reading {}", input.display()))?;
    info!(
        frames = raw.frames.len(),
        width = raw.video.width,
        height = raw.video.height,
        detections_per_frame = raw.raw_detections_per_frame_avg(),
        "replaying detections"
    );

    let document = PoseTracker::replay(&raw, config);
    write_json_atomic(output, &document)
        .with_context(|| format!("writing {}", output.display()))?;
    info!(
        primary = ?document.primary_track_ids,
        tracks = document.tracking_metrics.summary.num_tracks_total,
        frames_with_detections = document.frames_with_detections(),
        output = %output.display(),
        "tracking complete"
    );

    if let Some(dir) = outdir {
        let result = RunResult {
            status: document.status(),
            pose_path: Some(output.display().to_string()),
            frames_with_detections: Some(document.frames_with_detections()),
            duration_ms: Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)),
            error: None,
        };
        write_json_atomic(dir.join("result.json"), &result).context("writing result.json")?;
    }
    Ok(())
}
