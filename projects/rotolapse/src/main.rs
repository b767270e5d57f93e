mod cli;

use anyhow::{anyhow, Result};
use cli::Args;
use rotolapse::pipeline::{expand_inputs, run_batch, Backends, BatchReport, JobSettings};
use rotolapse::settings::{RecordingSettings, SelectionHistory, SettingsStore};
use rotolapse::video::MediaDescriptor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse_args();
    let store = SettingsStore::new(&args.settings_dir);

    // Recording format: CLI over stored defaults, stored again only if it changed
    let stored = store.load_recording_settings()?;
    let recording = RecordingSettings::sanitized(
        args.extension.as_deref().unwrap_or(&stored.recording_ext),
        args.codec.as_deref().unwrap_or(&stored.codec),
    )?;
    if let Err(e) = store.save_recording_settings(&recording, &stored) {
        tracing::warn!("Could not save recording settings: {:#}", e);
    }

    let history = store.load_selection_history()?;
    let job = JobSettings {
        quadrants: args.rotations.unwrap_or(history.ccw_rotations),
        multiplier: args.timelapse.unwrap_or(history.timelapse_factor),
        scale: args.scale.unwrap_or(history.scaling_factor),
        max_fps: args.max_fps,
        codec: recording.fourcc()?,
        extension: recording.recording_ext.clone(),
        quality: args.quality,
        output_dir: args.output_dir.clone(),
        display: !args.no_display,
        show_progress: true,
    };
    if !(job.multiplier.is_finite() && job.multiplier > 0.0) {
        return Err(anyhow!("Time-lapse factor must be positive, got {}", job.multiplier));
    }
    if !(job.scale.is_finite() && job.scale > 0.0) {
        return Err(anyhow!("Scaling factor must be positive, got {}", job.scale));
    }

    let inputs = if args.inputs.is_empty() {
        let folder = history.expanded_search_path();
        tracing::info!("No inputs given, using videos in {}", folder.display());
        vec![folder.to_string_lossy().into_owned()]
    } else {
        args.inputs.clone()
    };
    let descriptors = expand_inputs(&inputs)?;
    tracing::info!(
        "Selected videos:\n{}",
        descriptors
            .iter()
            .map(|d| format!("  {}", MediaDescriptor::classify(d.as_str()).display_name()))
            .collect::<Vec<_>>()
            .join("\n")
    );

    let search_path = descriptors
        .iter()
        .find_map(|d| MediaDescriptor::classify(d.as_str()).parent_dir())
        .map(|dir| absolute(&dir))
        .unwrap_or_else(|| history.search_path.clone());
    let updated = SelectionHistory {
        search_path,
        ccw_rotations: job.quadrants,
        timelapse_factor: job.multiplier,
        scaling_factor: job.scale,
    };
    if let Err(e) = store.save_selection_history(&updated) {
        tracing::warn!("Could not save selection history: {:#}", e);
    }

    let backends = Backends::native(args.backend, job.display)?;

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current frame");
                interrupt.store(true, Ordering::Relaxed);
            }
        });
    }

    // The pipeline itself is synchronous; keep it off the async workers
    let report =
        tokio::task::block_in_place(|| run_batch(&descriptors, &job, &backends, &interrupt));

    print_summary(&report, &job);
    report.ensure_completed()
}

fn absolute(dir: &Path) -> String {
    dir.canonicalize()
        .unwrap_or_else(|_| dir.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

fn print_summary(report: &BatchReport, job: &JobSettings) {
    for source in &report.sources {
        match &source.outcome {
            Ok(outcome) => println!(
                "  {} -> {} ({} frames)",
                source.descriptor,
                outcome.output.display(),
                outcome.frames_written
            ),
            Err(reason) => println!("  {} failed: {}", source.descriptor, reason),
        }
    }
    println!();
    println!("{}", if report.interrupted { "Interrupted!" } else { "All done!" });
    println!("Total processing time (sec): {:.3}", report.duration.as_secs_f64());
    println!("             Rotation (deg): {}", job.rotation_degrees());
    println!("           Timelapse factor: {}", job.multiplier);
    println!("             Scaling factor: {:.3}", job.scale);
    if report.failed() > 0 {
        println!("            Failed sources: {}", report.failed());
    }
}
