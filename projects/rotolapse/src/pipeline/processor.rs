use crate::pipeline::naming::OutputNaming;
use crate::pipeline::rate::RateReconciler;
use crate::pipeline::rotation::RotationMapper;
use crate::video::{
    self, BackendKind, CaptureOpener, DisplayWindow, FourCC, Frame, FrameSink, FrameSource,
    RecordingTarget, WindowFactory, WindowRegistry, WriterFactory,
};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where the preview window is placed on screen.
const WINDOW_POSITION: (i32, i32) = (20, 20);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessingStats {
    /// Source frames pulled (cheap reads included).
    pub pulled: u64,
    /// Frames decoded and handed to the processor.
    pub emitted: u64,
    pub interrupted: bool,
    pub duration: Duration,
}

/// A trait for handling emitted frames. This separates the "what to do with a
/// frame" from the "which frames to decode" logic.
pub trait FrameProcessor {
    fn process(&mut self, frame: Frame) -> Result<()>;
}

/// Blanket implementation so any closure with the right signature
/// automatically implements FrameProcessor.
impl<F> FrameProcessor for F
where
    F: FnMut(Frame) -> Result<()>,
{
    fn process(&mut self, frame: Frame) -> Result<()> {
        self(frame)
    }
}

/// Pull every frame with the cheap read, let the reconciler pick which ones to
/// decode and pass those on. Stops at end of stream or once `interrupt` is set.
pub fn drive<P>(
    source: &mut FrameSource,
    reconciler: &mut RateReconciler,
    processor: &mut P,
    interrupt: &AtomicBool,
    progress: &ProgressBar,
) -> Result<ProcessingStats>
where
    P: FrameProcessor + ?Sized,
{
    let start_time = Instant::now();
    let mut pulled = 0;
    let mut emitted = 0;
    let mut interrupted = false;

    loop {
        if interrupt.load(Ordering::Relaxed) {
            interrupted = true;
            break;
        }
        if !source.peek_undecoded()? {
            break;
        }
        pulled += 1;
        progress.inc(1);

        if !reconciler.tick() {
            continue;
        }
        let Some(frame) = source.decode_buffered()? else {
            break;
        };
        processor.process(frame)?;
        emitted += 1;
    }

    Ok(ProcessingStats {
        pulled,
        emitted,
        interrupted,
        duration: start_time.elapsed(),
    })
}

/// Everything a single source run needs besides the source itself.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Counter-clockwise quarter turns.
    pub quadrants: i32,
    pub multiplier: f64,
    pub scale: f64,
    /// Output rate ceiling; defaults to the source's own rate.
    pub max_fps: Option<f64>,
    pub codec: FourCC,
    pub extension: String,
    pub quality: Option<f64>,
    pub output_dir: Option<PathBuf>,
    pub display: bool,
    pub show_progress: bool,
}

impl JobSettings {
    pub fn rotation_degrees(&self) -> u32 {
        self.quadrants.rem_euclid(4) as u32 * 90
    }

    pub fn naming(&self) -> OutputNaming {
        OutputNaming {
            rotation_degrees: self.rotation_degrees(),
            multiplier: self.multiplier,
            scale: self.scale,
            extension: self.extension.clone(),
        }
    }
}

/// Driver handles used to open sources, writers and preview windows.
pub struct Backends {
    pub opener: Box<dyn CaptureOpener>,
    pub writers: Arc<dyn WriterFactory>,
    /// `None` runs headless regardless of [`JobSettings::display`].
    pub windows: Option<Box<dyn WindowFactory>>,
}

impl Backends {
    pub fn native(kind: BackendKind, display: bool) -> Result<Self> {
        let opener = video::capture_opener(kind)
            .with_context(|| format!("Capture backend '{}' is not available", kind))?;
        let writers = video::writer_factory().context("No video writer available")?;
        let windows = if display {
            match video::window_factory() {
                Ok(factory) => Some(factory),
                Err(e) => {
                    tracing::warn!("Display disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };
        Ok(Self {
            opener,
            writers,
            windows,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceOutcome {
    pub output: PathBuf,
    pub recording_fps: f64,
    pub frames_written: u64,
    pub stats: ProcessingStats,
}

/// Time-lapse one source into its output file.
///
/// Source, sink and window are released on every exit path, including errors
/// and interrupts.
pub fn process_source(
    descriptor: &str,
    job: &JobSettings,
    backends: &Backends,
    registry: &mut WindowRegistry,
    interrupt: &AtomicBool,
) -> Result<SourceOutcome> {
    let mut source = FrameSource::open(descriptor, backends.opener.as_ref())
        .with_context(|| format!("Failed to open source {}", descriptor))?;
    let metadata = *source.metadata();

    let ceiling = job.max_fps.unwrap_or(metadata.fps);
    let mut reconciler = RateReconciler::new(metadata.fps, job.multiplier, ceiling)
        .with_context(|| format!("Cannot time-lapse {}", source.descriptor()))?;

    let output = job.naming().output_path(source.descriptor(), job.output_dir.as_deref());
    let mut target = RecordingTarget::new(&output)
        .fps(reconciler.recording_fps())
        .codec(job.codec);
    if let Some(quality) = job.quality {
        target = target.quality(quality);
    }
    let mut sink = FrameSink::open(target, backends.writers.clone())
        .with_context(|| format!("Failed to open recording {}", output.display()))?;

    let mut window = match &backends.windows {
        Some(factory) if job.display => {
            let mut window = DisplayWindow::open(factory.as_ref(), registry, None)?;
            window.move_to(WINDOW_POSITION.0, WINDOW_POSITION.1)?;
            window
        }
        _ => DisplayWindow::disabled(),
    };

    tracing::info!(
        "Processing {} ({}), recording at {:.2} fps (factor {:.4})",
        source.descriptor().display_name(),
        metadata,
        reconciler.recording_fps(),
        reconciler.effective_factor()
    );
    sink.report_start();

    let progress = progress_bar(metadata.total_frames, job.show_progress)?;
    let mut mapper = RotationMapper::new(job.quadrants);
    let needs_resizing = job.naming().needs_resizing();

    let result = drive(
        &mut source,
        &mut reconciler,
        &mut |frame: Frame| -> Result<()> {
            let rotated = mapper.rotate(&frame)?;
            let frame = if needs_resizing {
                rotated.scale(job.scale)?
            } else {
                rotated
            };
            sink.write(&frame, true)?;
            window.show(&frame)?;
            Ok(())
        },
        interrupt,
        &progress,
    );

    source.close();
    sink.close();
    window.close();

    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            progress.abandon();
            return Err(e.context(format!("Failed while processing {}", descriptor)));
        }
    };
    if stats.interrupted {
        progress.abandon_with_message("Interrupted");
    } else {
        progress.finish_with_message("Done");
    }
    sink.report_end();

    Ok(SourceOutcome {
        output,
        recording_fps: reconciler.recording_fps(),
        frames_written: sink.frames_written(),
        stats,
    })
}

fn progress_bar(total_frames: Option<u64>, visible: bool) -> Result<ProgressBar> {
    if !visible {
        return Ok(ProgressBar::hidden());
    }
    let pb = match total_frames {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1.yellow} fps, {eta})")?
                    .progress_chars("#>-"),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {pos} frames ({per_sec:.1.yellow} fps)")?,
            );
            pb
        }
    };
    Ok(pb)
}
