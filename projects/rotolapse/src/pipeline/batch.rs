// Multi-source runs: input expansion, per-source processing and the final report

use crate::pipeline::processor::{process_source, Backends, JobSettings, SourceOutcome};
use crate::video::descriptor::has_known_extension;
use crate::video::WindowRegistry;
use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

#[derive(Debug)]
pub struct SourceReport {
    pub descriptor: String,
    /// Error chain as text when the source failed.
    pub outcome: std::result::Result<SourceOutcome, String>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub sources: Vec<SourceReport>,
    pub interrupted: bool,
    pub duration: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.sources.iter().filter(|s| s.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.sources.iter().filter(|s| s.outcome.is_err()).count()
    }

    pub fn frames_written(&self) -> u64 {
        self.sources
            .iter()
            .filter_map(|s| s.outcome.as_ref().ok())
            .map(|o| o.frames_written)
            .sum()
    }

    /// Fails when the batch was cut short by an interrupt.
    pub fn ensure_completed(&self) -> Result<()> {
        if self.interrupted {
            return Err(anyhow!(
                "Interrupted after {} source(s), {} frame(s) written",
                self.sources.len(),
                self.frames_written()
            ));
        }
        Ok(())
    }
}

/// Video files directly inside `dir`, sorted by path.
pub fn list_videos(dir: &Path) -> Vec<String> {
    WalkDir::new(dir)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| has_known_extension(e.path()))
        .map(|e| e.path().to_string_lossy().into_owned())
        .collect()
}

/// Replace directory inputs by the videos they contain. Everything else is
/// passed through untouched.
pub fn expand_inputs(inputs: &[String]) -> Result<Vec<String>> {
    let mut expanded = Vec::with_capacity(inputs.len());
    for input in inputs {
        let path = Path::new(input);
        if path.is_dir() {
            let videos = list_videos(path);
            if videos.is_empty() {
                tracing::warn!("No video files found in {}", path.display());
            }
            expanded.extend(videos);
        } else {
            expanded.push(input.clone());
        }
    }
    if expanded.is_empty() {
        return Err(anyhow!("No video sources to process"));
    }
    Ok(expanded)
}

/// Process every source in order. A failing source is reported and skipped;
/// an interrupt ends the batch once the current source has been released.
pub fn run_batch(
    descriptors: &[String],
    job: &JobSettings,
    backends: &Backends,
    interrupt: &AtomicBool,
) -> BatchReport {
    let start_time = Instant::now();
    let mut registry = WindowRegistry::new();
    let mut report = BatchReport::default();
    let total = descriptors.len();

    for (idx, descriptor) in descriptors.iter().enumerate() {
        if interrupt.load(Ordering::Relaxed) {
            report.interrupted = true;
            break;
        }
        tracing::info!("Processing ({}/{}): {}", idx + 1, total, descriptor);

        match process_source(descriptor, job, backends, &mut registry, interrupt) {
            Ok(outcome) => {
                let interrupted = outcome.stats.interrupted;
                tracing::info!(
                    "Finished {}: {} of {} frames recorded to {} in {:.2?}",
                    descriptor,
                    outcome.frames_written,
                    outcome.stats.pulled,
                    outcome.output.display(),
                    outcome.stats.duration
                );
                report.sources.push(SourceReport {
                    descriptor: descriptor.clone(),
                    outcome: Ok(outcome),
                });
                if interrupted {
                    report.interrupted = true;
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Skipping {}: {:#}", descriptor, e);
                report.sources.push(SourceReport {
                    descriptor: descriptor.clone(),
                    outcome: Err(format!("{:#}", e)),
                });
            }
        }
    }

    report.duration = start_time.elapsed();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::memory::{MemoryCapture, MemoryOpener, MemoryWriterFactory};
    use crate::video::{FourCC, FrameGeometry};
    use std::fs;
    use std::sync::Arc;

    const GEOM: FrameGeometry = FrameGeometry::new(4, 4, 3);

    fn job(dir: &Path) -> JobSettings {
        JobSettings {
            quadrants: 0,
            multiplier: 2.0,
            scale: 1.0,
            max_fps: None,
            codec: FourCC::sanitize("MJPG").unwrap(),
            extension: ".avi".to_string(),
            quality: None,
            output_dir: Some(dir.to_path_buf()),
            display: false,
            show_progress: false,
        }
    }

    fn backends(writers: &MemoryWriterFactory) -> Backends {
        let opener = MemoryOpener::new()
            .with_source("first", MemoryCapture::numbered(10, GEOM, 30.0))
            .with_source("second", MemoryCapture::numbered(6, GEOM, 30.0));
        Backends {
            opener: Box::new(opener),
            writers: Arc::new(writers.clone()),
            windows: None,
        }
    }

    #[test]
    fn test_failed_source_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        let writers = MemoryWriterFactory::new();
        let inputs = vec!["first".to_string(), "missing".to_string(), "second".to_string()];

        let report = run_batch(
            &inputs,
            &job(dir.path()),
            &backends(&writers),
            &AtomicBool::new(false),
        );

        assert_eq!(report.sources.len(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert!(!report.interrupted);
        assert!(report.ensure_completed().is_ok());
        assert_eq!(report.frames_written(), 5 + 3);
        assert!(report.sources[1].outcome.as_ref().unwrap_err().contains("missing"));
    }

    #[test]
    fn test_interrupt_stops_batch() {
        let dir = tempfile::tempdir().unwrap();
        let writers = MemoryWriterFactory::new();
        let inputs = vec!["first".to_string(), "second".to_string()];

        let report = run_batch(
            &inputs,
            &job(dir.path()),
            &backends(&writers),
            &AtomicBool::new(true),
        );
        assert!(report.interrupted);
        assert!(report.ensure_completed().is_err());
        assert!(report.sources.is_empty());
        assert!(writers.created().is_empty());
    }

    #[test]
    fn test_expand_directory_inputs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mp4", "a.MOV", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.mp4"), b"").unwrap();

        let inputs = vec![
            dir.path().to_string_lossy().into_owned(),
            "rtsp://cam.local/live".to_string(),
        ];
        let expanded = expand_inputs(&inputs).unwrap();
        assert_eq!(expanded.len(), 3);
        assert!(expanded[0].ends_with("a.MOV"));
        assert!(expanded[1].ends_with("b.mp4"));
        assert_eq!(expanded[2], "rtsp://cam.local/live");
    }

    #[test]
    fn test_expand_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![dir.path().to_string_lossy().into_owned()];
        assert!(expand_inputs(&inputs).is_err());
    }
}
