// Video recording with lazy geometry binding and a disabled no-op mode.

use super::{FourCC, Frame, FrameGeometry, WriterBackend, WriterConfig, WriterFactory};
use crate::error::{Result, VideoError};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const REPORT_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Where and how to record. Geometry may be left unset and is then taken from
/// the first frame written.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingTarget {
    path: PathBuf,
    fps: Option<f64>,
    codec: Option<FourCC>,
    geometry: Option<FrameGeometry>,
    quality: Option<f64>,
    enabled: bool,
    is_color: bool,
}

impl RecordingTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fps: None,
            codec: None,
            geometry: None,
            quality: None,
            enabled: true,
            is_color: true,
        }
    }

    pub fn fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn codec(mut self, codec: FourCC) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn geometry(mut self, geometry: FrameGeometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Encoder quality in percent, applied once the writer exists.
    pub fn quality(mut self, percent: f64) -> Self {
        self.quality = Some(percent);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_color(mut self, is_color: bool) -> Self {
        self.is_color = is_color;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bound_geometry(&self) -> Option<FrameGeometry> {
        self.geometry
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn codec_label(&self) -> String {
        self.codec
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unset".to_string())
    }
}

/// A recorder that is either live or a no-op, decided once at construction.
pub enum FrameSink {
    Enabled(ActiveSink),
    Disabled(RecordingTarget),
}

impl FrameSink {
    /// Open a sink. With a preset geometry the writer is created right away,
    /// otherwise on the first [`write`](Self::write). A disabled target never
    /// touches the filesystem.
    pub fn open(target: RecordingTarget, factory: Arc<dyn WriterFactory>) -> Result<Self> {
        if !target.enabled {
            return Ok(Self::Disabled(target));
        }
        let mut sink = ActiveSink {
            target,
            factory,
            writer: None,
            frames_written: 0,
            start_time: Local::now(),
            end_time: None,
            closed: false,
        };
        if let Some(geometry) = sink.target.geometry {
            sink.create_writer(geometry)?;
        }
        Ok(Self::Enabled(sink))
    }

    /// Returns `true` iff the frame was actually recorded.
    pub fn write(&mut self, frame: &Frame, auto_resize: bool) -> Result<bool> {
        match self {
            Self::Enabled(sink) => sink.write(frame, auto_resize),
            Self::Disabled(_) => Ok(false),
        }
    }

    pub fn set_quality(&mut self, percent: f64) -> Result<()> {
        match self {
            Self::Enabled(sink) => sink.set_quality(percent),
            Self::Disabled(_) => Ok(()),
        }
    }

    pub fn close(&mut self) {
        if let Self::Enabled(sink) = self {
            sink.close();
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    pub fn is_open(&self) -> bool {
        match self {
            Self::Enabled(sink) => sink.is_open(),
            Self::Disabled(_) => false,
        }
    }

    pub fn target(&self) -> &RecordingTarget {
        match self {
            Self::Enabled(sink) => &sink.target,
            Self::Disabled(target) => target,
        }
    }

    pub fn frames_written(&self) -> u64 {
        match self {
            Self::Enabled(sink) => sink.frames_written,
            Self::Disabled(_) => 0,
        }
    }

    pub fn start_time(&self) -> Option<DateTime<Local>> {
        match self {
            Self::Enabled(sink) => Some(sink.start_time),
            Self::Disabled(_) => None,
        }
    }

    pub fn end_time(&self) -> Option<DateTime<Local>> {
        match self {
            Self::Enabled(sink) => sink.end_time,
            Self::Disabled(_) => None,
        }
    }

    pub fn report_start(&self) {
        match self {
            Self::Enabled(sink) => tracing::info!(
                path = %sink.target.path.display(),
                codec = %sink.target.codec_label(),
                time = %Local::now().format(REPORT_TIME_FORMAT),
                "Recording started"
            ),
            Self::Disabled(target) => tracing::warn!(
                path = %target.path.display(),
                "RECORDING DISABLED"
            ),
        }
    }

    pub fn report_end(&self) {
        if let Self::Enabled(sink) = self {
            let finished = sink.end_time.unwrap_or_else(Local::now);
            tracing::info!(
                frames = sink.frames_written,
                time = %finished.format(REPORT_TIME_FORMAT),
                "Recording finished!"
            );
        }
    }
}

/// State of an enabled sink. Closed on drop.
pub struct ActiveSink {
    target: RecordingTarget,
    factory: Arc<dyn WriterFactory>,
    writer: Option<Box<dyn WriterBackend>>,
    frames_written: u64,
    start_time: DateTime<Local>,
    end_time: Option<DateTime<Local>>,
    closed: bool,
}

impl ActiveSink {
    fn create_writer(&mut self, geometry: FrameGeometry) -> Result<()> {
        let codec = self
            .target
            .codec
            .ok_or_else(|| VideoError::InvalidCodec("codec not set".to_string()))?;
        let fps = match self.target.fps {
            Some(fps) if fps.is_finite() && fps > 0.0 => fps,
            Some(fps) => return Err(VideoError::InvalidFrameRate(format!("{} fps", fps))),
            None => return Err(VideoError::InvalidFrameRate("fps not set".to_string())),
        };
        if geometry.is_empty() {
            return Err(VideoError::InvalidGeometry(format!(
                "cannot record {} frames",
                geometry
            )));
        }

        let path = self.target.path.clone();
        let init_failed = |reason: String| VideoError::WriterInitFailed {
            path: path.clone(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| init_failed(e.to_string()))?;
        }

        let config = WriterConfig {
            path: &path,
            codec,
            fps,
            geometry,
            is_color: self.target.is_color,
        };
        let writer = self.factory.create(&config).map_err(|e| match e {
            VideoError::InvalidGeometry(_)
            | VideoError::InvalidCodec(_)
            | VideoError::InvalidFrameRate(_)
            | VideoError::WriterInitFailed { .. } => e,
            other => init_failed(other.to_string()),
        })?;

        tracing::info!(
            "FrameSink: writing {} at {:.2} fps ({}, {})",
            path.display(),
            fps,
            codec,
            geometry
        );
        self.writer = Some(writer);
        self.target.geometry = Some(geometry);

        if let Some(quality) = self.target.quality {
            self.set_quality(quality)?;
        }
        Ok(())
    }

    fn write(&mut self, frame: &Frame, auto_resize: bool) -> Result<bool> {
        if self.closed {
            return Err(VideoError::Backend(format!(
                "{} is closed",
                self.target.path.display()
            )));
        }

        let incoming = frame.geometry();
        if self.writer.is_none() {
            self.create_writer(self.target.geometry.unwrap_or(incoming))?;
        }
        let bound = self.target.geometry.unwrap_or(incoming);

        if incoming.channels != bound.channels {
            return Err(VideoError::InvalidGeometry(format!(
                "sink bound to {} cannot take a {} frame",
                bound, incoming
            )));
        }

        let resized;
        let frame = if incoming == bound {
            frame
        } else if auto_resize {
            resized = frame.resize(bound.width, bound.height)?;
            &resized
        } else {
            return Err(VideoError::InvalidGeometry(format!(
                "sink bound to {} cannot take a {} frame",
                bound, incoming
            )));
        };

        let Some(writer) = self.writer.as_mut() else {
            return Err(VideoError::WriterNotReady);
        };
        writer.write(frame)?;
        self.frames_written += 1;
        Ok(true)
    }

    fn set_quality(&mut self, percent: f64) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(VideoError::WriterNotReady)?;
        let percent = percent.clamp(0.0, 100.0);
        writer.set_quality(percent)?;
        self.target.quality = Some(percent);
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed && self.writer.as_ref().map_or(false, |w| w.is_open())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.end_time = Some(Local::now());
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.release() {
                tracing::warn!(
                    "FrameSink: error releasing writer for {}: {}",
                    self.target.path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for ActiveSink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::memory::MemoryWriterFactory;

    const GEOM: FrameGeometry = FrameGeometry::new(8, 6, 3);

    fn xvid() -> FourCC {
        FourCC::sanitize("XVID").unwrap()
    }

    fn target(dir: &Path) -> RecordingTarget {
        RecordingTarget::new(dir.join("out").join("clip.avi"))
            .fps(30.0)
            .codec(xvid())
    }

    #[test]
    fn test_disabled_sink_never_touches_disk() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MemoryWriterFactory::new();
        let mut sink = FrameSink::open(
            target(dir.path()).geometry(GEOM).enabled(false),
            Arc::new(factory.clone()),
        )
        .unwrap();

        for value in [0, 128, 255] {
            assert!(!sink.write(&Frame::filled(GEOM, value), true).unwrap());
        }
        assert!(!sink.write(&Frame::zeros(FrameGeometry::new(3, 3, 1)), false).unwrap());
        sink.set_quality(50.0).unwrap();
        sink.close();

        assert!(!dir.path().join("out").exists());
        assert!(factory.created().is_empty());
        assert_eq!(sink.frames_written(), 0);
        assert!(!sink.is_open());
    }

    #[test]
    fn test_geometry_binds_on_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MemoryWriterFactory::new();
        let mut sink = FrameSink::open(target(dir.path()), Arc::new(factory.clone())).unwrap();
        assert!(factory.created().is_empty());
        assert!(matches!(sink.set_quality(80.0), Err(VideoError::WriterNotReady)));

        assert!(sink.write(&Frame::filled(GEOM, 1), true).unwrap());
        assert!(dir.path().join("out").join("clip.avi").exists());
        assert_eq!(sink.target().bound_geometry(), Some(GEOM));

        let created = factory.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].geometry, GEOM);
        assert_eq!(created[0].codec, xvid());

        sink.set_quality(80.0).unwrap();
        assert_eq!(factory.quality(), Some(80.0));
    }

    #[test]
    fn test_auto_resize() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MemoryWriterFactory::new();
        let mut sink =
            FrameSink::open(target(dir.path()).geometry(GEOM), Arc::new(factory.clone())).unwrap();

        assert!(sink.write(&Frame::filled(FrameGeometry::new(16, 12, 3), 9), true).unwrap());
        assert_eq!(factory.frames()[0].geometry(), GEOM);

        let wrong_size = Frame::zeros(FrameGeometry::new(4, 4, 3));
        assert!(matches!(
            sink.write(&wrong_size, false),
            Err(VideoError::InvalidGeometry(_))
        ));

        let gray = Frame::zeros(FrameGeometry::new(8, 6, 1));
        assert!(matches!(sink.write(&gray, true), Err(VideoError::InvalidGeometry(_))));
        assert_eq!(sink.frames_written(), 1);
    }

    #[test]
    fn test_missing_settings_fail_writer_creation() {
        let dir = tempfile::tempdir().unwrap();
        let factory: Arc<dyn WriterFactory> = Arc::new(MemoryWriterFactory::new());

        let no_codec = RecordingTarget::new(dir.path().join("a.avi")).fps(30.0).geometry(GEOM);
        assert!(matches!(
            FrameSink::open(no_codec, factory.clone()),
            Err(VideoError::InvalidCodec(_))
        ));

        let no_fps = RecordingTarget::new(dir.path().join("b.avi")).codec(xvid()).geometry(GEOM);
        assert!(matches!(
            FrameSink::open(no_fps, factory.clone()),
            Err(VideoError::InvalidFrameRate(_))
        ));

        let bad_fps = target(dir.path()).fps(f64::NAN).geometry(GEOM);
        assert!(matches!(
            FrameSink::open(bad_fps, factory.clone()),
            Err(VideoError::InvalidFrameRate(_))
        ));

        let empty = target(dir.path()).geometry(FrameGeometry::new(0, 6, 3));
        assert!(matches!(
            FrameSink::open(empty, factory),
            Err(VideoError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_driver_failure_is_writer_init_failed() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(MemoryWriterFactory::failing("no encoder"));
        match FrameSink::open(target(dir.path()).geometry(GEOM), factory) {
            Err(VideoError::WriterInitFailed { reason, .. }) => {
                assert!(reason.contains("no encoder"))
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("sink should not open"),
        }
    }

    #[test]
    fn test_preset_quality_applied_on_creation() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MemoryWriterFactory::new();
        let _sink = FrameSink::open(
            target(dir.path()).geometry(GEOM).quality(150.0),
            Arc::new(factory.clone()),
        )
        .unwrap();
        assert_eq!(factory.quality(), Some(100.0));
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MemoryWriterFactory::new();
        let mut sink =
            FrameSink::open(target(dir.path()).geometry(GEOM), Arc::new(factory.clone())).unwrap();
        assert!(sink.is_open());
        assert!(sink.end_time().is_none());

        sink.close();
        let ended = sink.end_time();
        assert!(ended.is_some());
        sink.close();
        drop(sink);

        assert_eq!(factory.released(), 1);
        assert!(ended.unwrap() >= chrono::Local::now() - chrono::Duration::minutes(1));
    }

    #[test]
    fn test_write_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FrameSink::open(
            target(dir.path()).geometry(GEOM),
            Arc::new(MemoryWriterFactory::new()),
        )
        .unwrap();
        sink.close();
        assert!(!sink.is_open());
        assert!(sink.write(&Frame::zeros(GEOM), true).is_err());
    }
}
