// In-memory capture, writer and window backends.
//
// These back the test-suite and let library callers push frames they already
// hold through the same pipeline as decoded video.

use super::{
    CaptureBackend, CaptureOpener, FourCC, Frame, FrameGeometry, MediaDescriptor,
    StreamMetadata, WindowBackend, WindowFactory, WriterBackend, WriterConfig, WriterFactory,
};
use crate::error::{Result, VideoError};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub struct MemoryCapture {
    frames: Arc<Vec<Frame>>,
    fps: f64,
    codec: Option<FourCC>,
    live: bool,
    corrupt: HashSet<u64>,
    position: u64,
    pending: Option<u64>,
    open: bool,
    decodes: Arc<AtomicU64>,
}

impl MemoryCapture {
    pub fn new(frames: Vec<Frame>, fps: f64) -> Self {
        Self {
            frames: Arc::new(frames),
            fps,
            codec: None,
            live: false,
            corrupt: HashSet::new(),
            position: 0,
            pending: None,
            open: true,
            decodes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// `count` frames whose every sample equals `index % 256`.
    pub fn numbered(count: u64, geometry: FrameGeometry, fps: f64) -> Self {
        let frames = (0..count)
            .map(|i| Frame::filled(geometry, (i % 256) as u8))
            .collect();
        Self::new(frames, fps)
    }

    pub fn with_codec(mut self, codec: FourCC) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Report no frame count, like a camera or network stream.
    pub fn live(mut self) -> Self {
        self.live = true;
        self
    }

    /// Frames at these indices fail to decode.
    pub fn with_corrupt_frames(mut self, indices: impl IntoIterator<Item = u64>) -> Self {
        self.corrupt.extend(indices);
        self
    }

    /// Shared counter of `retrieve` calls, i.e. full decodes.
    pub fn decode_counter(&self) -> Arc<AtomicU64> {
        self.decodes.clone()
    }

    fn len(&self) -> u64 {
        self.frames.len() as u64
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(VideoError::Backend("memory capture was released".to_string()))
        }
    }
}

impl CaptureBackend for MemoryCapture {
    fn grab(&mut self) -> Result<bool> {
        self.ensure_open()?;
        if self.position >= self.len() {
            self.pending = None;
            return Ok(false);
        }
        self.pending = Some(self.position);
        self.position += 1;
        Ok(true)
    }

    fn retrieve(&mut self) -> Result<Option<Frame>> {
        self.ensure_open()?;
        let Some(index) = self.pending.take() else {
            return Ok(None);
        };
        self.decodes.fetch_add(1, Ordering::Relaxed);
        if self.corrupt.contains(&index) {
            return Err(VideoError::DecodeFailure(format!("frame {} is corrupt", index)));
        }
        Ok(self.frames.get(index as usize).cloned())
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        self.ensure_open()?;
        self.position = frame_index.min(self.len());
        self.pending = None;
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.position)
    }

    fn position_ms(&self) -> Result<f64> {
        if self.fps > 0.0 {
            Ok(self.position as f64 * 1000.0 / self.fps)
        } else {
            Ok(0.0)
        }
    }

    fn probe(&self) -> Result<StreamMetadata> {
        let geometry = self
            .frames
            .first()
            .map(Frame::geometry)
            .unwrap_or(FrameGeometry::new(0, 0, 0));
        Ok(StreamMetadata {
            total_frames: (!self.live).then_some(self.len()),
            fps: self.fps,
            geometry,
            codec: self.codec,
        })
    }

    fn release(&mut self) -> Result<()> {
        self.open = false;
        self.pending = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Opens registered [`MemoryCapture`]s by their raw descriptor string.
#[derive(Debug, Clone, Default)]
pub struct MemoryOpener {
    sources: HashMap<String, MemoryCapture>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, descriptor: impl Into<String>, capture: MemoryCapture) -> Self {
        self.sources.insert(descriptor.into(), capture);
        self
    }
}

impl CaptureOpener for MemoryOpener {
    fn open(&self, descriptor: &MediaDescriptor) -> Result<Box<dyn CaptureBackend>> {
        self.sources
            .get(descriptor.raw())
            .cloned()
            .map(|c| Box::new(c) as Box<dyn CaptureBackend>)
            .ok_or_else(|| VideoError::SourceNotFound(descriptor.raw().to_string()))
    }
}

/// One writer created by a [`MemoryWriterFactory`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedWriter {
    pub path: PathBuf,
    pub codec: FourCC,
    pub fps: f64,
    pub geometry: FrameGeometry,
}

#[derive(Debug, Default)]
struct Recording {
    created: Vec<CreatedWriter>,
    frames: Vec<Frame>,
    quality: Option<f64>,
    released: usize,
}

/// Collects everything written through it. Creating a writer also creates the
/// (empty) target file, like a real container writer would.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriterFactory {
    recording: Arc<Mutex<Recording>>,
    fail_with: Option<String>,
}

impl MemoryWriterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `create` call fails with this driver message.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            fail_with: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn frames(&self) -> Vec<Frame> {
        lock(&self.recording).frames.clone()
    }

    pub fn created(&self) -> Vec<CreatedWriter> {
        lock(&self.recording).created.clone()
    }

    pub fn quality(&self) -> Option<f64> {
        lock(&self.recording).quality
    }

    pub fn released(&self) -> usize {
        lock(&self.recording).released
    }
}

impl WriterFactory for MemoryWriterFactory {
    fn create(&self, config: &WriterConfig<'_>) -> Result<Box<dyn WriterBackend>> {
        if let Some(reason) = &self.fail_with {
            return Err(VideoError::Backend(reason.clone()));
        }
        fs::File::create(config.path)?;
        lock(&self.recording).created.push(CreatedWriter {
            path: config.path.to_path_buf(),
            codec: config.codec,
            fps: config.fps,
            geometry: config.geometry,
        });
        Ok(Box::new(MemoryWriter {
            recording: self.recording.clone(),
            geometry: config.geometry,
            open: true,
        }))
    }
}

struct MemoryWriter {
    recording: Arc<Mutex<Recording>>,
    geometry: FrameGeometry,
    open: bool,
}

impl WriterBackend for MemoryWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if !self.open {
            return Err(VideoError::Backend("memory writer was released".to_string()));
        }
        if frame.geometry() != self.geometry {
            return Err(VideoError::InvalidGeometry(format!(
                "writer expects {}, got {}",
                self.geometry,
                frame.geometry()
            )));
        }
        lock(&self.recording).frames.push(frame.clone());
        Ok(())
    }

    fn set_quality(&mut self, percent: f64) -> Result<()> {
        lock(&self.recording).quality = Some(percent);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            lock(&self.recording).released += 1;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[derive(Debug, Default)]
struct Screen {
    shown: Vec<(String, FrameGeometry)>,
    positions: HashMap<String, (i32, i32)>,
    closed: HashSet<String>,
}

/// Headless windows that remember what they were asked to show.
#[derive(Debug, Clone, Default)]
pub struct MemoryWindowFactory {
    screen: Arc<Mutex<Screen>>,
}

impl MemoryWindowFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(window name, frame geometry)` for every frame shown so far.
    pub fn shown(&self) -> Vec<(String, FrameGeometry)> {
        lock(&self.screen).shown.clone()
    }

    pub fn position(&self, name: &str) -> Option<(i32, i32)> {
        lock(&self.screen).positions.get(name).copied()
    }

    /// Simulate the user closing a window.
    pub fn close_window(&self, name: &str) {
        lock(&self.screen).closed.insert(name.to_string());
    }

    pub fn is_closed(&self, name: &str) -> bool {
        lock(&self.screen).closed.contains(name)
    }
}

impl WindowFactory for MemoryWindowFactory {
    fn create(&self, name: &str) -> Result<Box<dyn WindowBackend>> {
        lock(&self.screen).closed.remove(name);
        Ok(Box::new(MemoryWindow {
            name: name.to_string(),
            screen: self.screen.clone(),
        }))
    }
}

struct MemoryWindow {
    name: String,
    screen: Arc<Mutex<Screen>>,
}

impl WindowBackend for MemoryWindow {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        lock(&self.screen)
            .shown
            .push((self.name.clone(), frame.geometry()));
        Ok(())
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        lock(&self.screen).positions.insert(self.name.clone(), (x, y));
        Ok(())
    }

    fn exists(&self) -> bool {
        !lock(&self.screen).closed.contains(&self.name)
    }

    fn close(&mut self) -> Result<()> {
        lock(&self.screen).closed.insert(self.name.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GEOM: FrameGeometry = FrameGeometry::new(4, 2, 3);

    #[test]
    fn test_grab_retrieve_and_seek() {
        let mut capture = MemoryCapture::numbered(3, GEOM, 10.0);
        assert!(capture.grab().unwrap());
        assert_eq!(capture.retrieve().unwrap(), Some(Frame::filled(GEOM, 0)));
        assert_eq!(capture.retrieve().unwrap(), None);

        capture.seek(2).unwrap();
        assert_eq!(capture.position_ms().unwrap(), 200.0);
        assert_eq!(capture.read().unwrap(), Some(Frame::filled(GEOM, 2)));
        assert_eq!(capture.read().unwrap(), None);
        assert_eq!(capture.decode_counter().load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_probe_live_and_codec() {
        let tag = FourCC::sanitize("MJPG").unwrap();
        let capture = MemoryCapture::numbered(5, GEOM, 25.0).live().with_codec(tag);
        let meta = capture.probe().unwrap();
        assert_eq!(meta.total_frames, None);
        assert_eq!(meta.geometry, GEOM);
        assert_eq!(meta.codec, Some(tag));
    }

    #[test]
    fn test_corrupt_frame() {
        let mut capture = MemoryCapture::numbered(3, GEOM, 10.0).with_corrupt_frames([1]);
        assert!(capture.read().unwrap().is_some());
        assert!(matches!(capture.read(), Err(VideoError::DecodeFailure(_))));
        assert!(capture.read().unwrap().is_some());
    }

    #[test]
    fn test_released_capture_refuses_reads() {
        let mut capture = MemoryCapture::numbered(3, GEOM, 10.0);
        capture.release().unwrap();
        assert!(!capture.is_open());
        assert!(capture.grab().is_err());
    }

    #[test]
    fn test_opener_unknown_descriptor() {
        let opener = MemoryOpener::new().with_source("cam", MemoryCapture::numbered(1, GEOM, 1.0));
        assert!(opener.open(&MediaDescriptor::classify("cam")).is_ok());
        assert!(matches!(
            opener.open(&MediaDescriptor::classify("other")),
            Err(VideoError::SourceNotFound(_))
        ));
    }

    #[test]
    fn test_window_factory_tracks_state() {
        let factory = MemoryWindowFactory::new();
        let mut window = factory.create("Preview").unwrap();
        window.move_to(20, 20).unwrap();
        window.show(&Frame::zeros(GEOM)).unwrap();
        assert_eq!(factory.position("Preview"), Some((20, 20)));
        assert_eq!(factory.shown(), vec![("Preview".to_string(), GEOM)]);

        factory.close_window("Preview");
        assert!(!window.exists());
    }
}
