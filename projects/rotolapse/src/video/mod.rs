pub mod descriptor;
pub mod display;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_capture;
pub mod frame;
pub mod looping;
pub mod memory;
pub mod metadata;
#[cfg(feature = "opencv")]
pub mod opencv_backend;
pub mod sink;
pub mod source;

use crate::error::Result;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

pub use descriptor::{MediaDescriptor, NetworkStreamInfo, SourceKind};
pub use display::{DisplayWindow, WindowRegistry};
pub use frame::{FourCC, Frame, FrameGeometry};
pub use looping::{LoopingFrameSource, PlaybackCursor};
pub use metadata::{MetadataKey, MetadataValue, StreamMetadata};
pub use sink::{ActiveSink, FrameSink, RecordingTarget};
pub use source::FrameSource;

/// The capability shared by plain and looping sources.
pub trait VideoReader {
    /// Next decoded frame, `None` once nothing more can be read.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
    fn seek_to_frame(&mut self, frame_index: u64) -> Result<()>;
    /// Index of the frame the next read will return.
    fn current_frame(&self) -> Result<u64>;
    fn metadata(&self) -> &StreamMetadata;
}

/// Driver-level capture handle.
pub trait CaptureBackend: Send {
    /// Advance one frame and keep it without decoding. `false` at end of stream.
    fn grab(&mut self) -> Result<bool>;
    /// Decode the frame kept by the last [`grab`](Self::grab).
    fn retrieve(&mut self) -> Result<Option<Frame>>;
    fn read(&mut self) -> Result<Option<Frame>> {
        if !self.grab()? {
            return Ok(None);
        }
        self.retrieve()
    }
    fn seek(&mut self, frame_index: u64) -> Result<()>;
    fn position(&self) -> Result<u64>;
    fn position_ms(&self) -> Result<f64>;
    fn probe(&self) -> Result<StreamMetadata>;
    fn release(&mut self) -> Result<()>;
    fn is_open(&self) -> bool;
}

pub trait CaptureOpener {
    fn open(&self, descriptor: &MediaDescriptor) -> Result<Box<dyn CaptureBackend>>;
}

/// Everything a writer needs to know up front.
#[derive(Debug, Clone, Copy)]
pub struct WriterConfig<'a> {
    pub path: &'a Path,
    pub codec: FourCC,
    pub fps: f64,
    pub geometry: FrameGeometry,
    pub is_color: bool,
}

/// Driver-level encoder handle.
pub trait WriterBackend: Send {
    fn write(&mut self, frame: &Frame) -> Result<()>;
    fn set_quality(&mut self, percent: f64) -> Result<()>;
    fn release(&mut self) -> Result<()>;
    fn is_open(&self) -> bool;
}

pub trait WriterFactory {
    fn create(&self, config: &WriterConfig<'_>) -> Result<Box<dyn WriterBackend>>;
}

/// Driver-level preview window.
pub trait WindowBackend {
    fn show(&mut self, frame: &Frame) -> Result<()>;
    fn move_to(&mut self, x: i32, y: i32) -> Result<()>;
    /// `false` once the user closed the window.
    fn exists(&self) -> bool;
    fn close(&mut self) -> Result<()>;
}

pub trait WindowFactory {
    fn create(&self, name: &str) -> Result<Box<dyn WindowBackend>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Opencv,
    Ffmpeg,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "opencv" => Ok(Self::Opencv),
            "ffmpeg" => Ok(Self::Ffmpeg),
            other => Err(format!("unknown backend '{}' (expected opencv or ffmpeg)", other)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opencv => f.write_str("opencv"),
            Self::Ffmpeg => f.write_str("ffmpeg"),
        }
    }
}

pub fn capture_opener(kind: BackendKind) -> Result<Box<dyn CaptureOpener>> {
    match kind {
        #[cfg(feature = "opencv")]
        BackendKind::Opencv => Ok(Box::new(opencv_backend::OpencvCaptureOpener)),
        #[cfg(not(feature = "opencv"))]
        BackendKind::Opencv => Err(crate::error::VideoError::BackendUnavailable("opencv")),
        #[cfg(feature = "ffmpeg")]
        BackendKind::Ffmpeg => Ok(Box::new(ffmpeg_capture::FfmpegCaptureOpener)),
        #[cfg(not(feature = "ffmpeg"))]
        BackendKind::Ffmpeg => Err(crate::error::VideoError::BackendUnavailable("ffmpeg")),
    }
}

/// Recording always goes through OpenCV's `VideoWriter`, whichever backend reads.
pub fn writer_factory() -> Result<Arc<dyn WriterFactory>> {
    #[cfg(feature = "opencv")]
    {
        Ok(Arc::new(opencv_backend::OpencvWriterFactory))
    }
    #[cfg(not(feature = "opencv"))]
    {
        Err(crate::error::VideoError::BackendUnavailable("opencv"))
    }
}

pub fn window_factory() -> Result<Box<dyn WindowFactory>> {
    #[cfg(feature = "opencv")]
    {
        Ok(Box::new(opencv_backend::OpencvWindowFactory))
    }
    #[cfg(not(feature = "opencv"))]
    {
        Err(crate::error::VideoError::BackendUnavailable("opencv"))
    }
}
