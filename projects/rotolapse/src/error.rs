// Error types for the frame pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong between opening a source and closing a sink.
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Couldn't find video source: {0}")]
    SourceNotFound(String),

    #[error("Unsupported source descriptor '{descriptor}': {reason}")]
    UnsupportedDescriptor { descriptor: String, reason: String },

    #[error("Failed to decode frame: {0}")]
    DecodeFailure(String),

    #[error("Invalid frame geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid codec: {0}")]
    InvalidCodec(String),

    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(String),

    #[error("Failed to create video writer for {path:?}: {reason}")]
    WriterInitFailed { path: PathBuf, reason: String },

    #[error("Must set up the video writer before changing its quality")]
    WriterNotReady,

    #[error("Unrecognized metadata key '{key}' (valid keys: {})", .valid.join(", "))]
    UnknownMetadataKey {
        key: String,
        valid: Vec<&'static str>,
    },

    #[error("No frame was grabbed before decoding")]
    NoBufferedFrame,

    #[error("Cannot seek: {0}")]
    SeekUnsupported(String),

    #[error("Interrupted")]
    Interrupted,

    #[error("This build has no {0} support (enable the '{0}' feature)")]
    BackendUnavailable(&'static str),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = VideoError> = std::result::Result<T, E>;

#[cfg(feature = "opencv")]
impl From<opencv::Error> for VideoError {
    #[cold]
    fn from(err: opencv::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for VideoError {
    #[cold]
    fn from(err: ffmpeg_next::Error) -> Self {
        Self::Backend(err.to_string())
    }
}
