pub mod error;
pub mod pipeline;
pub mod settings;
pub mod video;

pub use error::{Result, VideoError};
