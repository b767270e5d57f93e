use crate::error::{Result, VideoError};
use crate::video::frame::{FourCC, FrameGeometry};
use std::fmt;
use std::str::FromStr;

/// Snapshot of what the driver reported when the source was opened.
/// Not guaranteed accurate for live or network sources.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamMetadata {
    /// `None` when the source has no known length (live streams, devices).
    pub total_frames: Option<u64>,
    pub fps: f64,
    pub geometry: FrameGeometry,
    /// `None` when the driver reports a zero tag.
    pub codec: Option<FourCC>,
}

impl StreamMetadata {
    /// Length in seconds, if the frame count is known.
    pub fn duration_secs(&self) -> Option<f64> {
        match self.total_frames {
            Some(frames) if self.fps > 0.0 => Some(frames as f64 / self.fps),
            _ => None,
        }
    }

    pub fn last_frame_index(&self) -> Option<u64> {
        self.total_frames.map(|n| n.saturating_sub(1))
    }

    pub fn get(&self, key: MetadataKey) -> MetadataValue {
        match key {
            MetadataKey::TotalFrames => MetadataValue::FrameCount(self.total_frames),
            MetadataKey::Fps => MetadataValue::Rate(self.fps),
            MetadataKey::Width => MetadataValue::Size(self.geometry.width),
            MetadataKey::Height => MetadataValue::Size(self.geometry.height),
            MetadataKey::Channels => MetadataValue::Size(self.geometry.channels),
            MetadataKey::Shape => MetadataValue::Shape(self.geometry),
            MetadataKey::Codec => MetadataValue::Codec(self.codec),
        }
    }

    /// Keyed lookup by name, failing with the list of valid keys.
    pub fn lookup(&self, key: &str) -> Result<MetadataValue> {
        Ok(self.get(key.parse()?))
    }
}

impl fmt::Display for StreamMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frames = self
            .total_frames
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let codec = self
            .codec
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        write!(
            f,
            "{}x{} @ {:.2} fps, {} frames, codec {}",
            self.geometry.width, self.geometry.height, self.fps, frames, codec
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    TotalFrames,
    Fps,
    Width,
    Height,
    Channels,
    Shape,
    Codec,
}

impl MetadataKey {
    pub const ALL: [MetadataKey; 7] = [
        Self::TotalFrames,
        Self::Fps,
        Self::Width,
        Self::Height,
        Self::Channels,
        Self::Shape,
        Self::Codec,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::TotalFrames => "total_frames",
            Self::Fps => "fps",
            Self::Width => "width",
            Self::Height => "height",
            Self::Channels => "channels",
            Self::Shape => "shape",
            Self::Codec => "codec",
        }
    }
}

impl FromStr for MetadataKey {
    type Err = VideoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| VideoError::UnknownMetadataKey {
                key: s.to_string(),
                valid: Self::ALL.iter().map(MetadataKey::name).collect(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetadataValue {
    FrameCount(Option<u64>),
    Rate(f64),
    Size(u32),
    Shape(FrameGeometry),
    Codec(Option<FourCC>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StreamMetadata {
        StreamMetadata {
            total_frames: Some(300),
            fps: 30.0,
            geometry: FrameGeometry::new(640, 360, 3),
            codec: FourCC::from_code(u32::from_le_bytes(*b"avc1")),
        }
    }

    #[test]
    fn test_lookup_known_keys() {
        let meta = sample();
        assert_eq!(meta.lookup("total_frames").unwrap(), MetadataValue::FrameCount(Some(300)));
        assert_eq!(meta.lookup("fps").unwrap(), MetadataValue::Rate(30.0));
        assert_eq!(meta.lookup("height").unwrap(), MetadataValue::Size(360));
        assert_eq!(
            meta.lookup("shape").unwrap(),
            MetadataValue::Shape(FrameGeometry::new(640, 360, 3))
        );
        assert_eq!(meta.duration_secs(), Some(10.0));
        assert_eq!(meta.last_frame_index(), Some(299));
    }

    #[test]
    fn test_lookup_unknown_key() {
        match sample().lookup("bitrate") {
            Err(VideoError::UnknownMetadataKey { key, valid }) => {
                assert_eq!(key, "bitrate");
                assert_eq!(valid.len(), MetadataKey::ALL.len());
                assert!(valid.contains(&"codec"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_display_unknown_fields() {
        let meta = StreamMetadata {
            total_frames: None,
            codec: None,
            ..sample()
        };
        let text = meta.to_string();
        assert!(text.contains("unknown frames"));
        assert!(text.contains("codec unknown"));
        assert_eq!(meta.duration_secs(), None);
    }
}
