// Frame buffers and the small value types shared by every pipeline stage.

use crate::error::{Result, VideoError};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, LumaA, Pixel, Rgb, Rgba};
use ndarray::{Array3, ArrayView3};
use std::fmt;
use std::str::FromStr;

/// Width, height and channel count of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl FrameGeometry {
    pub const fn new(width: u32, height: u32, channels: u32) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Same geometry with width and height exchanged (a quarter turn).
    pub const fn swapped(&self) -> Self {
        Self::new(self.height, self.width, self.channels)
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.channels == 0
    }

    /// Number of bytes in a densely packed frame of this geometry.
    pub const fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    /// `(height, width, channels)`, the array shape used by [`Frame`].
    pub const fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

impl fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// A decoded frame: dense `(height, width, channels)` samples, channel order as
/// delivered by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pixels: Array3<u8>,
}

impl Frame {
    pub fn new(pixels: Array3<u8>) -> Self {
        Self { pixels }
    }

    /// Wrap interleaved row-major bytes.
    pub fn from_raw(geometry: FrameGeometry, data: Vec<u8>) -> Result<Self> {
        let len = data.len();
        let pixels = Array3::from_shape_vec(geometry.shape(), data).map_err(|e| {
            VideoError::InvalidGeometry(format!(
                "{} bytes cannot form a {} frame: {}",
                len, geometry, e
            ))
        })?;
        Ok(Self { pixels })
    }

    pub fn zeros(geometry: FrameGeometry) -> Self {
        Self::filled(geometry, 0)
    }

    pub fn filled(geometry: FrameGeometry, value: u8) -> Self {
        Self {
            pixels: Array3::from_elem(geometry.shape(), value),
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        let (h, w, c) = self.pixels.dim();
        FrameGeometry::new(w as u32, h as u32, c as u32)
    }

    pub fn pixels(&self) -> ArrayView3<'_, u8> {
        self.pixels.view()
    }

    pub fn into_pixels(self) -> Array3<u8> {
        self.pixels
    }

    /// Interleaved row-major copy of the samples.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self.pixels.as_slice() {
            Some(slice) => slice.to_vec(),
            None => self.pixels.iter().copied().collect(),
        }
    }

    /// Bilinear resize to an exact size.
    pub fn resize(&self, width: u32, height: u32) -> Result<Frame> {
        let geometry = self.geometry();
        if width == 0 || height == 0 {
            return Err(VideoError::InvalidGeometry(format!(
                "cannot resize {} to {}x{}",
                geometry, width, height
            )));
        }
        if geometry.width == width && geometry.height == height {
            return Ok(self.clone());
        }

        let raw = self.to_bytes();
        let resized = match geometry.channels {
            1 => resize_as::<Luma<u8>>(raw, geometry, width, height),
            2 => resize_as::<LumaA<u8>>(raw, geometry, width, height),
            3 => resize_as::<Rgb<u8>>(raw, geometry, width, height),
            4 => resize_as::<Rgba<u8>>(raw, geometry, width, height),
            n => {
                return Err(VideoError::InvalidGeometry(format!(
                    "cannot resize frames with {} channels",
                    n
                )))
            }
        }
        .ok_or_else(|| VideoError::InvalidGeometry(format!("buffer does not match {}", geometry)))?;

        Frame::from_raw(FrameGeometry::new(width, height, geometry.channels), resized)
    }

    /// Resize both axes by the same factor, rounding to whole pixels.
    pub fn scale(&self, factor: f64) -> Result<Frame> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(VideoError::InvalidGeometry(format!(
                "invalid scaling factor {}",
                factor
            )));
        }
        let geometry = self.geometry();
        let width = ((geometry.width as f64 * factor).round() as u32).max(1);
        let height = ((geometry.height as f64 * factor).round() as u32).max(1);
        self.resize(width, height)
    }
}

fn resize_as<P>(raw: Vec<u8>, geometry: FrameGeometry, width: u32, height: u32) -> Option<Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let buffer = ImageBuffer::<P, Vec<u8>>::from_raw(geometry.width, geometry.height, raw)?;
    Some(imageops::resize(&buffer, width, height, FilterType::Triangle).into_raw())
}

/// Four-character codec tag (`XVID`, `MJPG`, `mp4v`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC([u8; 4]);

impl FourCC {
    pub const fn new(tag: [u8; 4]) -> Self {
        Self(tag)
    }

    /// Make a user supplied tag safe to hand to a writer: 4 characters are kept
    /// as-is, anything else is cut to 4 and left-padded with `'0'`.
    pub fn sanitize(tag: &str) -> Result<Self> {
        let tag = tag.trim();
        if tag.is_empty() || !tag.is_ascii() {
            return Err(VideoError::InvalidCodec(format!(
                "'{}' is not a usable FourCC",
                tag
            )));
        }
        let cut = &tag[..tag.len().min(4)];
        let padded = format!("{:0>4}", cut);
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(padded.as_bytes());
        Ok(Self(bytes))
    }

    /// Decode a little-endian numeric tag as reported by drivers.
    /// A zero code means the driver doesn't know the codec.
    pub fn from_code(code: u32) -> Option<Self> {
        if code == 0 {
            None
        } else {
            Some(Self(code.to_le_bytes()))
        }
    }

    pub const fn code(&self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    pub const fn bytes(&self) -> [u8; 4] {
        self.0
    }
}

impl FromStr for FourCC {
    type Err = VideoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::sanitize(s)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32, channels: u32) -> Frame {
        let geometry = FrameGeometry::new(width, height, channels);
        let data = (0..geometry.byte_len()).map(|i| (i % 251) as u8).collect();
        Frame::from_raw(geometry, data).unwrap()
    }

    #[test]
    fn test_from_raw_rejects_wrong_length() {
        let result = Frame::from_raw(FrameGeometry::new(4, 4, 3), vec![0; 10]);
        assert!(matches!(result, Err(VideoError::InvalidGeometry(_))));
    }

    #[test]
    fn test_geometry_and_bytes() {
        let frame = gradient(5, 3, 3);
        assert_eq!(frame.geometry(), FrameGeometry::new(5, 3, 3));
        assert_eq!(frame.pixels().dim(), (3, 5, 3));
        assert_eq!(frame.to_bytes().len(), 45);
        assert_eq!(frame.to_bytes()[7], 7);
    }

    #[test]
    fn test_resize_and_scale() {
        let frame = gradient(64, 36, 3);
        let resized = frame.resize(32, 18).unwrap();
        assert_eq!(resized.geometry(), FrameGeometry::new(32, 18, 3));

        let scaled = frame.scale(0.5).unwrap();
        assert_eq!(scaled.geometry(), FrameGeometry::new(32, 18, 3));

        let gray = gradient(10, 10, 1).scale(2.0).unwrap();
        assert_eq!(gray.geometry(), FrameGeometry::new(20, 20, 1));

        assert!(frame.scale(0.0).is_err());
        assert!(gradient(4, 4, 5).resize(2, 2).is_err());
    }

    #[test]
    fn test_resize_to_same_size_is_identity() {
        let frame = gradient(8, 6, 4);
        assert_eq!(frame.resize(8, 6).unwrap(), frame);
    }

    #[test]
    fn test_fourcc_sanitize() {
        assert_eq!(FourCC::sanitize("XVID").unwrap().to_string(), "XVID");
        assert_eq!(FourCC::sanitize("mp4v").unwrap().to_string(), "mp4v");
        assert_eq!(FourCC::sanitize("H26").unwrap().to_string(), "0H26");
        assert_eq!(FourCC::sanitize("MJPGX").unwrap().to_string(), "MJPG");
        assert!(FourCC::sanitize("").is_err());
        assert!("XVID".parse::<FourCC>().is_ok());
    }

    #[test]
    fn test_fourcc_codes() {
        let tag = FourCC::sanitize("MJPG").unwrap();
        assert_eq!(FourCC::from_code(tag.code()), Some(tag));
        assert_eq!(tag.code(), u32::from_le_bytes(*b"MJPG"));
        assert_eq!(FourCC::from_code(0), None);
    }
}
