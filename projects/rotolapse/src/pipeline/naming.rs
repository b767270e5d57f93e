// Output folder and file naming for recorded time-lapses

use crate::video::MediaDescriptor;
use std::path::{Path, PathBuf};

/// Scale factors closer than this to 1 are treated as "no resize".
pub const SCALE_TOLERANCE: f64 = 0.001;

/// The knobs that show up in output names.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputNaming {
    pub rotation_degrees: u32,
    pub multiplier: f64,
    pub scale: f64,
    /// Including the leading dot.
    pub extension: String,
}

impl OutputNaming {
    pub fn needs_resizing(&self) -> bool {
        (self.scale - 1.0).abs() > SCALE_TOLERANCE
    }

    /// `Rot_90deg-TL_x12-Scale_50pct`, leaving out the parts that don't apply.
    pub fn folder_name(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if self.rotation_degrees != 0 {
            parts.push(format!("Rot_{}deg", self.rotation_degrees));
        }
        parts.push(format!("TL_x{}", format_multiplier(self.multiplier)));
        if self.needs_resizing() {
            parts.push(format!("Scale_{}pct", (100.0 * self.scale) as i64));
        }
        parts.join("-")
    }

    pub fn file_name(&self, stem: &str) -> String {
        format!(
            "{}_TLx{}{}",
            stem,
            format_multiplier(self.multiplier),
            self.extension
        )
    }

    /// Full output path for a source. Files land next to the source unless an
    /// explicit output directory is given; streams and devices fall back to the
    /// current directory.
    pub fn output_path(&self, descriptor: &MediaDescriptor, output_dir: Option<&Path>) -> PathBuf {
        let base = output_dir
            .map(Path::to_path_buf)
            .or_else(|| descriptor.parent_dir())
            .unwrap_or_else(|| PathBuf::from("."));
        base.join(self.folder_name())
            .join(self.file_name(&descriptor.stem()))
    }
}

/// `12.0` -> `12`, `2.5` -> `2.5`.
pub fn format_multiplier(multiplier: f64) -> String {
    format!("{}", multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naming(rotation_degrees: u32, multiplier: f64, scale: f64) -> OutputNaming {
        OutputNaming {
            rotation_degrees,
            multiplier,
            scale,
            extension: ".avi".to_string(),
        }
    }

    #[test]
    fn test_folder_parts() {
        assert_eq!(naming(90, 12.0, 1.0).folder_name(), "Rot_90deg-TL_x12");
        assert_eq!(naming(0, 12.0, 1.0).folder_name(), "TL_x12");
        assert_eq!(naming(270, 2.5, 0.5).folder_name(), "Rot_270deg-TL_x2.5-Scale_50pct");
        assert_eq!(naming(0, 1.0, 1.0005).folder_name(), "TL_x1");
    }

    #[test]
    fn test_output_path_next_to_source() {
        let descriptor = MediaDescriptor::classify("/videos/day1/clip.mp4");
        let path = naming(90, 12.0, 1.0).output_path(&descriptor, None);
        assert_eq!(
            path,
            PathBuf::from("/videos/day1/Rot_90deg-TL_x12/clip_TLx12.avi")
        );
    }

    #[test]
    fn test_output_path_overrides() {
        let file = MediaDescriptor::classify("/videos/clip.mkv");
        let path = naming(0, 2.5, 1.0).output_path(&file, Some(Path::new("/out")));
        assert_eq!(path, PathBuf::from("/out/TL_x2.5/clip_TLx2.5.avi"));

        let stream = MediaDescriptor::classify("rtsp://cam.local:554/live");
        let path = naming(0, 30.0, 1.0).output_path(&stream, None);
        assert_eq!(path, PathBuf::from("./TL_x30/RTSP_TLx30.avi"));

        let cam = MediaDescriptor::classify("0");
        let path = naming(0, 4.0, 1.0).output_path(&cam, None);
        assert_eq!(path, PathBuf::from("./TL_x4/Webcam_TLx4.avi"));
    }

    #[test]
    fn test_format_multiplier() {
        assert_eq!(format_multiplier(12.0), "12");
        assert_eq!(format_multiplier(2.5), "2.5");
        assert_eq!(format_multiplier(0.25), "0.25");
    }
}
