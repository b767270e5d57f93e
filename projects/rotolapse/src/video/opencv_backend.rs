// OpenCV capture, writer and preview window.

use super::{
    CaptureBackend, CaptureOpener, FourCC, Frame, FrameGeometry, MediaDescriptor, SourceKind,
    StreamMetadata, WindowBackend, WindowFactory, WriterBackend, WriterFactory, WriterConfig,
};
use crate::error::{Result, VideoError};
use opencv::{
    core::{Mat, Scalar, Size, CV_8U, CV_8UC1, CV_8UC2, CV_8UC3, CV_8UC4},
    highgui,
    prelude::*,
    videoio::{
        VideoCapture, VideoWriter, CAP_ANY, CAP_PROP_FOURCC, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT,
        CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH, CAP_PROP_HW_ACCELERATION,
        CAP_PROP_POS_FRAMES, CAP_PROP_POS_MSEC, VIDEOWRITER_PROP_QUALITY,
        VIDEO_ACCELERATION_ANY,
    },
};

/// Copy a decoded 8-bit `Mat` into a [`Frame`].
pub fn mat_to_frame(mat: &Mat) -> Result<Frame> {
    if mat.depth() != CV_8U {
        return Err(VideoError::InvalidGeometry(format!(
            "expected 8-bit samples, got depth {}",
            mat.depth()
        )));
    }
    let geometry = FrameGeometry::new(mat.cols() as u32, mat.rows() as u32, mat.channels() as u32);
    let bytes = if mat.is_continuous() {
        mat.data_bytes()?.to_vec()
    } else {
        mat.try_clone()?.data_bytes()?.to_vec()
    };
    Frame::from_raw(geometry, bytes)
}

pub fn frame_to_mat(frame: &Frame) -> Result<Mat> {
    let geometry = frame.geometry();
    let typ = match geometry.channels {
        1 => CV_8UC1,
        2 => CV_8UC2,
        3 => CV_8UC3,
        4 => CV_8UC4,
        n => {
            return Err(VideoError::InvalidGeometry(format!(
                "OpenCV cannot take {} channel frames",
                n
            )))
        }
    };
    let mut mat = Mat::new_rows_cols_with_default(
        geometry.height as i32,
        geometry.width as i32,
        typ,
        Scalar::all(0.0),
    )?;
    mat.data_bytes_mut()?.copy_from_slice(&frame.to_bytes());
    Ok(mat)
}

pub struct OpencvCapture {
    capture: VideoCapture,
    live: bool,
    open: bool,
}

impl CaptureBackend for OpencvCapture {
    fn grab(&mut self) -> Result<bool> {
        Ok(self.capture.grab()?)
    }

    fn retrieve(&mut self) -> Result<Option<Frame>> {
        let mut mat = Mat::default();
        if !self.capture.retrieve(&mut mat, 0)? || mat.empty() {
            return Err(VideoError::DecodeFailure(
                "OpenCV returned no image for the grabbed frame".to_string(),
            ));
        }
        mat_to_frame(&mat).map(Some)
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        self.capture.set(CAP_PROP_POS_FRAMES, frame_index as f64)?;
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.capture.get(CAP_PROP_POS_FRAMES)?.max(0.0) as u64)
    }

    fn position_ms(&self) -> Result<f64> {
        Ok(self.capture.get(CAP_PROP_POS_MSEC)?)
    }

    fn probe(&self) -> Result<StreamMetadata> {
        let raw_count = self.capture.get(CAP_PROP_FRAME_COUNT)?;
        let total_frames = (!self.live && raw_count > 0.0).then_some(raw_count as u64);
        let mut fps = self.capture.get(CAP_PROP_FPS)?;
        if fps <= 0.0 {
            tracing::warn!("OpencvCapture: Failed to get FPS from metadata, falling back to 30.0");
            fps = 30.0;
        }
        let width = self.capture.get(CAP_PROP_FRAME_WIDTH)? as u32;
        let height = self.capture.get(CAP_PROP_FRAME_HEIGHT)? as u32;
        let codec = FourCC::from_code(self.capture.get(CAP_PROP_FOURCC)? as u32);
        Ok(StreamMetadata {
            total_frames,
            fps,
            // OpenCV converts to BGR unless told otherwise
            geometry: FrameGeometry::new(width, height, 3),
            codec,
        })
    }

    fn release(&mut self) -> Result<()> {
        self.open = false;
        Ok(self.capture.release()?)
    }

    fn is_open(&self) -> bool {
        self.open && self.capture.is_opened().unwrap_or(false)
    }
}

pub struct OpencvCaptureOpener;

impl CaptureOpener for OpencvCaptureOpener {
    fn open(&self, descriptor: &MediaDescriptor) -> Result<Box<dyn CaptureBackend>> {
        let mut capture = match descriptor.device_index() {
            Some(index) => VideoCapture::new(index as i32, CAP_ANY)?,
            None => VideoCapture::from_file(descriptor.raw(), CAP_ANY)?,
        };
        if !capture.is_opened()? {
            return Err(VideoError::SourceNotFound(descriptor.to_string()));
        }

        // Try to enable hardware decoding (VideoToolbox on macOS, VA-API on Linux, etc.)
        match capture.set(CAP_PROP_HW_ACCELERATION, VIDEO_ACCELERATION_ANY as f64) {
            Ok(true) => tracing::debug!("OpencvCapture: hardware acceleration enabled"),
            _ => tracing::debug!("OpencvCapture: hardware acceleration not available"),
        }

        let live = matches!(descriptor.kind(), SourceKind::Device | SourceKind::NetworkStream);
        Ok(Box::new(OpencvCapture {
            capture,
            live,
            open: true,
        }))
    }
}

pub struct OpencvWriter {
    writer: VideoWriter,
    open: bool,
}

impl WriterBackend for OpencvWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let mat = frame_to_mat(frame)?;
        self.writer.write(&mat)?;
        Ok(())
    }

    fn set_quality(&mut self, percent: f64) -> Result<()> {
        if !self.writer.set(VIDEOWRITER_PROP_QUALITY, percent)? {
            tracing::warn!("OpencvWriter: codec ignored quality setting {:.0}%", percent);
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.open = false;
        Ok(self.writer.release()?)
    }

    fn is_open(&self) -> bool {
        self.open && self.writer.is_opened().unwrap_or(false)
    }
}

pub struct OpencvWriterFactory;

impl WriterFactory for OpencvWriterFactory {
    fn create(&self, config: &WriterConfig<'_>) -> Result<Box<dyn WriterBackend>> {
        let init_failed = |reason: String| VideoError::WriterInitFailed {
            path: config.path.to_path_buf(),
            reason,
        };
        let path = config
            .path
            .to_str()
            .ok_or_else(|| init_failed("path is not valid UTF-8".to_string()))?;
        let [a, b, c, d] = config.codec.bytes();
        let fourcc = VideoWriter::fourcc(a as char, b as char, c as char, d as char)?;
        let size = Size::new(config.geometry.width as i32, config.geometry.height as i32);

        let writer = VideoWriter::new(path, fourcc, config.fps, size, config.is_color)?;
        if !writer.is_opened()? {
            return Err(init_failed(format!(
                "OpenCV could not open a {} writer",
                config.codec
            )));
        }
        Ok(Box::new(OpencvWriter { writer, open: true }))
    }
}

pub struct OpencvWindow {
    name: String,
    closed: bool,
}

impl WindowBackend for OpencvWindow {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        let mat = frame_to_mat(frame)?;
        highgui::imshow(&self.name, &mat)?;
        highgui::wait_key(1)?;
        Ok(())
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        Ok(highgui::move_window(&self.name, x, y)?)
    }

    fn exists(&self) -> bool {
        !self.closed
            && highgui::get_window_property(&self.name, highgui::WND_PROP_VISIBLE)
                .map(|visible| visible >= 1.0)
                .unwrap_or(false)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(highgui::destroy_window(&self.name)?)
    }
}

pub struct OpencvWindowFactory;

impl WindowFactory for OpencvWindowFactory {
    fn create(&self, name: &str) -> Result<Box<dyn WindowBackend>> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;
        Ok(Box::new(OpencvWindow {
            name: name.to_string(),
            closed: false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mat_round_trip() {
        let geometry = FrameGeometry::new(5, 3, 3);
        let data = (0..geometry.byte_len()).map(|i| i as u8).collect();
        let frame = Frame::from_raw(geometry, data).unwrap();
        let mat = frame_to_mat(&frame).unwrap();
        assert_eq!(mat.rows(), 3);
        assert_eq!(mat.cols(), 5);
        assert_eq!(mat_to_frame(&mat).unwrap(), frame);
    }
}
