use super::{
    CaptureBackend, CaptureOpener, FourCC, Frame, FrameGeometry, MediaDescriptor, SourceKind,
    StreamMetadata,
};
use crate::error::{Result, VideoError};
use ffmpeg_next::ffi;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::Video as RawFrame;

/// Capture backed by FFmpeg via ffmpeg-next. Software decoding only; frames
/// come out as packed BGR24 to match the OpenCV backend.
pub struct FfmpegCapture {
    input_ctx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::codec::decoder::Video,
    video_stream_index: usize,
    /// Created on the first retrieve, when the decoded pixel format is known.
    scaler: Option<scaling::Context>,
    width: u32,
    height: u32,
    fps: f64,
    /// Seconds per stream timestamp tick.
    time_base: f64,
    total_frames: Option<u64>,
    codec: Option<FourCC>,
    /// Index of the frame the next grab returns.
    position: u64,
    /// Frame kept by the last grab, decoded but not yet converted.
    pending: Option<RawFrame>,
    /// After a seek, frames stamped before this are decoded and dropped.
    skip_until: Option<f64>,
    reuse_packet: ffmpeg_next::codec::packet::Packet,
    eof_sent: bool,
    open: bool,
}

// SAFETY: a capture is owned by exactly one FrameSource and never shared.
// The raw pointers inside ffmpeg-next types are not aliased across threads.
unsafe impl Send for FfmpegCapture {}

enum Decoded {
    Frame,
    EndOfStream,
}

impl FfmpegCapture {
    fn open(descriptor: &MediaDescriptor) -> Result<Self> {
        let input_ctx = ffmpeg_next::format::input(descriptor.raw())
            .map_err(|e| VideoError::SourceNotFound(format!("{} ({})", descriptor, e)))?;

        let video_stream = input_ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| {
                VideoError::SourceNotFound(format!("{} has no video stream", descriptor))
            })?;
        let video_stream_index = video_stream.index();

        let rational_fps = video_stream.avg_frame_rate();
        let fps = if rational_fps.denominator() > 0 && rational_fps.numerator() > 0 {
            rational_fps.numerator() as f64 / rational_fps.denominator() as f64
        } else {
            tracing::warn!("FfmpegCapture: could not determine FPS, defaulting to 30.0");
            30.0
        };
        let time_base = f64::from(video_stream.time_base());

        let live = descriptor.kind() == SourceKind::NetworkStream;
        let stream_frames = video_stream.frames().max(0) as u64;
        let duration_secs = input_ctx.duration() as f64 / ffi::AV_TIME_BASE as f64;
        let total_frames = if live {
            None
        } else if stream_frames > 0 {
            Some(stream_frames)
        } else if duration_secs > 0.0 {
            Some((duration_secs * fps).round() as u64)
        } else {
            None
        };

        let codec_tag = unsafe { (*video_stream.parameters().as_ptr()).codec_tag };
        let codec = FourCC::from_code(codec_tag);

        let decoder_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())?;
        let decoder = decoder_ctx
            .decoder()
            .video()
            .map_err(|e| VideoError::DecodeFailure(format!("failed to open decoder: {}", e)))?;
        let width = decoder.width();
        let height = decoder.height();

        tracing::info!(
            "FfmpegCapture: opened {}, duration={:.2}s, fps={:.2}, frames={:?} ({}x{})",
            descriptor,
            duration_secs,
            fps,
            total_frames,
            width,
            height
        );

        Ok(Self {
            input_ctx,
            decoder,
            video_stream_index,
            scaler: None,
            width,
            height,
            fps,
            time_base,
            total_frames,
            codec,
            position: 0,
            pending: None,
            skip_until: None,
            reuse_packet: ffmpeg_next::codec::packet::Packet::empty(),
            eof_sent: false,
            open: true,
        })
    }

    /// Pull the next decoded frame, feeding packets as the decoder asks for them.
    fn decode_loop(&mut self, target: &mut RawFrame) -> Result<Decoded> {
        loop {
            match self.decoder.receive_frame(target) {
                Ok(()) => return Ok(Decoded::Frame),
                Err(ffmpeg_next::Error::Other { errno: ffi::EAGAIN }) => {
                    if self.eof_sent {
                        return Ok(Decoded::EndOfStream);
                    }
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(Decoded::EndOfStream),
                Err(e) => return Err(VideoError::DecodeFailure(e.to_string())),
            }

            let mut found_packet = false;
            while self.reuse_packet.read(&mut self.input_ctx).is_ok() {
                if self.reuse_packet.stream() == self.video_stream_index {
                    self.decoder
                        .send_packet(&self.reuse_packet)
                        .map_err(|e| VideoError::DecodeFailure(e.to_string()))?;
                    found_packet = true;
                    break;
                }
            }
            if !found_packet {
                // Input exhausted, let the decoder flush what it still holds
                self.decoder.send_eof()?;
                self.eof_sent = true;
            }
        }
    }

    fn frame_time(&self, frame: &RawFrame) -> Option<f64> {
        frame.timestamp().map(|ts| ts as f64 * self.time_base)
    }

    fn convert(&mut self, raw: &RawFrame) -> Result<Frame> {
        if self.scaler.is_none() {
            self.scaler = Some(scaling::Context::get(
                raw.format(),
                self.width,
                self.height,
                Pixel::BGR24,
                self.width,
                self.height,
                scaling::Flags::BILINEAR,
            )?);
        }
        let Some(scaler) = self.scaler.as_mut() else {
            return Err(VideoError::Backend("scaler unavailable".to_string()));
        };
        let mut bgr = RawFrame::empty();
        scaler
            .run(raw, &mut bgr)
            .map_err(|e| VideoError::DecodeFailure(format!("pixel conversion failed: {}", e)))?;

        let geometry = FrameGeometry::new(bgr.width(), bgr.height(), 3);
        let row_len = geometry.width as usize * 3;
        let stride = bgr.stride(0);
        let data = bgr.data(0);
        let mut bytes = Vec::with_capacity(geometry.byte_len());
        for y in 0..geometry.height as usize {
            let offset = y * stride;
            bytes.extend_from_slice(&data[offset..offset + row_len]);
        }
        Frame::from_raw(geometry, bytes)
    }
}

impl CaptureBackend for FfmpegCapture {
    fn grab(&mut self) -> Result<bool> {
        if !self.open {
            return Ok(false);
        }
        let mut frame = RawFrame::empty();
        loop {
            if let Decoded::EndOfStream = self.decode_loop(&mut frame)? {
                self.pending = None;
                return Ok(false);
            }
            match (self.skip_until, self.frame_time(&frame)) {
                // Keyframe seeks land early; decode forward to the target
                (Some(target), Some(time)) if time + 0.5 / self.fps < target => continue,
                _ => break,
            }
        }
        self.skip_until = None;
        self.pending = Some(frame);
        self.position += 1;
        Ok(true)
    }

    fn retrieve(&mut self) -> Result<Option<Frame>> {
        match self.pending.take() {
            Some(raw) => self.convert(&raw).map(Some),
            None => Ok(None),
        }
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        let time_secs = frame_index as f64 / self.fps;
        let timestamp = (time_secs * ffi::AV_TIME_BASE as f64) as i64;
        self.input_ctx
            .seek(timestamp, ..timestamp)
            .map_err(|e| VideoError::SeekUnsupported(e.to_string()))?;
        self.decoder.flush();
        self.eof_sent = false;
        self.pending = None;
        // Format might change across the seek
        self.scaler = None;
        self.skip_until = (frame_index > 0).then_some(time_secs);
        self.position = frame_index;
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.position)
    }

    fn position_ms(&self) -> Result<f64> {
        Ok(self.position as f64 * 1000.0 / self.fps)
    }

    fn probe(&self) -> Result<StreamMetadata> {
        Ok(StreamMetadata {
            total_frames: self.total_frames,
            fps: self.fps,
            geometry: FrameGeometry::new(self.width, self.height, 3),
            codec: self.codec,
        })
    }

    fn release(&mut self) -> Result<()> {
        self.open = false;
        self.pending = None;
        self.scaler = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

pub struct FfmpegCaptureOpener;

impl CaptureOpener for FfmpegCaptureOpener {
    fn open(&self, descriptor: &MediaDescriptor) -> Result<Box<dyn CaptureBackend>> {
        ffmpeg_next::init()?;
        if descriptor.kind() == SourceKind::Device {
            return Err(VideoError::UnsupportedDescriptor {
                descriptor: descriptor.to_string(),
                reason: "capture devices need the opencv backend".to_string(),
            });
        }
        Ok(Box::new(FfmpegCapture::open(descriptor)?))
    }
}
