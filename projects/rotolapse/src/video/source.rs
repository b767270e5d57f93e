use super::{
    CaptureBackend, CaptureOpener, Frame, MediaDescriptor, MetadataValue, NetworkStreamInfo,
    SourceKind, StreamMetadata, VideoReader,
};
use crate::error::{Result, VideoError};

/// Sequential / random-access reader over a file, network stream or device.
///
/// End of stream is reported as `None` (or `false` for
/// [`peek_undecoded`](Self::peek_undecoded)), never as an error. A frame that
/// fails to decode ends the stream the same way.
pub struct FrameSource {
    descriptor: MediaDescriptor,
    network: Option<NetworkStreamInfo>,
    backend: Box<dyn CaptureBackend>,
    metadata: StreamMetadata,
    frames_read: u64,
    pending: bool,
    closed: bool,
}

impl FrameSource {
    pub fn open(descriptor: &str, opener: &dyn CaptureOpener) -> Result<Self> {
        Self::open_descriptor(MediaDescriptor::classify(descriptor), opener)
    }

    pub fn open_descriptor(
        descriptor: MediaDescriptor,
        opener: &dyn CaptureOpener,
    ) -> Result<Self> {
        let network = Self::check_descriptor(&descriptor)?;
        let backend = opener.open(&descriptor).map_err(|e| match e {
            VideoError::SourceNotFound(_) | VideoError::UnsupportedDescriptor { .. } => e,
            other => VideoError::SourceNotFound(format!("{}: {}", descriptor, other)),
        })?;
        let mut source = Self::from_backend(descriptor, backend)?;
        source.network = network;
        Ok(source)
    }

    /// Wrap an already opened capture handle.
    pub fn from_backend(
        descriptor: MediaDescriptor,
        backend: Box<dyn CaptureBackend>,
    ) -> Result<Self> {
        let metadata = backend.probe()?;
        tracing::info!(
            "FrameSource: opened {} ({}): {}",
            descriptor,
            descriptor.kind(),
            metadata
        );
        Ok(Self {
            descriptor,
            network: None,
            backend,
            metadata,
            frames_read: 0,
            pending: false,
            closed: false,
        })
    }

    fn check_descriptor(descriptor: &MediaDescriptor) -> Result<Option<NetworkStreamInfo>> {
        match descriptor.kind() {
            SourceKind::File => {
                let exists = descriptor.path().map(|p| p.exists()).unwrap_or(false);
                if !exists {
                    return Err(VideoError::SourceNotFound(descriptor.raw().to_string()));
                }
                Ok(None)
            }
            SourceKind::NetworkStream => descriptor.network_info().map(Some),
            SourceKind::Device | SourceKind::Unknown => Ok(None),
        }
    }

    /// Close the current handle and open the same descriptor again.
    pub fn reopen(&mut self, opener: &dyn CaptureOpener) -> Result<()> {
        self.close();
        let backend = opener.open(&self.descriptor)?;
        self.metadata = backend.probe()?;
        self.backend = backend;
        self.pending = false;
        self.closed = false;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(VideoError::Backend(format!("{} is closed", self.descriptor)))
        } else {
            Ok(())
        }
    }

    /// Decode and return the next frame.
    pub fn read_full(&mut self) -> Result<Option<Frame>> {
        self.ensure_open()?;
        self.pending = false;
        let frame = end_on_decode_failure(self.backend.read())?;
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }

    /// Advance one frame without decoding it. Returns `false` at end of stream.
    /// Follow with [`decode_buffered`](Self::decode_buffered) if the frame is
    /// needed after all.
    pub fn peek_undecoded(&mut self) -> Result<bool> {
        self.ensure_open()?;
        let grabbed = self.backend.grab()?;
        self.pending = grabbed;
        if grabbed {
            self.frames_read += 1;
        }
        Ok(grabbed)
    }

    /// Decode the frame captured by the last [`peek_undecoded`](Self::peek_undecoded).
    pub fn decode_buffered(&mut self) -> Result<Option<Frame>> {
        self.ensure_open()?;
        if !self.pending {
            return Err(VideoError::NoBufferedFrame);
        }
        self.pending = false;
        end_on_decode_failure(self.backend.retrieve())
    }

    pub fn seek_to_frame(&mut self, frame_index: u64) -> Result<()> {
        self.ensure_open()?;
        self.pending = false;
        tracing::debug!("FrameSource: seek {} to frame {}", self.descriptor, frame_index);
        self.backend.seek(frame_index)
    }

    /// Seek to a fraction of the stream, clamped to `[0, 1]`.
    pub fn seek_to_progress(&mut self, fraction: f64) -> Result<()> {
        let last = self.metadata.last_frame_index().ok_or_else(|| {
            VideoError::SeekUnsupported(format!("{} has no known length", self.descriptor))
        })?;
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        let frame_index = (last as f64 * fraction).round() as u64;
        self.seek_to_frame(frame_index)
    }

    pub fn rewind(&mut self, frames: u64) -> Result<()> {
        let target = self.current_frame()?.saturating_sub(frames);
        self.seek_to_frame(target)
    }

    pub fn fast_forward(&mut self, frames: u64) -> Result<()> {
        let mut target = self.current_frame()?.saturating_add(frames);
        if let Some(last) = self.metadata.last_frame_index() {
            target = target.min(last);
        }
        self.seek_to_frame(target)
    }

    pub fn current_frame(&self) -> Result<u64> {
        self.backend.position()
    }

    pub fn current_time_ms(&self) -> Result<f64> {
        self.backend.position_ms()
    }

    /// Position as a fraction of the last frame index; `None` for sources of
    /// unknown (or single frame) length.
    pub fn progress(&self) -> Result<Option<f64>> {
        match self.metadata.last_frame_index() {
            Some(last) if last > 0 => Ok(Some(self.current_frame()? as f64 / last as f64)),
            _ => Ok(None),
        }
    }

    pub fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Result<MetadataValue> {
        self.metadata.lookup(key)
    }

    pub fn descriptor(&self) -> &MediaDescriptor {
        &self.descriptor
    }

    pub fn network_info(&self) -> Option<&NetworkStreamInfo> {
        self.network.as_ref()
    }

    /// Frames successfully read so far, by either read path.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn is_open(&self) -> bool {
        !self.closed && self.backend.is_open()
    }

    /// Release the driver handle. Safe to call more than once; release errors
    /// are logged, not returned.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending = false;
        match self.backend.release() {
            Ok(()) => tracing::debug!(
                "FrameSource: closed {} after {} frames",
                self.descriptor,
                self.frames_read
            ),
            Err(e) => tracing::warn!("FrameSource: error releasing {}: {}", self.descriptor, e),
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl VideoReader for FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.read_full()
    }

    fn seek_to_frame(&mut self, frame_index: u64) -> Result<()> {
        FrameSource::seek_to_frame(self, frame_index)
    }

    fn current_frame(&self) -> Result<u64> {
        FrameSource::current_frame(self)
    }

    fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }
}

fn end_on_decode_failure(result: Result<Option<Frame>>) -> Result<Option<Frame>> {
    match result {
        Err(VideoError::DecodeFailure(msg)) => {
            tracing::debug!("FrameSource: treating decode failure as end of stream: {}", msg);
            Ok(None)
        }
        other => other,
    }
}
