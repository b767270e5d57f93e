use super::{Frame, FrameSource, StreamMetadata, VideoReader};
use crate::error::{Result, VideoError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Read position plus the inclusive loop window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackCursor {
    pub position: u64,
    pub start_frame: u64,
    /// `None` plays to the end of the stream (live sources).
    pub end_frame: Option<u64>,
}

impl PlaybackCursor {
    pub fn full(metadata: &StreamMetadata) -> Self {
        Self {
            position: 0,
            start_frame: 0,
            end_frame: metadata.last_frame_index(),
        }
    }

    /// Window actually used for playback. An inverted window plays the whole
    /// stream.
    pub fn bounds(&self) -> (u64, Option<u64>) {
        match self.end_frame {
            Some(end) if end < self.start_frame => (0, None),
            end => (self.start_frame, end),
        }
    }

    pub fn contains(&self, frame_index: u64) -> bool {
        let (start, end) = self.bounds();
        frame_index >= start && end.map_or(true, |end| frame_index <= end)
    }
}

/// Wraps a reader so that playback never ends: leaving the loop window, hitting
/// end of stream or a decode failure all jump back to the window start.
pub struct LoopingFrameSource<R: VideoReader = FrameSource> {
    inner: R,
    cursor: PlaybackCursor,
    default_end: Option<u64>,
    interrupt: Option<Arc<AtomicBool>>,
    frames_read: u64,
}

impl<R: VideoReader> LoopingFrameSource<R> {
    pub fn new(inner: R) -> Result<Self> {
        let mut cursor = PlaybackCursor::full(inner.metadata());
        cursor.position = inner.current_frame()?;
        Ok(Self {
            default_end: cursor.end_frame,
            inner,
            cursor,
            interrupt: None,
            frames_read: 0,
        })
    }

    /// Abandon the retry loop with [`VideoError::Interrupted`] once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Next frame, and whether this call had to jump back to the loop start.
    pub fn read(&mut self) -> Result<(bool, Frame)> {
        let mut wrapped = false;
        if !self.cursor.contains(self.inner.current_frame()?) {
            self.jump_to_start()?;
            wrapped = true;
        }

        let mut failures = 0u64;
        loop {
            self.check_interrupt()?;
            match self.inner.next_frame() {
                Ok(Some(frame)) => {
                    self.cursor.position = self.inner.current_frame()?;
                    self.frames_read += 1;
                    return Ok((wrapped, frame));
                }
                Ok(None) => {}
                Err(VideoError::DecodeFailure(msg)) => {
                    tracing::debug!("LoopingFrameSource: decode failure, restarting loop: {}", msg);
                }
                Err(e) => return Err(e),
            }
            failures += 1;
            if failures == 2 {
                tracing::warn!(
                    "LoopingFrameSource: no frame available at loop start {}, still retrying",
                    self.cursor.bounds().0
                );
            }
            self.jump_to_start()?;
            wrapped = true;
        }
    }

    fn jump_to_start(&mut self) -> Result<()> {
        let (start, _) = self.cursor.bounds();
        self.inner.seek_to_frame(start)?;
        self.cursor.position = start;
        Ok(())
    }

    fn check_interrupt(&self) -> Result<()> {
        match &self.interrupt {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(VideoError::Interrupted),
            _ => Ok(()),
        }
    }

    /// Move the loop start; playback continues from where it is unless `jump`.
    pub fn set_start_frame(&mut self, frame_index: u64, jump: bool) -> Result<()> {
        self.cursor.start_frame = frame_index;
        tracing::debug!("LoopingFrameSource: loop start set to {}", frame_index);
        if jump {
            self.jump_to_start()?;
        }
        Ok(())
    }

    pub fn set_end_frame(&mut self, frame_index: u64) {
        self.cursor.end_frame = Some(frame_index);
        tracing::debug!("LoopingFrameSource: loop end set to {}", frame_index);
    }

    /// Loop over the whole stream again.
    pub fn reset_bounds(&mut self) {
        self.cursor.start_frame = 0;
        self.cursor.end_frame = self.default_end;
    }

    pub fn mark_start_here(&mut self) -> Result<()> {
        let here = self.inner.current_frame()?;
        self.set_start_frame(here, false)
    }

    pub fn mark_end_here(&mut self) -> Result<()> {
        let here = self.inner.current_frame()?;
        self.set_end_frame(here);
        Ok(())
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: VideoReader> VideoReader for LoopingFrameSource<R> {
    /// Never `None`.
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.read().map(|(_, frame)| Some(frame))
    }

    fn seek_to_frame(&mut self, frame_index: u64) -> Result<()> {
        self.inner.seek_to_frame(frame_index)?;
        self.cursor.position = frame_index;
        Ok(())
    }

    fn current_frame(&self) -> Result<u64> {
        self.inner.current_frame()
    }

    fn metadata(&self) -> &StreamMetadata {
        self.inner.metadata()
    }
}
