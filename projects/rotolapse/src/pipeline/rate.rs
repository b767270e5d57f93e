// Time-lapse decimation for arbitrary real multipliers.

use crate::error::{Result, VideoError};

/// Decides, frame by frame, which source frames end up in the recording.
///
/// The recording rate is `min(ceiling, source_fps × multiplier)` and on average
/// one frame is kept per `effective_factor` pulled frames. The accumulator is
/// only ever decremented by the factor on emit, so the fractional remainder is
/// carried forward and the emitted count stays within one frame of
/// `pulled / effective_factor`.
#[derive(Debug, Clone, PartialEq)]
pub struct RateReconciler {
    source_fps: f64,
    multiplier: f64,
    target_fps_ceiling: f64,
    recording_fps: f64,
    effective_factor: f64,
    accumulator: f64,
    pulled: u64,
    emitted: u64,
}

impl RateReconciler {
    pub fn new(source_fps: f64, multiplier: f64, target_fps_ceiling: f64) -> Result<Self> {
        for (name, value) in [
            ("source fps", source_fps),
            ("time-lapse multiplier", multiplier),
            ("target fps ceiling", target_fps_ceiling),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(VideoError::InvalidFrameRate(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        let requested = source_fps * multiplier;
        let recording_fps = target_fps_ceiling.min(requested);
        let effective_factor = (requested / recording_fps).max(1.0);

        Ok(Self {
            source_fps,
            multiplier,
            target_fps_ceiling,
            recording_fps,
            effective_factor,
            accumulator: Self::primed(effective_factor),
            pulled: 0,
            emitted: 0,
        })
    }

    // One tick short of emitting, so the first pulled frame is kept.
    fn primed(effective_factor: f64) -> f64 {
        effective_factor - 1.0
    }

    /// Account for one pulled source frame. Returns `true` if it should be
    /// decoded and emitted.
    pub fn tick(&mut self) -> bool {
        self.pulled += 1;
        self.accumulator += 1.0;
        if self.accumulator >= self.effective_factor {
            self.accumulator -= self.effective_factor;
            self.emitted += 1;
            true
        } else {
            false
        }
    }

    /// Back to the initial state, e.g. when a looping source wraps.
    pub fn reset(&mut self) {
        self.accumulator = Self::primed(self.effective_factor);
        self.pulled = 0;
        self.emitted = 0;
    }

    /// Emissions after `pulled` ticks from a fresh state, ignoring float error.
    pub fn expected_emissions(&self, pulled: u64) -> u64 {
        (pulled as f64 / self.effective_factor).ceil() as u64
    }

    pub fn source_fps(&self) -> f64 {
        self.source_fps
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn target_fps_ceiling(&self) -> f64 {
        self.target_fps_ceiling
    }

    pub fn recording_fps(&self) -> f64 {
        self.recording_fps
    }

    pub fn effective_factor(&self) -> f64 {
        self.effective_factor
    }

    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    pub fn pulled(&self) -> u64 {
        self.pulled
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}
