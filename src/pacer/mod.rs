//! Soft real-time pacing against the wall clock
//!
//! The stream clock is derived from the number of frames sent; the difference
//! to the wall clock is how much audio the server holds ahead of playback.
//! A three band hysteresis keeps that buffer around the configured target.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::constants::{
    PACE_CATCH_UP_MS, PACE_LOW_WATER_OFFSET_MS, PACE_SHED_MS, PACE_STEADY_MS,
    PROGRESS_LOG_AFTER_MS,
};
use crate::error::CastError;
use crate::stats::DeliveryStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// Buffer below target − 100 ms
    CatchUp,
    Steady,
    /// Buffer above target
    Shed,
}

impl Band {
    pub fn select(buffer_ahead_ms: i64, target_ms: i64) -> Self {
        if buffer_ahead_ms < target_ms - PACE_LOW_WATER_OFFSET_MS {
            Band::CatchUp
        } else if buffer_ahead_ms > target_ms {
            Band::Shed
        } else {
            Band::Steady
        }
    }

    pub const fn base_ms(self) -> i64 {
        match self {
            Band::CatchUp => PACE_CATCH_UP_MS,
            Band::Steady => PACE_STEADY_MS,
            Band::Shed => PACE_SHED_MS,
        }
    }
}

/// Sleep before the next iteration; negative results clamp to zero
pub fn next_sleep(buffer_ahead_ms: i64, send_lag_ms: i64, target_ms: i64) -> (Band, Duration) {
    let band = Band::select(buffer_ahead_ms, target_ms);
    let millis = (band.base_ms() - send_lag_ms).max(0);
    (band, Duration::from_millis(millis as u64))
}

/// Milliseconds of audio represented by `frames`
pub fn stream_ms(frames: u64, samples_per_frame: u32, sample_rate: u32) -> i64 {
    if sample_rate == 0 {
        return 0;
    }
    (frames as f64 * samples_per_frame as f64 / sample_rate as f64 * 1000.0) as i64
}

#[derive(Debug, Clone, Copy)]
pub struct PacingState {
    pub frames_sent: u64,
    /// Frames sent since the session clock started
    pub session_frames_sent: u64,
    pub wall_clock_start: Instant,
    pub session_wall_start: Instant,
    pub buffer_ahead_ms: i64,
    pub send_lag_ms: i64,
}

impl PacingState {
    fn new(now: Instant) -> Self {
        Self {
            frames_sent: 0,
            session_frames_sent: 0,
            wall_clock_start: now,
            session_wall_start: now,
            buffer_ahead_ms: 0,
            send_lag_ms: 0,
        }
    }
}

/// Outcome of one paced iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaceDecision {
    pub band: Band,
    pub sleep: Duration,
    pub stream_ms: i64,
    pub wall_ms: i64,
    pub buffer_ahead_ms: i64,
    pub send_lag_ms: i64,
}

pub struct Pacer {
    target_buffer_ms: i64,
    sample_rate: u32,
    samples_per_frame: u32,
    state: PacingState,
    stats: DeliveryStats,
}

impl Pacer {
    pub fn new(target_buffer_ms: u64, sample_rate: u32, samples_per_frame: u32) -> Self {
        Self {
            target_buffer_ms: target_buffer_ms as i64,
            sample_rate,
            samples_per_frame,
            state: PacingState::new(Instant::now()),
            stats: DeliveryStats::new(),
        }
    }

    /// Fix the frame timing once a self-describing stream revealed it
    pub fn set_timing(&mut self, sample_rate: u32, samples_per_frame: u32) {
        self.sample_rate = sample_rate;
        self.samples_per_frame = samples_per_frame;
    }

    /// Restart the session clock, e.g. when the first encoder output arrives
    pub fn start_session(&mut self) {
        self.state.session_wall_start = Instant::now();
        self.state.session_frames_sent = 0;
    }

    pub fn state(&self) -> &PacingState {
        &self.state
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    fn elapsed_ms(&self) -> i64 {
        self.state.wall_clock_start.elapsed().as_millis() as i64
    }

    /// Account for a sent batch and pick the next sleep
    pub fn record(&mut self, frames: usize, bytes: usize, iteration_start: Instant) -> PaceDecision {
        self.state.frames_sent += frames as u64;
        self.state.session_frames_sent += frames as u64;
        self.stats.record_batch(frames, bytes);

        let stream = stream_ms(
            self.state.session_frames_sent,
            self.samples_per_frame,
            self.sample_rate,
        );
        let wall = self.state.session_wall_start.elapsed().as_millis() as i64;
        let buffer_ahead_ms = (stream - wall).max(0);
        let send_lag_ms = iteration_start.elapsed().as_millis() as i64;
        let (band, sleep) = next_sleep(buffer_ahead_ms, send_lag_ms, self.target_buffer_ms);

        self.state.buffer_ahead_ms = buffer_ahead_ms;
        self.state.send_lag_ms = send_lag_ms;
        self.stats.record_pace(band, buffer_ahead_ms, send_lag_ms);

        if wall > PROGRESS_LOG_AFTER_MS {
            debug!(
                frames = self.state.frames_sent,
                session_frames = self.state.session_frames_sent,
                wall_secs = wall / 1000,
                stream_secs = stream / 1000,
                buffer_ms = buffer_ahead_ms,
                batch_frames = frames,
                batch_bytes = bytes,
                "progress"
            );
        }

        PaceDecision {
            band,
            sleep,
            stream_ms: stream,
            wall_ms: wall,
            buffer_ahead_ms,
            send_lag_ms,
        }
    }

    /// Sleep unless aborted first
    pub async fn wait(&self, sleep: Duration, abort: &CancellationToken) -> Result<(), CastError> {
        tokio::select! {
            _ = abort.cancelled() => Err(CastError::Aborted),
            _ = tokio::time::sleep(sleep) => Ok(()),
        }
    }

    /// Final wait after a file track so the next one does not pile onto the
    /// server buffer: total nominal duration minus elapsed wall time
    pub async fn drain(&self, total_duration_ms: i64, abort: &CancellationToken) -> Result<(), CastError> {
        if abort.is_cancelled() {
            return Err(CastError::Aborted);
        }
        let remaining = (total_duration_ms - self.elapsed_ms()).max(0);
        debug!(pause_ms = remaining, "pausing before next track");
        self.wait(Duration::from_millis(remaining as u64), abort).await
    }
}
