//! Counters collected while reading and delivering a track

use serde::Serialize;

/// Frame reader counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadStats {
    /// Complete frames handed out
    pub frames: u64,
    pub bytes: u64,
    /// Runs of invalid headers (one per loss of sync)
    pub bad_runs: u64,
    /// Header windows rejected inside those runs
    pub bad_headers: u64,
    /// Successful resynchronizations
    pub resyncs: u64,
}

/// Per-track delivery counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct DeliveryStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub iterations: u64,
    pub catch_up_iterations: u64,
    pub steady_iterations: u64,
    pub shed_iterations: u64,
    pub max_send_lag_ms: i64,
    pub last_buffer_ahead_ms: i64,
    pub read: ReadStats,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_batch(&mut self, frames: usize, bytes: usize) {
        self.frames_sent += frames as u64;
        self.bytes_sent += bytes as u64;
        self.iterations += 1;
    }

    pub fn record_pace(&mut self, band: crate::pacer::Band, buffer_ahead_ms: i64, send_lag_ms: i64) {
        use crate::pacer::Band;
        match band {
            Band::CatchUp => self.catch_up_iterations += 1,
            Band::Steady => self.steady_iterations += 1,
            Band::Shed => self.shed_iterations += 1,
        }
        self.last_buffer_ahead_ms = buffer_ahead_ms;
        self.max_send_lag_ms = self.max_send_lag_ms.max(send_lag_ms);
    }

    /// Average bitrate actually pushed, in kbps
    pub fn sent_kbps(&self, elapsed_ms: i64) -> f64 {
        if elapsed_ms <= 0 {
            return 0.0;
        }
        self.bytes_sent as f64 * 8.0 / elapsed_ms as f64
    }
}
