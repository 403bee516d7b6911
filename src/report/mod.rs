//! Per-track delivery report

use serde::Serialize;
use tracing::info;

use crate::stats::DeliveryStats;
use crate::types::{FrameFormat, StreamMode, StreamParameters};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackReport {
    pub timestamp: String,
    pub path: String,
    pub mode: StreamMode,
    pub format: FrameFormat,
    /// Probed frame count; unknown ahead of time for encoder output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_bitrate_kbps: Option<f64>,
    pub elapsed_ms: i64,
    pub sent_kbps: f64,
    pub stats: DeliveryStats,
}

impl TrackReport {
    pub fn new(
        path: &std::path::Path,
        mode: StreamMode,
        format: FrameFormat,
        params: Option<&StreamParameters>,
        stats: DeliveryStats,
        elapsed_ms: i64,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            path: path.display().to_string(),
            mode,
            format,
            total_frames: params.map(|p| p.total_frames),
            duration_ms: params.map(|p| p.duration_ms()),
            average_bitrate_kbps: params.map(|p| p.average_bitrate_kbps),
            elapsed_ms,
            sent_kbps: stats.sent_kbps(elapsed_ms),
            stats,
        }
    }

    pub fn log(&self) {
        info!(
            path = %self.path,
            frames = self.stats.frames_sent,
            bytes = self.stats.bytes_sent,
            elapsed_ms = self.elapsed_ms,
            kbps = format!("{:.1}", self.sent_kbps),
            resyncs = self.stats.read.resyncs,
            buffer_ms = self.stats.last_buffer_ahead_ms,
            "track finished"
        );
    }

    /// Pretty-printed JSON for CLI output
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|_| "{\"error\": \"JSON serialization failed\"}".to_string())
    }
}
