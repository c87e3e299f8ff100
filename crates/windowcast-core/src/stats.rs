use std::time::SystemTime;

use serde::Serialize;

/// Point-in-time statistics for one capture stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamStats {
    pub total_frames_delivered: u64,
    pub total_frames_dropped: u64,
    pub current_buffer_depth: usize,
    pub peak_buffer_depth: usize,
    /// Cumulative payload bytes produced; not a live-memory gauge.
    pub bytes_processed_total: u64,
    /// `total_frames_delivered / uptime_secs`.
    pub actual_fps: f64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub latency_samples: usize,
    /// Wall-clock time of the most recent `start()`.
    pub stream_started_at: Option<SystemTime>,
    /// Active time accumulated across restarts.
    pub uptime_secs: f64,
    pub is_active: bool,
}

impl std::fmt::Display for StreamStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<StreamStats: {} frames, {:.1} FPS, {:.2}ms latency, {}>",
            self.total_frames_delivered,
            self.actual_fps,
            self.avg_latency_ms,
            if self.is_active { "ACTIVE" } else { "STOPPED" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_reports_state() {
        let stats = StreamStats {
            total_frames_delivered: 42,
            actual_fps: 29.96,
            avg_latency_ms: 1.234,
            is_active: true,
            ..Default::default()
        };
        assert_eq!(stats.to_string(), "<StreamStats: 42 frames, 30.0 FPS, 1.23ms latency, ACTIVE>");
    }
}
