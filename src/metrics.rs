//! Session counters for swim_analysis

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-wide metrics collector
#[derive(Default)]
pub struct Metrics {
    pub total_sessions: AtomicU64,
    pub successful_sessions: AtomicU64,
    pub failed_sessions: AtomicU64,
    pub total_latency_ms: AtomicU64,

    pub frames_decoded: AtomicU64,
    pub preview_frames_written: AtomicU64,
    pub frames_analyzed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_session(&self, success: bool, latency_ms: u64) {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);

        if success {
            self.successful_sessions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_sessions.fetch_add(1, Ordering::Relaxed);
        }

        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_frames(&self, decoded: usize, previews: usize, analyzed: usize) {
        self.frames_decoded.fetch_add(decoded as u64, Ordering::Relaxed);
        self.preview_frames_written
            .fetch_add(previews as u64, Ordering::Relaxed);
        self.frames_analyzed.fetch_add(analyzed as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_sessions.load(Ordering::Relaxed);
        let successful = self.successful_sessions.load(Ordering::Relaxed);
        let failed = self.failed_sessions.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_sessions: total,
            successful_sessions: successful,
            failed_sessions: failed,
            error_rate: if total > 0 { failed as f64 / total as f64 } else { 0.0 },
            avg_latency_ms: if total > 0 { total_latency / total } else { 0 },
            frames: FrameMetrics {
                decoded: self.frames_decoded.load(Ordering::Relaxed),
                preview_written: self.preview_frames_written.load(Ordering::Relaxed),
                analyzed: self.frames_analyzed.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_sessions: u64,
    pub successful_sessions: u64,
    pub failed_sessions: u64,
    pub error_rate: f64,
    pub avg_latency_ms: u64,
    pub frames: FrameMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub decoded: u64,
    pub preview_written: u64,
    pub analyzed: u64,
}

/// Timer for tracking session latency
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
