//! Download counters shared by every task of a manager

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe download statistics
#[derive(Debug, Default)]
pub struct DownloadMetrics {
    pub started: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
    pub retries: AtomicU64,
    pub bytes: AtomicU64,
}

impl DownloadMetrics {
    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self, size: u64) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Cancelled and paused downloads both count here
    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DownloadMetricsSnapshot {
        DownloadMetricsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DownloadMetrics`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadMetricsSnapshot {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub retries: u64,
    pub bytes: u64,
}

impl DownloadMetricsSnapshot {
    /// Completed share of started downloads (0.0 to 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.started == 0 {
            0.0
        } else {
            self.completed as f64 / self.started as f64
        }
    }

    pub fn average_size(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.bytes as f64 / self.completed as f64
        }
    }
}
