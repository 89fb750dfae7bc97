//! Live pipeline counters
//!
//! Written by the acquisition thread, readable from anywhere. Malformed
//! lines are only observable here and in debug logs; they never interrupt
//! the pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic session counters, shared through an `Arc`.
#[derive(Debug)]
pub struct PipelineStats {
    started_at: DateTime<Utc>,
    lines: AtomicU64,
    samples: AtomicU64,
    malformed: AtomicU64,
    empty: AtomicU64,
    timeouts: AtomicU64,
    dropped: AtomicU64,
    commands_written: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            lines: AtomicU64::new(0),
            samples: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            empty: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            commands_written: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_line(&self) {
        self.lines.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sample(&self) {
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_empty(&self) {
        self.empty.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_command(&self) {
        self.commands_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at: self.started_at,
            lines: self.lines.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            commands_written: self.commands_written.load(Ordering::Relaxed),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable copy of [`PipelineStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    /// Lines read from the link (including malformed and empty ones).
    pub lines: u64,
    /// Samples handed to the channel.
    pub samples: u64,
    /// Lines rejected by the parser or assembler.
    pub malformed: u64,
    /// Empty lines, skipped silently.
    pub empty: u64,
    /// Reads that hit the timeout.
    pub timeouts: u64,
    /// Samples lost to channel backpressure.
    pub dropped: u64,
    /// Command bytes written to the link.
    pub commands_written: u64,
}

impl StatsSnapshot {
    /// Share of non-empty lines that were malformed (0.0-1.0).
    pub fn malformed_ratio(&self) -> f64 {
        let meaningful = self.lines.saturating_sub(self.empty);
        if meaningful == 0 {
            0.0
        } else {
            self.malformed as f64 / meaningful as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let stats = PipelineStats::new();
        for _ in 0..4 {
            stats.record_line();
        }
        stats.record_empty();
        stats.record_malformed();
        stats.record_sample();
        stats.record_sample();
        let snap = stats.snapshot();
        assert_eq!(snap.lines, 4);
        assert_eq!(snap.samples, 2);
        assert!((snap.malformed_ratio() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(PipelineStats::new().snapshot()).unwrap();
        assert_eq!(json["malformed"], 0);
        assert!(json["started_at"].is_string());
    }
}
