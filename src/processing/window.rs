//! Consumer-side retention window
//!
//! Keeps the samples a renderer needs and evicts the rest from the oldest
//! end as new samples arrive. Sample timestamps are non-decreasing, so
//! arrival order is timestamp order and eviction only ever touches the
//! front: O(1) amortized per ingest.

use crate::types::Sample;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Retention policy for the consumer's view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    /// Keep the last N samples.
    ByCount(usize),
    /// Keep samples within W seconds of the newest sample's timestamp.
    ByTime(f64),
}

impl Default for Retention {
    fn default() -> Self {
        Retention::ByTime(20.0)
    }
}

impl std::fmt::Display for Retention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Retention::ByCount(n) => write!(f, "last {n} samples"),
            Retention::ByTime(w) => write!(f, "last {w}s"),
        }
    }
}

/// Ordered, bounded sequence of recent samples.
#[derive(Debug, Clone)]
pub struct Window {
    retention: Retention,
    samples: VecDeque<Sample>,
    evicted: u64,
}

impl Window {
    pub fn new(retention: Retention) -> Self {
        let initial = match retention {
            Retention::ByCount(n) => n.min(4096),
            Retention::ByTime(_) => 256,
        };
        Self {
            retention,
            samples: VecDeque::with_capacity(initial),
            evicted: 0,
        }
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// Append a sample and evict whatever the policy no longer covers.
    pub fn ingest(&mut self, sample: Sample) {
        self.samples.push_back(sample);
        match self.retention {
            Retention::ByCount(limit) => {
                while self.samples.len() > limit {
                    self.samples.pop_front();
                    self.evicted += 1;
                }
            }
            Retention::ByTime(seconds) => {
                let min_time = sample.timestamp() - seconds;
                while self
                    .samples
                    .front()
                    .is_some_and(|oldest| oldest.timestamp() < min_time)
                {
                    self.samples.pop_front();
                    self.evicted += 1;
                }
            }
        }
    }

    /// Retained samples, oldest first.
    pub fn current_view(&mut self) -> &[Sample] {
        self.samples.make_contiguous()
    }

    /// Iterate retained samples without reorganizing storage.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Sample> + ExactSizeIterator {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples evicted since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Time covered by the retained samples (seconds).
    pub fn span(&self) -> f64 {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => last.timestamp() - first.timestamp(),
            _ => 0.0,
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
