//! Per-channel smoothing
//!
//! The smoothing policy is a trait so deployments can pick one: the 3D
//! viewer averages the last N raw values per axis, while the chart passes
//! raw samples through and relies on its time window instead.

use crate::types::{Axis, NonFiniteValue, Sample};
use std::collections::VecDeque;

/// Default moving-average length (samples).
pub const DEFAULT_SMOOTHING_WINDOW: usize = 10;

/// Stateful per-channel filter, owned by the acquisition thread.
pub trait Smoother: Send {
    /// Feed one raw value for `axis` and return the filtered value.
    fn update(&mut self, axis: Axis, raw: f64) -> f64;

    /// Drop all history (new session).
    fn reset(&mut self);

    fn name(&self) -> &'static str;

    /// Filter every channel of a sample, keeping its timestamp.
    ///
    /// Fails when a filtered value is not finite (a window sum past
    /// `f64::MAX`). The raw values stay in the history either way.
    fn apply(&mut self, sample: &Sample) -> Result<Sample, NonFiniteValue> {
        let mut values = sample.values();
        for axis in Axis::ALL {
            values[axis.index()] = self.update(axis, values[axis.index()]);
        }
        sample.with_values(values)
    }
}

/// Build the smoother for a configured window length; 0 disables smoothing.
pub fn smoother_for_window(window: usize) -> Box<dyn Smoother> {
    if window == 0 {
        Box::new(PassThrough)
    } else {
        Box::new(MovingAverage::new(window))
    }
}

// ============================================================================
// Pass-through
// ============================================================================

/// No smoothing; raw values are forwarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl Smoother for PassThrough {
    fn update(&mut self, _axis: Axis, raw: f64) -> f64 {
        raw
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "pass-through"
    }
}

// ============================================================================
// Simple moving average
// ============================================================================

/// Ring buffer of the last `capacity` values and their mean.
///
/// Before the buffer fills, the mean covers only the values seen so far
/// (no zero padding).
#[derive(Debug, Clone)]
pub struct RingAverage {
    values: VecDeque<f64>,
    capacity: usize,
    mean: f64,
}

impl RingAverage {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            mean: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) -> f64 {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
        // Re-summing N values avoids drift from incremental add/subtract
        self.mean = self.values.iter().sum::<f64>() / self.values.len() as f64;
        self.mean
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.mean = 0.0;
    }
}

/// Simple moving average over the last N raw values of each channel.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    channels: [RingAverage; Axis::COUNT],
}

impl MovingAverage {
    pub fn new(window: usize) -> Self {
        Self {
            channels: std::array::from_fn(|_| RingAverage::new(window)),
        }
    }

    pub fn window(&self) -> usize {
        self.channels[0].capacity()
    }

    /// Current average for one channel.
    pub fn mean(&self, axis: Axis) -> f64 {
        self.channels[axis.index()].mean()
    }
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_WINDOW)
    }
}

impl Smoother for MovingAverage {
    fn update(&mut self, axis: Axis, raw: f64) -> f64 {
        self.channels[axis.index()].push(raw)
    }

    fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.clear();
        }
    }

    fn name(&self) -> &'static str {
        "moving-average"
    }
}
