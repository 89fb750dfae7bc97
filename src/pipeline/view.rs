//! Consumer-side view: channel receiver plus retention window.
//!
//! Polled from the consumer's own loop (a UI tick, a tokio interval).
//! Polling never blocks; once the producer is gone and the queue is empty
//! the view freezes on whatever the window last held.

use super::channel::{Received, SampleReceiver};
use crate::processing::{Retention, Window};
use crate::types::Sample;

/// Upper bound on samples moved per poll, so a burst cannot starve the
/// consumer's loop.
pub const DEFAULT_MAX_PER_POLL: usize = 4096;

/// Outcome of one [`TelemetryView::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollSummary {
    pub received: usize,
    pub ended: bool,
}

pub struct TelemetryView {
    receiver: SampleReceiver,
    window: Window,
    max_per_poll: usize,
    received: u64,
    ended: bool,
}

impl TelemetryView {
    pub fn new(receiver: SampleReceiver, retention: Retention) -> Self {
        Self {
            receiver,
            window: Window::new(retention),
            max_per_poll: DEFAULT_MAX_PER_POLL,
            received: 0,
            ended: false,
        }
    }

    pub fn with_max_per_poll(mut self, max: usize) -> Self {
        self.max_per_poll = max.max(1);
        self
    }

    /// Move queued samples into the window.
    pub fn poll(&mut self) -> PollSummary {
        let mut summary = PollSummary {
            received: 0,
            ended: self.ended,
        };
        if self.ended {
            return summary;
        }

        while summary.received < self.max_per_poll {
            match self.receiver.poll() {
                Received::Sample(sample) => {
                    self.window.ingest(sample);
                    summary.received += 1;
                }
                Received::Empty => break,
                Received::Closed => {
                    tracing::info!(
                        retained = self.window.len(),
                        received = self.received + summary.received as u64,
                        "Telemetry stream ended, view frozen"
                    );
                    self.ended = true;
                    summary.ended = true;
                    break;
                }
            }
        }
        self.received += summary.received as u64;
        summary
    }

    /// Retained samples, oldest first.
    pub fn current_view(&mut self) -> &[Sample] {
        self.window.current_view()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.window.latest()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// True once the producer is gone and everything it sent has been read.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Samples received over the view's lifetime, including evicted ones.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Samples lost to channel backpressure.
    pub fn dropped(&self) -> u64 {
        self.receiver.dropped()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::channel::{sample_channel, Backpressure};
    use crate::types::Axis;
    use std::time::Duration;

    fn at(t: f64, x: f64) -> Sample {
        let mut values = [0.0; Axis::COUNT];
        values[Axis::AccelX.index()] = x;
        Sample::new(t, values).unwrap()
    }

    #[test]
    fn test_poll_fills_window_then_freezes() {
        let (tx, rx) = sample_channel(16, Backpressure::DropOldest, Duration::ZERO);
        let mut view = TelemetryView::new(rx, Retention::ByTime(20.0));

        for (t, x) in [(0.0, 1.0), (5.0, 2.0), (10.0, 3.0)] {
            tx.send(at(t, x)).unwrap();
        }
        let summary = view.poll();
        assert_eq!(summary, PollSummary { received: 3, ended: false });
        assert_eq!(view.latest().map(Sample::accel_x), Some(3.0));

        tx.send(at(25.0, 4.0)).unwrap();
        drop(tx);
        let summary = view.poll();
        assert_eq!(summary.received, 1);
        assert!(summary.ended);
        assert!(view.is_ended());

        let ts: Vec<f64> = view.current_view().iter().map(Sample::timestamp).collect();
        assert_eq!(ts, vec![5.0, 10.0, 25.0]);

        // Frozen: later polls change nothing
        assert_eq!(view.poll(), PollSummary { received: 0, ended: true });
        assert_eq!(view.len(), 3);
        assert_eq!(view.received(), 4);
    }

    #[test]
    fn test_poll_is_bounded() {
        let (tx, rx) = sample_channel(16, Backpressure::DropOldest, Duration::ZERO);
        let mut view = TelemetryView::new(rx, Retention::ByCount(100)).with_max_per_poll(4);
        for t in 0..10 {
            tx.send(at(f64::from(t), 0.0)).unwrap();
        }
        assert_eq!(view.poll().received, 4);
        assert_eq!(view.poll().received, 4);
        assert_eq!(view.poll().received, 2);
        assert_eq!(view.len(), 10);
    }

    #[test]
    fn test_empty_poll() {
        let (_tx, rx) = sample_channel(4, Backpressure::DropOldest, Duration::ZERO);
        let mut view = TelemetryView::new(rx, Retention::default());
        assert_eq!(view.poll(), PollSummary::default());
        assert!(view.latest().is_none());
        assert!(view.is_empty());
    }
}
