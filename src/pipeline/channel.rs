//! Bounded sample handoff between the acquisition thread and consumers
//!
//! A thin layer over a bounded `crossbeam_channel` that adds the backpressure
//! policy. In [`Backpressure::DropOldest`] mode the producer never waits: when
//! the queue is full it discards the oldest unread sample, so consumers
//! always see the freshest data. In [`Backpressure::Block`] mode the
//! producer waits for room, up to a deadline, then gives the sample up.

use crate::types::Sample;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default queue capacity (samples).
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// What the producer does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backpressure {
    /// Discard the oldest unread sample and enqueue the new one.
    #[default]
    DropOldest,
    /// Wait for the consumer to make room.
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Every receiver has been dropped.
    #[error("channel closed")]
    Closed,
    /// Blocking send gave up after its deadline.
    #[error("channel full")]
    Full,
}

/// State shared by both ends.
#[derive(Debug)]
struct Shared {
    receivers: AtomicUsize,
    producer_alive: AtomicBool,
    dropped: AtomicU64,
}

/// Create a bounded sample channel.
pub fn sample_channel(
    capacity: usize,
    backpressure: Backpressure,
    block_timeout: Duration,
) -> (SampleSender, SampleReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let shared = Arc::new(Shared {
        receivers: AtomicUsize::new(1),
        producer_alive: AtomicBool::new(true),
        dropped: AtomicU64::new(0),
    });
    let sender = SampleSender {
        tx,
        overflow: rx.clone(),
        backpressure,
        block_timeout,
        shared: Arc::clone(&shared),
    };
    let receiver = SampleReceiver { rx, shared };
    (sender, receiver)
}

/// Producer end. Owned by the acquisition thread; dropping it closes the
/// channel for every receiver.
#[derive(Debug)]
pub struct SampleSender {
    tx: Sender<Sample>,
    /// Producer-side handle used to evict the oldest sample when full.
    overflow: Receiver<Sample>,
    backpressure: Backpressure,
    block_timeout: Duration,
    shared: Arc<Shared>,
}

impl SampleSender {
    /// Enqueue a sample according to the backpressure policy.
    pub fn send(&self, sample: Sample) -> Result<(), ChannelError> {
        if self.shared.receivers.load(Ordering::Acquire) == 0 {
            return Err(ChannelError::Closed);
        }
        match self.backpressure {
            Backpressure::DropOldest => self.send_lossy(sample),
            Backpressure::Block => match self.tx.send_timeout(sample, self.block_timeout) {
                Ok(()) => Ok(()),
                Err(crossbeam_channel::SendTimeoutError::Timeout(_)) => {
                    self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                    Err(ChannelError::Full)
                }
                Err(crossbeam_channel::SendTimeoutError::Disconnected(_)) => {
                    Err(ChannelError::Closed)
                }
            },
        }
    }

    fn send_lossy(&self, mut sample: Sample) -> Result<(), ChannelError> {
        loop {
            match self.tx.try_send(sample) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    // A consumer may drain between the two calls; then there
                    // is room and nothing is evicted.
                    if self.overflow.try_recv().is_ok() {
                        self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    sample = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return Err(ChannelError::Closed),
            }
        }
    }

    /// Samples discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Whether any receiver is still attached.
    pub fn is_closed(&self) -> bool {
        self.shared.receivers.load(Ordering::Acquire) == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }

    pub fn backpressure(&self) -> Backpressure {
        self.backpressure
    }
}

impl Drop for SampleSender {
    fn drop(&mut self) {
        self.shared.producer_alive.store(false, Ordering::Release);
    }
}

/// Result of a non-blocking receive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Received {
    Sample(Sample),
    /// Nothing queued right now.
    Empty,
    /// Producer is gone and the queue is drained.
    Closed,
}

/// Consumer end. Never blocks.
///
/// Cloning creates another consumer competing for the same samples.
#[derive(Debug)]
pub struct SampleReceiver {
    rx: Receiver<Sample>,
    shared: Arc<Shared>,
}

impl SampleReceiver {
    pub fn try_receive(&self) -> Option<Sample> {
        self.rx.try_recv().ok()
    }

    /// Like [`try_receive`](Self::try_receive) but distinguishes an empty
    /// queue from end-of-stream.
    pub fn poll(&self) -> Received {
        match self.rx.try_recv() {
            Ok(sample) => Received::Sample(sample),
            Err(TryRecvError::Empty) => Received::Empty,
            Err(TryRecvError::Disconnected) => Received::Closed,
        }
    }

    /// Everything queued right now, oldest first.
    pub fn drain(&self) -> Vec<Sample> {
        self.rx.try_iter().collect()
    }

    /// True once the producer has gone away. Samples sent before that may
    /// still be queued.
    pub fn is_producer_gone(&self) -> bool {
        !self.shared.producer_alive.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Samples the producer discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Clone for SampleReceiver {
    fn clone(&self) -> Self {
        self.shared.receivers.fetch_add(1, Ordering::AcqRel);
        Self {
            rx: self.rx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for SampleReceiver {
    fn drop(&mut self) {
        self.shared.receivers.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Axis;

    const BLOCK: Duration = Duration::from_millis(20);

    fn at(t: f64) -> Sample {
        Sample::new(t, [0.0; Axis::COUNT]).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let (tx, rx) = sample_channel(8, Backpressure::DropOldest, BLOCK);
        for t in 0..5 {
            tx.send(at(f64::from(t))).unwrap();
        }
        let got: Vec<f64> = rx.drain().iter().map(Sample::timestamp).collect();
        assert_eq!(got, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(rx.poll(), Received::Empty);
    }

    #[test]
    fn test_drop_oldest_keeps_latest() {
        let (tx, rx) = sample_channel(3, Backpressure::DropOldest, BLOCK);
        for t in 0..10 {
            tx.send(at(f64::from(t))).unwrap();
        }
        let got: Vec<f64> = rx.drain().iter().map(Sample::timestamp).collect();
        assert_eq!(got, vec![7.0, 8.0, 9.0]);
        assert_eq!(tx.dropped(), 7);
        assert_eq!(rx.dropped(), 7);
    }

    #[test]
    fn test_block_gives_up_after_deadline() {
        let (tx, rx) = sample_channel(1, Backpressure::Block, BLOCK);
        tx.send(at(0.0)).unwrap();
        assert_eq!(tx.send(at(1.0)), Err(ChannelError::Full));
        assert_eq!(tx.dropped(), 1);
        assert_eq!(rx.try_receive().map(|s| s.timestamp()), Some(0.0));
    }

    #[test]
    fn test_block_resumes_when_consumer_drains() {
        let (tx, rx) = sample_channel(1, Backpressure::Block, Duration::from_secs(5));
        tx.send(at(0.0)).unwrap();
        let consumer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let first = rx.try_receive();
            (first, rx)
        });
        tx.send(at(1.0)).unwrap();
        let (first, rx) = consumer.join().unwrap();
        assert_eq!(first.map(|s| s.timestamp()), Some(0.0));
        assert_eq!(rx.try_receive().map(|s| s.timestamp()), Some(1.0));
    }

    #[test]
    fn test_closed_after_sender_dropped() {
        let (tx, rx) = sample_channel(4, Backpressure::DropOldest, BLOCK);
        tx.send(at(0.0)).unwrap();
        assert!(!rx.is_producer_gone());
        drop(tx);
        assert!(rx.is_producer_gone());
        assert!(matches!(rx.poll(), Received::Sample(_)));
        assert_eq!(rx.poll(), Received::Closed);
        assert_eq!(rx.poll(), Received::Closed);
    }

    #[test]
    fn test_send_fails_once_receivers_gone() {
        let (tx, rx) = sample_channel(4, Backpressure::DropOldest, BLOCK);
        let second = rx.clone();
        drop(rx);
        assert!(tx.send(at(0.0)).is_ok());
        drop(second);
        assert!(tx.is_closed());
        assert_eq!(tx.send(at(1.0)), Err(ChannelError::Closed));
    }
}
