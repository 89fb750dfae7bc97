//! Command back-channel: consumer → acquisition thread → device
//!
//! The consumer (a key handler, typically) enqueues single-byte commands;
//! the acquisition thread drains them between reads and writes them to the
//! link. Toggling the display mode also flips a shared [`ModeFlag`] that
//! only the consumer side reads.

use crate::types::Command;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Pending commands before `enqueue` starts refusing.
pub const DEFAULT_COMMAND_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("command queue full")]
    QueueFull,
    #[error("acquisition stopped")]
    Closed,
}

/// Shared display-mode flag (e.g. "show yaw").
#[derive(Debug, Clone, Default)]
pub struct ModeFlag(Arc<AtomicBool>);

impl ModeFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Flip the flag and return the new value.
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::AcqRel)
    }
}

/// Create a bounded command channel.
pub fn command_channel(capacity: usize) -> (CommandSink, CommandQueue) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (
        CommandSink {
            tx,
            mode: ModeFlag::new(),
        },
        CommandQueue { rx },
    )
}

/// Consumer-side handle for issuing commands.
#[derive(Debug, Clone)]
pub struct CommandSink {
    tx: Sender<Command>,
    mode: ModeFlag,
}

impl CommandSink {
    pub fn enqueue(&self, command: Command) -> Result<(), CommandError> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => CommandError::QueueFull,
            TrySendError::Disconnected(_) => CommandError::Closed,
        })
    }

    pub fn request_sample(&self) -> Result<(), CommandError> {
        self.enqueue(Command::RequestSample)
    }

    /// Flip the local mode flag and tell the device. The flag changes even
    /// when the device can no longer be reached.
    pub fn toggle_mode(&self) -> Result<bool, CommandError> {
        let mode = self.mode.toggle();
        self.enqueue(Command::ToggleMode)?;
        Ok(mode)
    }

    pub fn mode(&self) -> &ModeFlag {
        &self.mode
    }
}

/// Acquisition-side end; drained between link reads.
#[derive(Debug)]
pub struct CommandQueue {
    rx: Receiver<Command>,
}

impl CommandQueue {
    /// Commands queued right now, oldest first.
    pub fn drain(&self) -> impl Iterator<Item = Command> + '_ {
        self.rx.try_iter()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_drain_in_order() {
        let (sink, queue) = command_channel(4);
        sink.request_sample().unwrap();
        sink.toggle_mode().unwrap();
        sink.request_sample().unwrap();
        let drained: Vec<Command> = queue.drain().collect();
        assert_eq!(
            drained,
            vec![Command::RequestSample, Command::ToggleMode, Command::RequestSample]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_toggle_flips_shared_flag() {
        let (sink, _queue) = command_channel(4);
        let flag = sink.mode().clone();
        assert!(!flag.is_set());
        assert!(sink.toggle_mode().unwrap());
        assert!(flag.is_set());
        assert!(!sink.toggle_mode().unwrap());
        assert!(!flag.is_set());
    }

    #[test]
    fn test_full_and_closed() {
        let (sink, queue) = command_channel(1);
        sink.request_sample().unwrap();
        assert_eq!(sink.request_sample(), Err(CommandError::QueueFull));
        drop(queue);
        assert_eq!(sink.request_sample(), Err(CommandError::Closed));
    }
}
