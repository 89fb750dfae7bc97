//! Acquisition loop: link → parser → assembler → smoother → channel.
//!
//! Runs on its own thread and owns everything on the producer side. The
//! read timeout bounds how long it can go without checking the command
//! queue and the cancellation token. Only link loss or cancellation ends
//! the loop; malformed lines are counted and skipped.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::channel::{ChannelError, SampleSender};
use super::command::CommandQueue;
use super::stats::{PipelineStats, StatsSnapshot};
use crate::acquisition::link::DEFAULT_READ_TIMEOUT;
use crate::acquisition::{
    FrameParser, LineRead, Link, LinkMode, SampleAssembler, TimestampPolicy,
};
use crate::processing::{PassThrough, Smoother};
use crate::types::Command;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Close requested through the cancellation token.
    Cancelled,
    /// The link dropped (or the replay ran out).
    Disconnected(String),
    /// Every consumer went away.
    ConsumerClosed,
}

/// Summary returned when the acquisition thread exits.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub link: String,
    pub end: SessionEnd,
    pub stats: StatsSnapshot,
}

/// Owns the producer side of the pipeline.
///
/// Built with [`new()`](AcquisitionLoop::new), configured with the `with_*`
/// methods, then consumed by [`run()`](AcquisitionLoop::run) or
/// [`spawn()`](AcquisitionLoop::spawn).
pub struct AcquisitionLoop<L: Link> {
    link: L,
    parser: FrameParser,
    assembler: SampleAssembler,
    smoother: Box<dyn Smoother>,
    sender: SampleSender,
    commands: Option<CommandQueue>,
    mode: LinkMode,
    read_timeout: Duration,
    cancel_token: CancellationToken,
    stats: Arc<PipelineStats>,
    dropped_seen: u64,
}

impl<L: Link + 'static> AcquisitionLoop<L> {
    pub fn new(link: L, sender: SampleSender, cancel_token: CancellationToken) -> Self {
        Self {
            link,
            parser: FrameParser::new(),
            assembler: SampleAssembler::new(TimestampPolicy::WallClock),
            smoother: Box::new(PassThrough),
            sender,
            commands: None,
            mode: LinkMode::FreeRunning,
            read_timeout: DEFAULT_READ_TIMEOUT,
            cancel_token,
            stats: Arc::new(PipelineStats::new()),
            dropped_seen: 0,
        }
    }

    pub fn with_parser(mut self, parser: FrameParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_assembler(mut self, assembler: SampleAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_smoother(mut self, smoother: Box<dyn Smoother>) -> Self {
        self.smoother = smoother;
        self
    }

    /// Attach the consumer's command queue.
    pub fn with_commands(mut self, commands: CommandQueue) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn with_mode(mut self, mode: LinkMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Live counters; clone the `Arc` before spawning to watch them.
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Run on a dedicated, named thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<SessionReport>> {
        std::thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || self.run())
    }

    /// Run until the link drops, the consumers leave, or cancellation.
    ///
    /// Consumes the loop: the link is closed and the sample sender dropped
    /// on return, so consumers observe end-of-stream.
    pub fn run(mut self) -> SessionReport {
        info!(
            link = %self.link.name(),
            mode = ?self.mode,
            smoother = self.smoother.name(),
            timestamps = ?self.assembler.policy(),
            capacity = self.sender.capacity(),
            "Acquisition started"
        );

        let end = loop {
            if self.cancel_token.is_cancelled() {
                info!("[Acquisition] Close requested");
                break SessionEnd::Cancelled;
            }

            if let ControlFlow::Break(end) = self.write_pending_commands() {
                break end;
            }

            if self.mode == LinkMode::Polling {
                if let ControlFlow::Break(end) = self.write_command(Command::RequestSample) {
                    break end;
                }
            }

            match self.link.read_line(self.read_timeout) {
                Ok(LineRead::Line(bytes)) => {
                    if let ControlFlow::Break(end) = self.handle_line(&bytes) {
                        break end;
                    }
                }
                Ok(LineRead::Timeout) => self.stats.record_timeout(),
                Err(e) => {
                    warn!(link = %self.link.name(), error = %e, "[Acquisition] Link lost");
                    break SessionEnd::Disconnected(e.to_string());
                }
            }
        };

        self.link.close();
        let report = SessionReport {
            link: self.link.name().to_string(),
            end,
            stats: self.stats.snapshot(),
        };
        info!(
            end = ?report.end,
            lines = report.stats.lines,
            samples = report.stats.samples,
            malformed = report.stats.malformed,
            dropped = report.stats.dropped,
            "Acquisition stopped"
        );
        report
    }

    fn write_pending_commands(&mut self) -> ControlFlow<SessionEnd> {
        let Some(queue) = self.commands.take() else {
            return ControlFlow::Continue(());
        };
        let mut flow = ControlFlow::Continue(());
        for command in queue.drain() {
            debug!(?command, "[Acquisition] Writing command");
            flow = self.write_command(command);
            if flow.is_break() {
                break;
            }
        }
        self.commands = Some(queue);
        flow
    }

    fn write_command(&mut self, command: Command) -> ControlFlow<SessionEnd> {
        match self.link.write(&[command.byte()]) {
            Ok(()) => {
                self.stats.record_command();
                ControlFlow::Continue(())
            }
            Err(e) => {
                warn!(link = %self.link.name(), error = %e, "[Acquisition] Write failed");
                ControlFlow::Break(SessionEnd::Disconnected(e.to_string()))
            }
        }
    }

    fn handle_line(&mut self, bytes: &[u8]) -> ControlFlow<SessionEnd> {
        self.stats.record_line();
        trace!(line = %String::from_utf8_lossy(bytes), "raw line");

        let frame = match self.parser.parse_bytes(bytes) {
            Ok(frame) => frame,
            Err(e) if e.is_silent() => {
                self.stats.record_empty();
                return ControlFlow::Continue(());
            }
            Err(e) => {
                self.stats.record_malformed();
                debug!(error = %e, "Discarding malformed line");
                return ControlFlow::Continue(());
            }
        };

        let sample = match self.assembler.assemble(&frame, Instant::now()) {
            Ok(sample) => sample,
            Err(e) => {
                self.stats.record_malformed();
                debug!(error = %e, "Discarding frame");
                return ControlFlow::Continue(());
            }
        };
        let sample = match self.smoother.apply(&sample) {
            Ok(sample) => sample,
            Err(e) => {
                self.stats.record_malformed();
                debug!(error = %e, smoother = self.smoother.name(), "Discarding sample");
                return ControlFlow::Continue(());
            }
        };

        let result = self.sender.send(sample);
        self.sync_dropped();
        match result {
            Ok(()) => {
                self.stats.record_sample();
                ControlFlow::Continue(())
            }
            Err(ChannelError::Full) => {
                debug!("Channel full, sample dropped");
                ControlFlow::Continue(())
            }
            Err(ChannelError::Closed) => {
                info!("[Acquisition] All consumers gone");
                ControlFlow::Break(SessionEnd::ConsumerClosed)
            }
        }
    }

    fn sync_dropped(&mut self) {
        let dropped = self.sender.dropped();
        if dropped > self.dropped_seen {
            self.stats.record_dropped(dropped - self.dropped_seen);
            self.dropped_seen = dropped;
        }
    }
}
