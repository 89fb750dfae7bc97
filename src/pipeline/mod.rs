//! Acquisition Pipeline Module
//!
//! ## Architecture
//!
//! ```text
//!  acquisition thread                          consumer (tokio task, UI tick)
//! ┌─────────────────────────────────────┐     ┌──────────────────────────────┐
//! │ Link ─► FrameParser ─► Assembler ─► │     │                              │
//! │          Smoother ─► SampleSender ──┼─────┼─► SampleReceiver ─► Window   │
//! │                                     │     │                              │
//! │ Link ◄── CommandQueue ◄─────────────┼─────┼── CommandSink ◄── key input  │
//! └─────────────────────────────────────┘     └──────────────────────────────┘
//! ```
//!
//! The acquisition thread owns the link and the smoother outright. Samples
//! cross to the consumer only through the bounded channel; commands cross
//! back only through the command queue.

mod acquisition_loop;
pub mod channel;
pub mod command;
pub mod stats;
pub mod view;

pub use acquisition_loop::{AcquisitionLoop, SessionEnd, SessionReport};
pub use channel::{sample_channel, Backpressure, ChannelError, Received, SampleReceiver, SampleSender};
pub use command::{command_channel, CommandError, CommandQueue, CommandSink, ModeFlag};
pub use stats::{PipelineStats, StatsSnapshot};
pub use view::{PollSummary, TelemetryView};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::acquisition::{FrameParser, Link, SampleAssembler};
use crate::config::TelemetryConfig;
use crate::processing::smoother_for_window;

/// Both ends of a configured pipeline, ready to run.
pub struct PipelineParts<L: Link> {
    /// Producer side; `run()` or `spawn()` it.
    pub acquisition: AcquisitionLoop<L>,
    /// Consumer side.
    pub view: TelemetryView,
    pub commands: CommandSink,
    pub stats: Arc<PipelineStats>,
}

/// Wire a link into a pipeline configured from `config`.
pub fn build<L: Link + 'static>(
    config: &TelemetryConfig,
    link: L,
    cancel_token: CancellationToken,
) -> PipelineParts<L> {
    // Block mode waits at most one read timeout so close requests still land
    let (sender, receiver) = sample_channel(
        config.channel.capacity,
        config.channel.backpressure,
        config.read_timeout(),
    );
    let (commands, queue) = command_channel(command::DEFAULT_COMMAND_CAPACITY);

    let parser = FrameParser::new()
        .with_diagnostic_prefix(config.frame.prefix())
        .with_max_line_bytes(config.frame.max_line_bytes);
    let assembler = SampleAssembler::new(config.assembly.timestamp)
        .with_scale(config.assembly.scale.to_channel_scale());

    let acquisition = AcquisitionLoop::new(link, sender, cancel_token)
        .with_parser(parser)
        .with_assembler(assembler)
        .with_smoother(smoother_for_window(config.smoothing.window))
        .with_commands(queue)
        .with_mode(config.link.mode)
        .with_read_timeout(config.read_timeout());
    let stats = acquisition.stats();

    PipelineParts {
        acquisition,
        view: TelemetryView::new(receiver, config.retention),
        commands,
        stats,
    }
}
