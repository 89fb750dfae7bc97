//! imu-telemetry - serial IMU acquisition
//!
//! Reads six-axis frames from a serial IMU, smooths them, and keeps a
//! rolling window of recent samples. This binary is the headless consumer:
//! it logs a status line per second and takes single-key commands on stdin.
//!
//! # Usage
//!
//! ```bash
//! # Stream from a device
//! imu-telemetry --port /dev/ttyUSB0
//!
//! # Half-duplex device that answers one frame per request
//! imu-telemetry --port COM4 --polling
//!
//! # Replay a capture, or run against the built-in simulated device
//! imu-telemetry --replay capture.txt --exit-on-end
//! imu-telemetry --simulate --seed 42
//! ```
//!
//! # Keys (stdin, followed by Enter)
//!
//! - `z`: toggle the device's display mode
//! - `.`: request one sample
//! - `q`: quit
//!
//! # Environment Variables
//!
//! - `IMU_TELEMETRY_CONFIG`: path to a TOML config file
//! - `IMU_TELEMETRY_PORT`: serial port, overridden by `--port`
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use imu_telemetry::acquisition::available_ports;
use imu_telemetry::config::defaults::SIMULATED_FRAME_INTERVAL_MS;
use imu_telemetry::pipeline::{self, CommandSink, PipelineParts, PipelineStats, TelemetryView};
use imu_telemetry::{
    Backpressure, Link, LinkMode, ReplayLink, Retention, SerialLink, SessionEnd, SimulatedLink,
    TelemetryConfig, TimestampPolicy,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "imu-telemetry")]
#[command(about = "Serial IMU telemetry acquisition")]
#[command(version)]
struct CliArgs {
    /// Config file (must exist). Without it: $IMU_TELEMETRY_CONFIG, ./telemetry.toml, defaults
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serial port, e.g. /dev/ttyUSB0 or COM3
    #[arg(short, long, env = "IMU_TELEMETRY_PORT")]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Per-read deadline in milliseconds
    #[arg(long, value_name = "MS")]
    read_timeout_ms: Option<u64>,

    /// Half-duplex: send a request byte before every read
    #[arg(long)]
    polling: bool,

    /// Replay a captured line file instead of opening a port
    #[arg(long, value_name = "FILE", conflicts_with = "simulate")]
    replay: Option<PathBuf>,

    /// Pause between replayed lines (ms)
    #[arg(long, default_value = "0", value_name = "MS")]
    replay_delay_ms: u64,

    /// Use the built-in simulated IMU instead of opening a port
    #[arg(long)]
    simulate: bool,

    /// Random seed for the simulated device
    #[arg(long)]
    seed: Option<u64>,

    /// Fraction of simulated frames replaced by garbage (0.0-1.0)
    #[arg(long, default_value = "0.0")]
    malformed_rate: f64,

    /// Simulated device unplugs itself after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Moving-average window per channel (0 disables smoothing)
    #[arg(long, value_name = "N")]
    smoothing: Option<usize>,

    /// Keep samples from the last N seconds
    #[arg(long, value_name = "SECS", conflicts_with = "retain_count")]
    retain_secs: Option<f64>,

    /// Keep the last N samples
    #[arg(long, value_name = "N")]
    retain_count: Option<usize>,

    /// Sample channel capacity
    #[arg(long, value_name = "N")]
    channel_capacity: Option<usize>,

    /// Block the reader when the channel is full instead of dropping the oldest sample
    #[arg(long)]
    block: bool,

    /// Timestamp samples 0, 1, 2, ... instead of seconds since start
    #[arg(long)]
    counter_timestamps: bool,

    /// Exit when the link ends instead of keeping the last window on screen
    #[arg(long)]
    exit_on_end: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl CliArgs {
    /// Flags take precedence over file values.
    fn apply_overrides(&self, config: &mut TelemetryConfig) {
        if let Some(port) = &self.port {
            config.link.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.link.baud_rate = baud;
        }
        if let Some(ms) = self.read_timeout_ms {
            config.link.read_timeout_ms = ms;
        }
        if self.polling {
            config.link.mode = LinkMode::Polling;
        }
        if let Some(window) = self.smoothing {
            config.smoothing.window = window;
        }
        if let Some(secs) = self.retain_secs {
            config.retention = Retention::ByTime(secs);
        }
        if let Some(count) = self.retain_count {
            config.retention = Retention::ByCount(count);
        }
        if let Some(capacity) = self.channel_capacity {
            config.channel.capacity = capacity;
        }
        if self.block {
            config.channel.backpressure = Backpressure::Block;
        }
        if self.counter_timestamps {
            config.assembly.timestamp = TimestampPolicy::Counter;
        }
    }
}

// ============================================================================
// Link Selection
// ============================================================================

fn open_link(args: &CliArgs, config: &TelemetryConfig) -> Result<Box<dyn Link>> {
    if let Some(path) = &args.replay {
        let link = ReplayLink::from_file(path)
            .with_context(|| format!("failed to read replay file {}", path.display()))?
            .with_delay(Duration::from_millis(args.replay_delay_ms));
        info!(file = %path.display(), lines = link.remaining(), "📥 Input: replay");
        return Ok(Box::new(link));
    }

    if args.simulate {
        let mut link = SimulatedLink::new(
            config.link.mode,
            Duration::from_millis(SIMULATED_FRAME_INTERVAL_MS),
            args.seed,
        )
        .with_malformed_rate(args.malformed_rate);
        if let Some(limit) = args.frames {
            link = link.with_frame_limit(limit);
        }
        info!(seed = ?args.seed, mode = ?config.link.mode, "📥 Input: simulated IMU");
        return Ok(Box::new(link));
    }

    let link = SerialLink::open(
        &config.link.port,
        config.link.baud_rate,
        config.frame.max_line_bytes,
    )
    .context("cannot start acquisition")?;
    info!(port = %config.link.port, baud = config.link.baud_rate, "📥 Input: serial");
    Ok(Box::new(link))
}

// ============================================================================
// Key Input
// ============================================================================

/// Read single-key commands from stdin on a detached thread.
///
/// A blocking stdin read cannot be cancelled, so this thread is never
/// joined; it dies with the process.
fn spawn_key_reader(commands: CommandSink, cancel_token: CancellationToken) -> Result<()> {
    std::thread::Builder::new()
        .name("keys".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for byte in stdin.lock().bytes() {
                let Ok(byte) = byte else { break };
                let result = match byte {
                    b'q' | b'Q' => {
                        info!("Quit requested");
                        cancel_token.cancel();
                        break;
                    }
                    b'z' | b'Z' => commands.toggle_mode().map(|on| {
                        info!(yaw_mode = on, "Display mode toggled");
                    }),
                    b'.' => commands.request_sample(),
                    _ => Ok(()),
                };
                if let Err(e) = result {
                    warn!(error = %e, "Command not sent");
                }
            }
        })
        .context("failed to spawn key reader")?;
    Ok(())
}

// ============================================================================
// Consumer Loop
// ============================================================================

/// Poll the view until cancelled (or, with `exit_on_end`, until the link ends).
async fn run_consumer(
    view: &mut TelemetryView,
    commands: &CommandSink,
    stats: &PipelineStats,
    config: &TelemetryConfig,
    exit_on_end: bool,
    cancel_token: CancellationToken,
) {
    let mut poll = tokio::time::interval(config.poll_interval());
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status = tokio::time::interval(config.status_interval());
    status.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut frozen = false;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = poll.tick() => {
                if view.poll().ended && !frozen {
                    frozen = true;
                    log_status(view, commands, stats, frozen);
                    if exit_on_end {
                        break;
                    }
                    warn!("Link ended, holding the last window (q or Ctrl+C to quit)");
                }
            }
            _ = status.tick() => {
                if !frozen {
                    log_status(view, commands, stats, frozen);
                }
            }
        }
    }
}

fn log_status(view: &TelemetryView, commands: &CommandSink, stats: &PipelineStats, frozen: bool) {
    let window = view.window();
    match view.latest() {
        Some(s) => info!(
            t = format_args!("{:.2}", s.timestamp()),
            accel = format_args!("[{:.2}, {:.2}, {:.2}]", s.accel_x(), s.accel_y(), s.accel_z()),
            gyro = format_args!("[{:.2}, {:.2}, {:.2}]", s.gyro_x(), s.gyro_y(), s.gyro_z()),
            retained = window.len(),
            span_s = format_args!("{:.1}", window.span()),
            malformed = stats.malformed(),
            dropped = view.dropped(),
            yaw_mode = commands.mode().is_set(),
            frozen,
            "Status"
        ),
        None => info!(
            samples = stats.samples(),
            malformed = stats.malformed(),
            yaw_mode = commands.mode().is_set(),
            frozen,
            "Status: waiting for samples"
        ),
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    if args.list_ports {
        let ports = available_ports().context("cannot enumerate serial ports")?;
        if ports.is_empty() {
            println!("no serial ports found");
        }
        for port in ports {
            println!("{port}");
        }
        return Ok(());
    }

    // Load configuration; an explicit --config must load
    let mut config = match &args.config {
        Some(path) => TelemetryConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => TelemetryConfig::load(),
    };
    args.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    if args.dump_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  imu-telemetry {}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        mode = ?config.link.mode,
        smoothing = config.smoothing.window,
        retention = %config.retention,
        capacity = config.channel.capacity,
        backpressure = ?config.channel.backpressure,
        timestamps = ?config.assembly.timestamp,
        "Pipeline configuration"
    );

    let link = open_link(&args, &config)?;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let PipelineParts {
        acquisition,
        mut view,
        commands,
        stats,
    } = pipeline::build(&config, link, cancel_token.clone());

    let handle = acquisition
        .spawn()
        .context("failed to spawn acquisition thread")?;
    spawn_key_reader(commands.clone(), cancel_token.clone())?;

    run_consumer(
        &mut view,
        &commands,
        &stats,
        &config,
        args.exit_on_end,
        cancel_token.clone(),
    )
    .await;

    // Stop the reader; it notices within one read timeout
    cancel_token.cancel();
    let report = tokio::task::spawn_blocking(move || handle.join())
        .await
        .context("failed to join acquisition thread")?
        .map_err(|_| anyhow::anyhow!("acquisition thread panicked"))?;

    match &report.end {
        SessionEnd::Disconnected(reason) => warn!(link = %report.link, reason = %reason, "Session ended by disconnect"),
        SessionEnd::Cancelled | SessionEnd::ConsumerClosed => {}
    }
    match serde_json::to_string(&report.stats) {
        Ok(json) => info!(stats = %json, "Session summary"),
        Err(e) => error!(error = %e, "Failed to serialize session summary"),
    }

    info!("✓ imu-telemetry shutdown complete");
    Ok(())
}
