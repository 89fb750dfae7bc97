//! Pipeline End-to-End Tests
//!
//! Drives the full pipeline (link → parser → assembler → smoother →
//! channel → view) through the public API, with replayed or simulated
//! links standing in for hardware.

use std::io::Write;
use std::time::{Duration, Instant};

use imu_telemetry::pipeline::{self, PipelineParts};
use imu_telemetry::{
    Link, LinkMode, ReplayEvent, ReplayLink, Retention, Sample, SessionEnd, SessionReport,
    SimulatedLink, TelemetryConfig, TelemetryView, TimestampPolicy,
};
use tokio_util::sync::CancellationToken;

/// Upper bound for any single test run.
const TEST_DEADLINE: Duration = Duration::from_secs(10);

fn test_config() -> TelemetryConfig {
    let mut config = TelemetryConfig::default();
    config.smoothing.window = 0;
    config.link.read_timeout_ms = 20;
    config
}

/// Run the acquisition thread to completion while the consumer polls.
fn run_to_end<L: Link + 'static>(
    config: &TelemetryConfig,
    link: L,
    before_start: impl FnOnce(&PipelineParts<L>),
) -> (SessionReport, TelemetryView) {
    let parts = pipeline::build(config, link, CancellationToken::new());
    before_start(&parts);
    let PipelineParts {
        acquisition,
        mut view,
        commands,
        ..
    } = parts;

    let handle = acquisition.spawn().unwrap();
    let started = Instant::now();
    while !view.poll().ended {
        assert!(started.elapsed() < TEST_DEADLINE, "pipeline did not end");
        std::thread::sleep(Duration::from_millis(1));
    }
    drop(commands);
    (handle.join().unwrap(), view)
}

fn timestamps(view: &mut TelemetryView) -> Vec<f64> {
    view.current_view().iter().map(Sample::timestamp).collect()
}

// ============================================================================
// End-to-end
// ============================================================================

#[test]
fn two_lines_become_two_samples() {
    let link = ReplayLink::from_text(
        "accelX:0.10\taccelY:0.20\taccelZ:0.98\naccelX:0.12\taccelY:0.19\taccelZ:0.99\n",
    );
    let (report, mut view) = run_to_end(&test_config(), link, |_| {});

    assert_eq!(report.stats.samples, 2);
    assert_eq!(report.stats.malformed, 0);

    let samples = view.current_view().to_vec();
    assert_eq!(samples.len(), 2);
    assert_eq!((samples[0].accel_x(), samples[0].accel_y(), samples[0].accel_z()), (0.10, 0.20, 0.98));
    assert_eq!((samples[1].accel_x(), samples[1].accel_y(), samples[1].accel_z()), (0.12, 0.19, 0.99));
    for s in &samples {
        assert_eq!((s.gyro_x(), s.gyro_y(), s.gyro_z()), (0.0, 0.0, 0.0));
    }
    assert_eq!(samples[0].timestamp(), 0.0);
    assert!(samples[0].timestamp() <= samples[1].timestamp());
}

#[test]
fn diagnostic_prefix_and_noise_are_tolerated() {
    let link = ReplayLink::from_text(
        "boot v1.2\n\nСирі дані: accelX:1.00\tgyroZ:-3.50\naccelX:1.0\taccelY:NaN\naccelX:2.0\taccelY:x\naccelX:3.00\n",
    );
    let (report, mut view) = run_to_end(&test_config(), link, |_| {});

    assert_eq!(report.stats.lines, 6);
    assert_eq!(report.stats.empty, 1);
    assert_eq!(report.stats.malformed, 3);
    assert_eq!(report.stats.samples, 2);

    let samples = view.current_view().to_vec();
    assert_eq!(samples[0].accel_x(), 1.0);
    assert_eq!(samples[0].gyro_z(), -3.5);
    assert_eq!(samples[1].accel_x(), 3.0);
}

#[test]
fn smoothing_averages_last_window() {
    let text: String = (1..=15).map(|v| format!("accelX:{v}\n")).collect();
    let mut config = test_config();
    config.smoothing.window = 10;
    config.assembly.timestamp = TimestampPolicy::Counter;
    let (_, view) = run_to_end(&config, ReplayLink::from_text(&text), |_| {});

    let latest = view.latest().copied().unwrap();
    assert!((latest.accel_x() - 10.5).abs() < 1e-9);
    assert_eq!(latest.timestamp(), 14.0);
}

// ============================================================================
// Disconnect
// ============================================================================

#[test]
fn disconnect_ends_session_and_freezes_view() {
    let link = ReplayLink::new([
        ReplayEvent::line("accelX:1.0"),
        ReplayEvent::Timeout,
        ReplayEvent::line("accelX:2.0"),
        ReplayEvent::Disconnect,
        ReplayEvent::line("accelX:3.0"),
    ]);
    let (report, mut view) = run_to_end(&test_config(), link, |_| {});

    assert!(matches!(report.end, SessionEnd::Disconnected(_)));
    assert_eq!(report.stats.timeouts, 1);
    assert!(view.is_ended());

    // Frozen on the last contents
    let before = timestamps(&mut view);
    assert_eq!(before.len(), 2);
    assert!(view.poll().ended);
    assert_eq!(timestamps(&mut view), before);
    assert_eq!(view.latest().map(Sample::accel_x), Some(2.0));
}

#[test]
fn cancellation_stops_a_streaming_device() {
    let config = test_config();
    let link = SimulatedLink::new(LinkMode::FreeRunning, Duration::from_millis(2), Some(5));
    let cancel_token = CancellationToken::new();
    let PipelineParts { acquisition, mut view, .. } =
        pipeline::build(&config, link, cancel_token.clone());
    let handle = acquisition.spawn().unwrap();

    let started = Instant::now();
    while view.received() < 5 {
        assert!(started.elapsed() < TEST_DEADLINE, "no samples from simulated device");
        view.poll();
        std::thread::sleep(Duration::from_millis(1));
    }
    cancel_token.cancel();
    let report = handle.join().unwrap();
    assert_eq!(report.end, SessionEnd::Cancelled);

    while !view.poll().ended {
        assert!(started.elapsed() < TEST_DEADLINE, "view never saw end of stream");
    }
}

// ============================================================================
// Polling and commands
// ============================================================================

#[test]
fn polling_mode_requests_every_frame() {
    let mut config = test_config();
    config.link.mode = LinkMode::Polling;
    let link = SimulatedLink::new(LinkMode::Polling, Duration::ZERO, Some(11)).with_frame_limit(5);
    let (report, view) = run_to_end(&config, link, |_| {});

    assert_eq!(report.stats.samples, 5);
    assert!(report.stats.commands_written >= 5);
    assert_eq!(view.len(), 5);
}

#[test]
fn toggle_command_reaches_device() {
    let mut config = test_config();
    config.link.mode = LinkMode::Polling;
    let link = SimulatedLink::new(LinkMode::Polling, Duration::ZERO, Some(3)).with_frame_limit(3);
    let (report, mut view) = run_to_end(&config, link, |parts| {
        assert!(parts.commands.toggle_mode().unwrap());
    });

    assert_eq!(report.stats.samples, 3);
    for s in view.current_view() {
        assert!(s.gyro_z() > 20.0, "yaw rate missing: {s}");
    }
}

// ============================================================================
// Timestamps and retention
// ============================================================================

#[test]
fn timestamps_are_monotonic() {
    let link = SimulatedLink::new(LinkMode::FreeRunning, Duration::ZERO, Some(8))
        .with_frame_limit(200)
        .with_malformed_rate(0.1);
    let mut config = test_config();
    config.retention = Retention::ByCount(1_000);
    let (report, mut view) = run_to_end(&config, link, |_| {});

    let ts = timestamps(&mut view);
    assert_eq!(ts.len() as u64, report.stats.samples);
    assert_eq!(ts[0], 0.0);
    assert!(ts.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn count_retention_keeps_latest() {
    let text: String = (0..5).map(|v| format!("accelX:{v}\n")).collect();
    let mut config = test_config();
    config.retention = Retention::ByCount(3);
    let (_, mut view) = run_to_end(&config, ReplayLink::from_text(&text), |_| {});

    let xs: Vec<f64> = view.current_view().iter().map(Sample::accel_x).collect();
    assert_eq!(xs, vec![2.0, 3.0, 4.0]);
    assert_eq!(view.window().evicted(), 2);
}

// ============================================================================
// Config-driven pipeline
// ============================================================================

#[test]
fn config_file_drives_the_pipeline() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"
[link]
read_timeout_ms = 20

[frame]
diagnostic_prefix = "RAW:"

[assembly]
timestamp = "counter"

[assembly.scale]
accel_x = 5.0

[smoothing]
window = 0

[retention]
by_count = 2
"#,
    )
    .unwrap();
    let config = TelemetryConfig::load_from_file(file.path()).unwrap();

    let link = ReplayLink::from_text("RAW: accelX:0.1\nRAW: accelX:0.2\nRAW: accelX:0.3\n");
    let (report, mut view) = run_to_end(&config, link, |_| {});

    assert_eq!(report.stats.samples, 3);
    let samples = view.current_view().to_vec();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].timestamp(), 1.0);
    assert_eq!(samples[1].timestamp(), 2.0);
    assert!((samples[1].accel_x() - 1.5).abs() < 1e-9);
}
