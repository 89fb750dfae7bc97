//! Simulated IMU device
//!
//! Generates frames in the device's wire format for demos and soak tests:
//! a slow roll/pitch rocking motion on top of gravity, with Gaussian noise
//! on every channel. Honours both link modes:
//!
//! - free-running: one frame per `interval`
//! - polling: one frame per request byte (`.`) written by the host
//!
//! The toggle byte (`z`) switches a constant yaw rate on and off.

use super::frame_parser::format_frame;
use super::link::{LineRead, Link, LinkError};
use super::LinkMode;
use crate::types::{Axis, Command};
use rand::prelude::*;
use rand_distr::StandardNormal;
use std::f64::consts::TAU;
use std::time::{Duration, Instant};

/// Standard gravity in the device's units (g).
const GRAVITY_G: f64 = 1.0;
/// Peak tilt of the rocking motion (radians).
const TILT_AMPLITUDE_RAD: f64 = 0.35;
/// Rocking frequency (Hz).
const TILT_FREQUENCY_HZ: f64 = 0.2;
/// Accelerometer noise (g, 1 sigma).
const ACCEL_NOISE_G: f64 = 0.01;
/// Gyroscope noise (deg/s, 1 sigma).
const GYRO_NOISE_DPS: f64 = 0.5;
/// Yaw rate while yaw mode is on (deg/s).
const YAW_RATE_DPS: f64 = 30.0;

/// Synthetic device behind a [`Link`] interface.
pub struct SimulatedLink {
    mode: LinkMode,
    interval: Duration,
    rng: StdRng,
    malformed_rate: f64,
    frame_limit: Option<u64>,
    frames_emitted: u64,
    pending_requests: u64,
    yaw_mode: bool,
    next_emit: Option<Instant>,
    closed: bool,
}

impl SimulatedLink {
    /// New device emitting (or answering) at `interval` per frame.
    pub fn new(mode: LinkMode, interval: Duration, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            mode,
            interval,
            rng,
            malformed_rate: 0.0,
            frame_limit: None,
            frames_emitted: 0,
            pending_requests: 0,
            yaw_mode: false,
            next_emit: None,
            closed: false,
        }
    }

    /// Fraction of frames (0.0-1.0) replaced by a garbled line.
    pub fn with_malformed_rate(mut self, rate: f64) -> Self {
        self.malformed_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Disconnect after this many frames.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub fn yaw_mode(&self) -> bool {
        self.yaw_mode
    }

    fn noise(&mut self, sigma: f64) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        z * sigma
    }

    fn next_frame(&mut self) -> Vec<u8> {
        self.frames_emitted += 1;

        if self.malformed_rate > 0.0 && self.rng.gen_bool(self.malformed_rate) {
            return b"accelX:0.0\taccelY:#!?\taccelZ:".to_vec();
        }

        let t = self.frames_emitted as f64 * self.interval.as_secs_f64();
        let phase = TAU * TILT_FREQUENCY_HZ * t;
        let roll = TILT_AMPLITUDE_RAD * phase.sin();
        let pitch = TILT_AMPLITUDE_RAD * 0.5 * phase.cos();
        // Angular rate is the derivative of the tilt, in deg/s
        let roll_rate = (TILT_AMPLITUDE_RAD * TAU * TILT_FREQUENCY_HZ * phase.cos()).to_degrees();
        let pitch_rate =
            (-TILT_AMPLITUDE_RAD * 0.5 * TAU * TILT_FREQUENCY_HZ * phase.sin()).to_degrees();
        let yaw_rate = if self.yaw_mode { YAW_RATE_DPS } else { 0.0 };

        let values = [
            GRAVITY_G * roll.sin() + self.noise(ACCEL_NOISE_G),
            GRAVITY_G * pitch.sin() + self.noise(ACCEL_NOISE_G),
            GRAVITY_G * roll.cos() * pitch.cos() + self.noise(ACCEL_NOISE_G),
            roll_rate + self.noise(GYRO_NOISE_DPS),
            pitch_rate + self.noise(GYRO_NOISE_DPS),
            yaw_rate + self.noise(GYRO_NOISE_DPS),
        ];
        let fields: Vec<(&str, f64)> = Axis::ALL
            .iter()
            .map(|axis| (axis.wire_key(), values[axis.index()]))
            .collect();

        let mut line = format_frame(&fields).into_bytes();
        line.pop();
        line
    }

    fn limit_reached(&self) -> bool {
        self.frame_limit
            .is_some_and(|limit| self.frames_emitted >= limit)
    }
}

impl Link for SimulatedLink {
    fn read_line(&mut self, timeout: Duration) -> Result<LineRead, LinkError> {
        if self.closed {
            return Err(LinkError::Disconnected("link closed".to_string()));
        }
        if self.limit_reached() {
            self.closed = true;
            return Err(LinkError::Disconnected("simulated device unplugged".to_string()));
        }

        match self.mode {
            LinkMode::Polling => {
                if self.pending_requests == 0 {
                    std::thread::sleep(timeout);
                    return Ok(LineRead::Timeout);
                }
                self.pending_requests -= 1;
                std::thread::sleep(self.interval.min(timeout));
                Ok(LineRead::Line(self.next_frame()))
            }
            LinkMode::FreeRunning => {
                let now = Instant::now();
                let due = *self.next_emit.get_or_insert(now);
                if due > now {
                    let wait = due - now;
                    if wait > timeout {
                        std::thread::sleep(timeout);
                        return Ok(LineRead::Timeout);
                    }
                    std::thread::sleep(wait);
                }
                self.next_emit = Some(due + self.interval);
                Ok(LineRead::Line(self.next_frame()))
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if self.closed {
            return Err(LinkError::Disconnected("link closed".to_string()));
        }
        for &byte in bytes {
            match Command::from_byte(byte) {
                Some(Command::RequestSample) => self.pending_requests += 1,
                Some(Command::ToggleMode) => {
                    self.yaw_mode = !self.yaw_mode;
                    tracing::debug!(yaw_mode = self.yaw_mode, "Simulated device toggled mode");
                }
                None => {}
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
