//! Serial link to the sensor
//!
//! A [`Link`] owns one open byte connection and offers a line-oriented,
//! timeout-bounded read plus a best-effort write. Timeouts are not errors:
//! they come back as [`LineRead::Timeout`] so the acquisition loop can
//! re-poll, drain commands and notice a close request.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default serial line speed.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default per-line read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Size of one `read()` from the port.
const READ_CHUNK_BYTES: usize = 256;

/// Link errors
#[derive(Debug, Error)]
pub enum LinkError {
    /// Requested port is not among the enumerated serial ports.
    #[error("port {port} unavailable (available: {})", format_ports(.available))]
    PortUnavailable { port: String, available: Vec<String> },

    #[error("port {port} busy: {reason}")]
    PortBusy { port: String, reason: String },

    #[error("failed to open {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    /// Connection dropped mid-session.
    #[error("link disconnected: {0}")]
    Disconnected(String),
}

impl LinkError {
    /// Startup failures are fatal; `Disconnected` only ends a session.
    pub fn is_startup(&self) -> bool {
        !matches!(self, LinkError::Disconnected(_))
    }
}

fn format_ports(ports: &[String]) -> String {
    if ports.is_empty() {
        "none".to_string()
    } else {
        ports.join(", ")
    }
}

/// Result of one line read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// One line without its terminator. Not yet decoded as text.
    Line(Vec<u8>),
    /// No complete line before the deadline.
    Timeout,
}

/// Byte connection carrying newline-terminated frames.
///
/// Implementations are owned by the acquisition thread; they need `Send`
/// but never `Sync`.
pub trait Link: Send {
    /// Block up to `timeout` for the next complete line.
    fn read_line(&mut self, timeout: Duration) -> Result<LineRead, LinkError>;

    /// Write bytes to the device. Only fails when the link is gone.
    fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Release the connection. Further reads report `Disconnected`.
    fn close(&mut self);

    /// Human-readable name for logging (port path, "replay", ...).
    fn name(&self) -> &str;
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn read_line(&mut self, timeout: Duration) -> Result<LineRead, LinkError> {
        (**self).read_line(timeout)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        (**self).write(bytes)
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// ============================================================================
// Line buffering
// ============================================================================

/// Accumulates bytes and splits them into lines.
///
/// The pending buffer is bounded: once it holds more than `max_line_bytes`
/// without a newline, the bytes are released as one (over-long) line so the
/// parser can reject it. The rest of that line, up to and including its
/// newline, is then dropped as it arrives.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_line_bytes: usize,
    discarding: bool,
}

impl LineBuffer {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            pending: Vec::with_capacity(max_line_bytes.min(4096)),
            max_line_bytes: max_line_bytes.max(1),
            discarding: false,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete line, without `\n` or a trailing `\r`.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        if self.discarding {
            match self.pending.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.pending.drain(..=pos);
                    self.discarding = false;
                }
                None => {
                    self.pending.clear();
                    return None;
                }
            }
        }

        if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Some(line);
        }
        if self.pending.len() > self.max_line_bytes {
            self.discarding = true;
            return Some(std::mem::take(&mut self.pending));
        }
        None
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// True while the tail of an over-long line is being dropped.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }
}

// ============================================================================
// Serial port link
// ============================================================================

/// Names of the serial ports the OS currently reports.
pub fn available_ports() -> Result<Vec<String>, LinkError> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .map_err(|e| LinkError::OpenFailed {
            port: String::new(),
            reason: format!("cannot enumerate serial ports: {e}"),
        })
}

/// Byte stream whose read deadline can be changed between reads.
pub trait TimedPort: Read + Write + Send {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl TimedPort for Box<dyn serialport::SerialPort> {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_timeout(timeout).map_err(io::Error::from)
    }
}

/// Link over a serial port.
pub struct SerialLink<P = Box<dyn serialport::SerialPort>> {
    port_name: String,
    port: Option<P>,
    buffer: LineBuffer,
    current_timeout: Duration,
}

impl SerialLink {
    /// Open `port` at `baud`.
    ///
    /// Fails fast with [`LinkError::PortUnavailable`] when the port is not
    /// enumerated. The check is advisory: the port can still vanish before
    /// the open call.
    pub fn open(port: &str, baud: u32, max_line_bytes: usize) -> Result<Self, LinkError> {
        let available = available_ports()?;
        if !available.iter().any(|p| p == port) {
            return Err(LinkError::PortUnavailable {
                port: port.to_string(),
                available,
            });
        }

        tracing::info!(port = %port, baud = baud, "Opening serial link");

        let handle = serialport::new(port, baud)
            .timeout(DEFAULT_READ_TIMEOUT)
            .open()
            .map_err(|e| classify_open_error(port, e))?;

        tracing::info!(port = %port, "Serial link established");
        Ok(Self::from_port(port, handle, max_line_bytes))
    }
}

impl<P: TimedPort> SerialLink<P> {
    /// Wrap an already open port. Its read timeout is reset on first read.
    pub fn from_port(name: &str, port: P, max_line_bytes: usize) -> Self {
        Self {
            port_name: name.to_string(),
            port: Some(port),
            buffer: LineBuffer::new(max_line_bytes),
            current_timeout: Duration::MAX,
        }
    }

    fn port_mut(&mut self) -> Result<&mut P, LinkError> {
        self.port
            .as_mut()
            .ok_or_else(|| LinkError::Disconnected("link closed".to_string()))
    }
}

fn classify_open_error(port: &str, e: serialport::Error) -> LinkError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => LinkError::PortUnavailable {
            port: port.to_string(),
            available: available_ports().unwrap_or_default(),
        },
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied)
        | serialport::ErrorKind::Io(io::ErrorKind::AddrInUse)
        | serialport::ErrorKind::Io(io::ErrorKind::WouldBlock) => LinkError::PortBusy {
            port: port.to_string(),
            reason: e.to_string(),
        },
        _ => LinkError::OpenFailed {
            port: port.to_string(),
            reason: e.to_string(),
        },
    }
}

impl<P: TimedPort> Link for SerialLink<P> {
    fn read_line(&mut self, timeout: Duration) -> Result<LineRead, LinkError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.buffer.next_line() {
                return Ok(LineRead::Line(line));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(LineRead::Timeout);
            }
            if remaining != self.current_timeout {
                self.port_mut()?
                    .set_read_timeout(remaining)
                    .map_err(|e| LinkError::Disconnected(e.to_string()))?;
                self.current_timeout = remaining;
            }

            let mut chunk = [0u8; READ_CHUNK_BYTES];
            let read = self.port_mut()?.read(&mut chunk);
            match read {
                Ok(0) => {
                    self.close();
                    return Err(LinkError::Disconnected("end of stream".to_string()));
                }
                Ok(n) => self.buffer.extend(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(LineRead::Timeout),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.close();
                    return Err(LinkError::Disconnected(e.to_string()));
                }
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let port = self.port_mut()?;
        port.write_all(bytes)
            .and_then(|()| port.flush())
            .map_err(|e| LinkError::Disconnected(e.to_string()))
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::info!(port = %self.port_name, "Serial link closed");
        }
        self.buffer.clear();
    }

    fn name(&self) -> &str {
        &self.port_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{FrameParser, ParseError};
    use std::collections::VecDeque;

    /// Port that replays scripted `read()` outcomes, then times out.
    #[derive(Default)]
    struct ScriptedPort {
        reads: VecDeque<io::Result<Vec<u8>>>,
        written: Vec<u8>,
        timeouts: Vec<Duration>,
    }

    impl ScriptedPort {
        fn new(reads: impl IntoIterator<Item = io::Result<Vec<u8>>>) -> Self {
            Self {
                reads: reads.into_iter().collect(),
                ..Self::default()
            }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(io::ErrorKind::TimedOut.into()),
            }
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl TimedPort for ScriptedPort {
        fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
            self.timeouts.push(timeout);
            Ok(())
        }
    }

    fn chunk(bytes: &[u8]) -> io::Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    const READ_TIMEOUT: Duration = Duration::from_millis(50);

    #[test]
    fn test_line_buffer_splits_lines() {
        let mut buffer = LineBuffer::new(64);
        buffer.extend(b"accelX:1\r\naccelY:");
        assert_eq!(buffer.next_line(), Some(b"accelX:1".to_vec()));
        assert_eq!(buffer.next_line(), None);
        buffer.extend(b"2\n\n");
        assert_eq!(buffer.next_line(), Some(b"accelY:2".to_vec()));
        assert_eq!(buffer.next_line(), Some(Vec::new()));
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn test_line_buffer_bounded() {
        let mut buffer = LineBuffer::new(8);
        buffer.extend(b"0123456789abc");
        let overflow = buffer.next_line().unwrap();
        assert_eq!(overflow.len(), 13);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn test_over_long_line_tail_is_dropped() {
        let parser = FrameParser::new().with_max_line_bytes(16);
        let mut buffer = LineBuffer::new(16);

        buffer.extend(b"accelX:9.0\tgyroX:9.0");
        let head = buffer.next_line().unwrap();
        assert_eq!(parser.parse_bytes(&head), Err(ParseError::TooLong { len: 20, max: 16 }));
        assert!(buffer.is_discarding());

        buffer.extend(b"\taccelZ:4.0\naccelY:1.0\n");
        let next = buffer.next_line().unwrap();
        assert_eq!(next, b"accelY:1.0".to_vec());
        assert!(!buffer.is_discarding());
        assert_eq!(buffer.next_line(), None);
    }

    #[test]
    fn test_over_long_line_spanning_many_chunks() {
        let mut buffer = LineBuffer::new(8);
        buffer.extend(b"0123456789");
        assert_eq!(buffer.next_line().map(|l| l.len()), Some(10));
        buffer.extend(b"accelX:1.0");
        assert_eq!(buffer.next_line(), None);
        buffer.extend(b"\taccelY:2.0");
        assert_eq!(buffer.next_line(), None);
        buffer.extend(b"\naccelZ:3\n");
        assert_eq!(buffer.next_line(), Some(b"accelZ:3".to_vec()));
    }

    // ========================================================================
    // Serial read loop
    // ========================================================================

    #[test]
    fn test_serial_joins_lines_across_chunks() {
        let port = ScriptedPort::new([
            chunk(b"accelX:1.0\tacc"),
            chunk(b"elY:2.0\r\nacce"),
            Err(io::ErrorKind::Interrupted.into()),
            chunk(b"lZ:3\n"),
        ]);
        let mut link = SerialLink::from_port("scripted", port, 64);

        assert_eq!(
            link.read_line(READ_TIMEOUT).unwrap(),
            LineRead::Line(b"accelX:1.0\taccelY:2.0".to_vec())
        );
        assert_eq!(link.read_line(READ_TIMEOUT).unwrap(), LineRead::Line(b"accelZ:3".to_vec()));
    }

    #[test]
    fn test_serial_timeout_is_not_an_error() {
        let port = ScriptedPort::new([Err(io::ErrorKind::TimedOut.into()), chunk(b"gyroX:1\n")]);
        let mut link = SerialLink::from_port("scripted", port, 64);

        assert_eq!(link.read_line(READ_TIMEOUT).unwrap(), LineRead::Timeout);
        assert_eq!(link.read_line(READ_TIMEOUT).unwrap(), LineRead::Line(b"gyroX:1".to_vec()));

        let port = link.port.as_ref().unwrap();
        assert!(!port.timeouts.is_empty());
        assert!(port.timeouts.iter().all(|t| *t <= READ_TIMEOUT));
    }

    #[test]
    fn test_serial_end_of_stream_disconnects() {
        let port = ScriptedPort::new([chunk(b"accelX:1\n"), chunk(b"")]);
        let mut link = SerialLink::from_port("scripted", port, 64);

        assert!(matches!(link.read_line(READ_TIMEOUT), Ok(LineRead::Line(_))));
        assert!(matches!(link.read_line(READ_TIMEOUT), Err(LinkError::Disconnected(_))));
        assert!(link.port.is_none());
    }

    #[test]
    fn test_serial_hard_error_closes_link() {
        let port = ScriptedPort::new([
            chunk(b"accelX:1"),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled")),
        ]);
        let mut link = SerialLink::from_port("scripted", port, 64);

        let err = link.read_line(READ_TIMEOUT).unwrap_err();
        assert_eq!(err.to_string(), "link disconnected: cable pulled");
        assert!(link.port.is_none());
        assert_eq!(link.buffer.pending_len(), 0);
        assert!(matches!(link.read_line(READ_TIMEOUT), Err(LinkError::Disconnected(_))));
        assert!(link.write(b".").is_err());
    }

    #[test]
    fn test_serial_drops_tail_of_over_long_line() {
        let port = ScriptedPort::new([
            chunk(b"accelX:9.0\tgyroX:9.0"),
            chunk(b"\taccelZ:4.0\naccelY:1.0\n"),
        ]);
        let mut link = SerialLink::from_port("scripted", port, 16);
        let parser = FrameParser::new().with_max_line_bytes(16);

        let LineRead::Line(head) = link.read_line(READ_TIMEOUT).unwrap() else {
            panic!("expected the over-long line");
        };
        assert!(matches!(parser.parse_bytes(&head), Err(ParseError::TooLong { .. })));

        let LineRead::Line(next) = link.read_line(READ_TIMEOUT).unwrap() else {
            panic!("expected a line");
        };
        let frame = parser.parse_bytes(&next).unwrap();
        assert_eq!(frame.channel(crate::types::Axis::AccelY), 1.0);
        assert_eq!(frame.channel(crate::types::Axis::AccelZ), 0.0);
    }

    #[test]
    fn test_serial_write_reaches_port() {
        let mut link = SerialLink::from_port("scripted", ScriptedPort::default(), 64);
        link.write(b"z.").unwrap();
        assert_eq!(link.port.as_ref().unwrap().written, b"z.".to_vec());
        assert_eq!(link.name(), "scripted");
    }

    #[test]
    fn test_unavailable_port_lists_alternatives() {
        let err = LinkError::PortUnavailable {
            port: "COM3".to_string(),
            available: vec!["COM1".to_string(), "COM4".to_string()],
        };
        assert_eq!(err.to_string(), "port COM3 unavailable (available: COM1, COM4)");
        assert!(err.is_startup());
        assert!(!LinkError::Disconnected("gone".to_string()).is_startup());
    }

    #[test]
    fn test_open_missing_port_fails_fast() {
        let err = SerialLink::open("/dev/does-not-exist-imu", DEFAULT_BAUD_RATE, 512)
            .err()
            .unwrap();
        assert!(err.is_startup());
    }
}
