//! IMU Frame Parser
//!
//! Parses one line of device output into a [`RawFrame`]. Frames are ASCII
//! text, one per line:
//!
//! ```text
//! [optional diagnostic prefix]accelX:0.10\taccelY:0.20\taccelZ:0.98\tgyroX:...\n
//! ```
//!
//! - Fields are separated by TAB, key and value by the first `:`
//! - Whitespace around keys and values is insignificant
//! - A field without `:` is skipped
//! - A field whose value is not a finite number rejects the whole line
//!
//! Parsing is total-or-nothing: a line either yields a complete frame or a
//! [`ParseError`], never a partial frame.

use crate::types::RawFrame;
use thiserror::Error;

/// Separator between `key:value` fields.
pub const FIELD_DELIMITER: char = '\t';

/// Separator between key and value inside a field.
pub const KEY_VALUE_DELIMITER: char = ':';

/// Prefix the receiver firmware's debug echo puts in front of frames.
pub const DEFAULT_DIAGNOSTIC_PREFIX: &str = "Сирі дані:";

/// Longest line accepted, in bytes. Six channels at full precision fit in
/// well under half of this.
pub const DEFAULT_MAX_LINE_BYTES: usize = 512;

/// Reasons a line is discarded
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Line was empty (or only whitespace / the diagnostic prefix).
    #[error("empty line")]
    Empty,

    /// Line had text but no `key:value` field.
    #[error("no key:value fields in line")]
    NoFields,

    #[error("bad value for {key}: {value:?}")]
    BadValue { key: String, value: String },

    #[error("non-finite value for {key}: {value:?}")]
    NonFinite { key: String, value: String },

    #[error("line is not valid UTF-8")]
    Encoding,

    #[error("line too long ({len} bytes, max {max})")]
    TooLong { len: usize, max: usize },
}

impl ParseError {
    /// Empty lines are a normal poll artefact and are skipped silently.
    pub fn is_silent(&self) -> bool {
        matches!(self, ParseError::Empty)
    }
}

/// Stateless line → frame parser.
#[derive(Debug, Clone)]
pub struct FrameParser {
    diagnostic_prefix: Option<String>,
    max_line_bytes: usize,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            diagnostic_prefix: Some(DEFAULT_DIAGNOSTIC_PREFIX.to_string()),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    /// Replace the diagnostic prefix. `None` disables prefix stripping.
    pub fn with_diagnostic_prefix(mut self, prefix: Option<String>) -> Self {
        self.diagnostic_prefix = prefix.filter(|p| !p.is_empty());
        self
    }

    pub fn with_max_line_bytes(mut self, max: usize) -> Self {
        self.max_line_bytes = max;
        self
    }

    pub fn max_line_bytes(&self) -> usize {
        self.max_line_bytes
    }

    /// Decode raw bytes from the link, then parse.
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<RawFrame, ParseError> {
        self.check_len(bytes.len())?;
        let line = std::str::from_utf8(bytes).map_err(|_| ParseError::Encoding)?;
        self.parse(line)
    }

    /// Parse one line of text.
    pub fn parse(&self, line: &str) -> Result<RawFrame, ParseError> {
        self.check_len(line.len())?;

        let mut text = line.trim();
        if let Some(prefix) = &self.diagnostic_prefix {
            if let Some(rest) = text.strip_prefix(prefix.as_str()) {
                text = rest.trim();
            }
        }
        if text.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut frame = RawFrame::new();
        for field in text.split(FIELD_DELIMITER) {
            let Some((key, value)) = field.split_once(KEY_VALUE_DELIMITER) else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            let parsed: f64 = value.parse().map_err(|_| ParseError::BadValue {
                key: key.to_string(),
                value: value.to_string(),
            })?;
            if !parsed.is_finite() {
                return Err(ParseError::NonFinite {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
            frame.push(key, parsed);
        }

        if frame.is_empty() {
            return Err(ParseError::NoFields);
        }
        Ok(frame)
    }

    fn check_len(&self, len: usize) -> Result<(), ParseError> {
        if len > self.max_line_bytes {
            return Err(ParseError::TooLong {
                len,
                max: self.max_line_bytes,
            });
        }
        Ok(())
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a frame line the way the device does (for tests and simulation).
pub fn format_frame(fields: &[(&str, f64)]) -> String {
    let mut line = fields
        .iter()
        .map(|(key, value)| format!("{key}{KEY_VALUE_DELIMITER}{value:.2}"))
        .collect::<Vec<_>>()
        .join(&FIELD_DELIMITER.to_string());
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Axis;

    #[test]
    fn test_full_frame() {
        let parser = FrameParser::new();
        let frame = parser
            .parse("accelX:0.10\taccelY:0.20\taccelZ:0.98\tgyroX:1.5\tgyroY:-2\tgyroZ:0\n")
            .unwrap();
        assert_eq!(frame.channels(), [0.10, 0.20, 0.98, 1.5, -2.0, 0.0]);
    }

    #[test]
    fn test_default_fill() {
        let frame = FrameParser::new().parse("accelX:1.0").unwrap();
        assert_eq!(frame.channel(Axis::AccelX), 1.0);
        for axis in &Axis::ALL[1..] {
            assert_eq!(frame.channel(*axis), 0.0);
        }
    }

    #[test]
    fn test_bad_value_rejects_whole_line() {
        let err = FrameParser::new()
            .parse("accelX:0.1\taccelY:abc\taccelZ:0.9")
            .unwrap_err();
        assert_eq!(
            err,
            ParseError::BadValue {
                key: "accelY".to_string(),
                value: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_non_finite_rejected() {
        let parser = FrameParser::new();
        assert!(matches!(parser.parse("accelX:NaN"), Err(ParseError::NonFinite { .. })));
        assert!(matches!(parser.parse("gyroZ:inf"), Err(ParseError::NonFinite { .. })));
    }

    #[test]
    fn test_field_without_colon_skipped() {
        let frame = FrameParser::new().parse("hello\taccelZ:0.98\t").unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.channel(Axis::AccelZ), 0.98);
    }

    #[test]
    fn test_whitespace_insignificant() {
        let frame = FrameParser::new().parse("  accelX : 0.5 \t gyroX:  -1.25  ").unwrap();
        assert_eq!(frame.channel(Axis::AccelX), 0.5);
        assert_eq!(frame.channel(Axis::GyroX), -1.25);
    }

    #[test]
    fn test_value_split_on_first_colon() {
        // "1:2" is not a number, so the line is malformed
        let err = FrameParser::new().parse("accelX:1:2").unwrap_err();
        assert!(matches!(err, ParseError::BadValue { .. }));
    }

    #[test]
    fn test_empty_lines_are_silent() {
        let parser = FrameParser::new();
        for line in ["", "   ", "\r\n", DEFAULT_DIAGNOSTIC_PREFIX] {
            let err = parser.parse(line).unwrap_err();
            assert_eq!(err, ParseError::Empty, "line {line:?}");
            assert!(err.is_silent());
        }
    }

    #[test]
    fn test_banner_line_has_no_fields() {
        let err = FrameParser::new().parse("ESP-NOW receiver started").unwrap_err();
        assert_eq!(err, ParseError::NoFields);
        assert!(!err.is_silent());
    }

    #[test]
    fn test_diagnostic_prefix_stripped() {
        let line = format!("{DEFAULT_DIAGNOSTIC_PREFIX} accelX:0.3\taccelY:0.4");
        let frame = FrameParser::new().parse(&line).unwrap();
        assert_eq!(frame.channel(Axis::AccelX), 0.3);

        let custom = FrameParser::new().with_diagnostic_prefix(Some("RAW>".to_string()));
        let frame = custom.parse("RAW>gyroY:2.0").unwrap();
        assert_eq!(frame.channel(Axis::GyroY), 2.0);
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let err = FrameParser::new().parse_bytes(&[0x61, 0xff, 0xfe, b'\n']).unwrap_err();
        assert_eq!(err, ParseError::Encoding);
    }

    #[test]
    fn test_too_long_rejected() {
        let parser = FrameParser::new().with_max_line_bytes(16);
        let err = parser.parse("accelX:0.10\taccelY:0.20").unwrap_err();
        assert_eq!(err, ParseError::TooLong { len: 23, max: 16 });
    }

    #[test]
    fn test_format_frame_parses_back() {
        let line = format_frame(&[("accelX", 0.1), ("gyroZ", -3.0)]);
        assert_eq!(line, "accelX:0.10\tgyroZ:-3.00\n");
        let frame = FrameParser::new().parse(&line).unwrap();
        assert_eq!(frame.channel(Axis::GyroZ), -3.0);
    }
}
