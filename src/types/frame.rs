//! Raw frame: the key/value fields of one line, before sample assembly

use super::Axis;

/// Transient key/value view of one device line.
///
/// The parser validates while it splits, so values are stored as finite
/// `f64`s rather than the raw value text; a line with any unparsable or
/// non-finite value never becomes a `RawFrame`. Keys stay as received.
/// Unknown keys are kept in arrival order but ignored when a sample is
/// assembled, and the channels are not yet scaled or timestamped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    fields: Vec<(String, f64)>,
}

impl RawFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: f64) {
        self.fields.push((key.into(), value));
    }

    /// Value for `key`. When a key repeats, the last occurrence wins.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.fields
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|&(_, v)| v)
    }

    /// Channel value, `0.0` when the frame does not carry it.
    pub fn channel(&self, axis: Axis) -> f64 {
        self.get(axis.wire_key()).unwrap_or(0.0)
    }

    /// All channel values in `Axis::ALL` order with missing channels as `0.0`.
    pub fn channels(&self) -> [f64; Axis::COUNT] {
        Axis::ALL.map(|axis| self.channel(axis))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, f64)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Keys that do not name a known channel.
    pub fn unknown_keys(&self) -> impl Iterator<Item = &str> {
        self.fields()
            .map(|(k, _)| k)
            .filter(|k| Axis::from_wire_key(k).is_none())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_channels_default_to_zero() {
        let mut frame = RawFrame::new();
        frame.push("accelX", 1.0);
        assert_eq!(frame.channels(), [1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_unknown_keys_are_kept() {
        let mut frame = RawFrame::new();
        frame.push("temp", 21.5);
        frame.push("gyroZ", 3.0);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.unknown_keys().collect::<Vec<_>>(), vec!["temp"]);
        assert_eq!(frame.get("temp"), Some(21.5));
    }

    #[test]
    fn test_repeated_key_last_wins() {
        let mut frame = RawFrame::new();
        frame.push("accelY", 1.0);
        frame.push("accelY", 2.0);
        assert_eq!(frame.channel(Axis::AccelY), 2.0);
    }
}
