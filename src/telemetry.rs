// Key/value telemetry collected once per tick
// The drivetrain records into a frame; the runtime decides where the frame goes.

use serde::Serialize;

/// A single published value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    Number(f64),
    Text(String),
}

/// All telemetry produced during one control tick, in recording order
#[derive(Debug, Clone, Default)]
pub struct TelemetryFrame {
    entries: Vec<(String, TelemetryValue)>,
}

impl TelemetryFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_number(&mut self, key: impl Into<String>, value: f64) {
        self.entries.push((key.into(), TelemetryValue::Number(value)));
    }

    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .push((key.into(), TelemetryValue::Text(value.into())));
    }

    /// Latest value recorded under `key`
    pub fn get(&self, key: &str) -> Option<&TelemetryValue> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(TelemetryValue::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take every entry, leaving the frame empty for the next tick
    pub fn drain(&mut self) -> impl Iterator<Item = (String, TelemetryValue)> + '_ {
        self.entries.drain(..)
    }
}
