//! Connection statistics snapshots and aggregation
//!
//! Backends return stats as a flat list of [`StatsEntry`] values. The
//! harness does not interpret them; it timestamps each entry and appends it
//! to a [`StatsSeries`]. Scenarios pick out the fields they know about.

mod aggregate;

pub use aggregate::StatisticsAggregate;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One report entry as returned by the transport stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsEntry {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub timestamp: f64,
    /// Remaining stack-specific fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl StatsEntry {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, timestamp: f64) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            timestamp,
            fields: Map::new(),
        }
    }

    /// Builder-style field setter
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Build an entry from an arbitrary JSON object.
    ///
    /// Returns `None` when the object carries no `type`.
    pub fn from_value(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }

    /// Numeric field, accepting numbers and numeric strings
    ///
    /// Legacy stats report every value as a string.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.fields.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Entries in poll order, each paired with its capture time in ms
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSeries {
    pub stats: Vec<StatsEntry>,
    pub timestamps: Vec<i64>,
}

impl StatsSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every entry of one snapshot with the same capture time
    pub fn push_snapshot(&mut self, entries: Vec<StatsEntry>, captured_at_ms: i64) {
        for entry in entries {
            self.stats.push(entry);
            self.timestamps.push(captured_at_ms);
        }
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Entries with their capture timestamps
    pub fn iter(&self) -> impl Iterator<Item = (&StatsEntry, i64)> {
        self.stats.iter().zip(self.timestamps.iter().copied())
    }
}

/// Floor of the mean, `None` when empty
pub fn array_average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some((values.iter().sum::<f64>() / values.len() as f64).floor())
}

pub fn array_max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

pub fn array_min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}
