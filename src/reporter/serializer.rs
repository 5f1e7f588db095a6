//! JSON batch encoding of put records.

use crate::core::MetricName;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// One emitted series value
#[derive(Debug, Serialize)]
struct PutRecord<'a> {
    metric: String,
    timestamp: i64,
    value: RecordValue,
    tags: BTreeMap<&'a str, &'a str>,
}

/// Numeric value as written on the wire: integral values without a
/// fraction, non-finite values as strings
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordValue {
    Integer(i64),
    Float(f64),
    NonFinite(f64),
}

const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

impl From<f64> for RecordValue {
    fn from(value: f64) -> Self {
        if !value.is_finite() {
            RecordValue::NonFinite(value)
        } else if value.fract() == 0.0 && value.abs() <= MAX_EXACT_INTEGER {
            RecordValue::Integer(value as i64)
        } else {
            RecordValue::Float(value)
        }
    }
}

impl Serialize for RecordValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            RecordValue::Integer(v) => serializer.serialize_i64(v),
            RecordValue::Float(v) => serializer.serialize_f64(v),
            RecordValue::NonFinite(v) if v.is_nan() => serializer.serialize_str("NaN"),
            RecordValue::NonFinite(v) if v > 0.0 => serializer.serialize_str("Infinity"),
            RecordValue::NonFinite(_) => serializer.serialize_str("-Infinity"),
        }
    }
}

/// Accumulates put records into one growable JSON array.
///
/// A record that fails to encode is rolled back and skipped; the rest of the
/// batch is unaffected.
pub struct BatchWriter<'a> {
    buffer: Vec<u8>,
    records: usize,
    skipped: usize,
    timestamp: i64,
    tags: &'a BTreeMap<String, String>,
}

impl<'a> BatchWriter<'a> {
    /// `tags` are added to every record; a metric's own tags win on conflict
    pub fn new(timestamp: i64, tags: &'a BTreeMap<String, String>) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            records: 0,
            skipped: 0,
            timestamp,
            tags,
        }
    }

    /// Appends a record for `name`; returns false if it was skipped
    pub fn push(&mut self, name: &MetricName, value: f64) -> bool {
        let mut tags: BTreeMap<&str, &str> = self
            .tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        tags.extend(name.tags().iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let record = PutRecord {
            metric: name.rendered(),
            timestamp: self.timestamp,
            value: RecordValue::from(value),
            tags,
        };
        self.push_record(name, &record)
    }

    fn push_record<T: Serialize>(&mut self, name: &MetricName, record: &T) -> bool {
        let mark = self.buffer.len();
        self.buffer.push(if self.records == 0 { b'[' } else { b',' });

        match serde_json::to_writer(&mut self.buffer, record) {
            Ok(()) => {
                self.records += 1;
                true
            },
            Err(e) => {
                self.buffer.truncate(mark);
                self.skipped += 1;
                tracing::warn!(metric = %name, "Skipping metric that failed to serialize: {}", e);
                false
            },
        }
    }

    /// Records written so far
    pub fn records(&self) -> usize {
        self.records
    }

    /// Records rolled back after an encoding failure
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Closes the array; `None` if no record was written
    pub fn finish(mut self) -> Option<Vec<u8>> {
        if self.records == 0 {
            return None;
        }
        self.buffer.push(b']');
        Some(self.buffer)
    }
}
