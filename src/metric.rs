//! Metric assembly: label derivation, name normalization, value coercion
//! and descriptor caching.
//!
//! The rules here are lexical on purpose. Metric names are the accumulated
//! tree path with an exposition-safe character substitution, the
//! counter/gauge split keys off the literal substring `counters`, and label
//! keys are validated against the Prometheus identifier pattern after a
//! small substitution pass. Nothing consults a schema.

use std::collections::HashMap;
use std::sync::Arc;

use crate::telemetry::TelemetryValue;

/// A derived label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub key: String,
    pub value: String,
}

impl Label {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Counter/gauge classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    /// Classify by name: anything under a `counters` subtree is monotonic.
    pub fn from_path(path: &str) -> Self {
        if path.contains("counters") {
            MetricKind::Counter
        } else {
            MetricKind::Gauge
        }
    }

    /// TYPE comment string for the exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

/// The cached half of a metric: normalized name, kind, ordered label keys.
/// Computed once per tree node and memoized there; label values still vary
/// per walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub name: String,
    pub kind: MetricKind,
    pub label_keys: Vec<String>,
}

impl Descriptor {
    pub fn new(path: &str, labels: &[Label]) -> Self {
        Self {
            name: normalize_metric_name(path),
            kind: MetricKind::from_path(path),
            label_keys: labels.iter().map(|l| l.key.clone()).collect(),
        }
    }
}

/// One assembled sample, produced per scrape.
#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub descriptor: Arc<Descriptor>,
    pub label_values: Vec<String>,
    pub value: f64,
}

/// String-literal → numeric mapping, keyed by the original (unnormalized)
/// path with a leading `/`.
pub type StringValueMapping = HashMap<String, HashMap<String, i64>>;

/// Coerces raw tree values into floating-point samples.
pub struct MetricAssembler {
    string_value_mapping: Arc<StringValueMapping>,
}

impl MetricAssembler {
    pub fn new(string_value_mapping: Arc<StringValueMapping>) -> Self {
        Self {
            string_value_mapping,
        }
    }

    /// Convert a value into a sample scalar.
    ///
    /// Numeric variants pass through, booleans map to 1/0, strings go
    /// through the per-path mapping table. A string with no table entry
    /// yields `None` and the sample is dropped; this is deliberately not
    /// logged per occurrence.
    pub fn coerce(&self, path: &str, value: &TelemetryValue) -> Option<f64> {
        match value {
            TelemetryValue::Double(v) => Some(*v),
            TelemetryValue::Int64(v) => Some(*v as f64),
            TelemetryValue::Uint64(v) => Some(*v as f64),
            TelemetryValue::Sint64(v) => Some(*v as f64),
            TelemetryValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            TelemetryValue::String(s) => {
                let table = self.string_value_mapping.get(&format!("/{}", path))?;
                table.get(s).map(|v| *v as f64)
            }
        }
    }
}

/// Turn an accumulated tree path into an exposition-safe metric name:
/// `/` and `-` become `_`, apostrophes are dropped.
pub fn normalize_metric_name(path: &str) -> String {
    let mut name = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '/' | '-' => name.push('_'),
            '\'' => {}
            _ => name.push(c),
        }
    }
    name
}

/// Parse a node's raw bracket predicate into labels, qualifying each key
/// with the owning segment's name (`interface[name=..]` → `interface_name`).
///
/// Pairs are comma-separated `key=value`. A pair whose key is not a valid
/// label identifier after substitution is dropped silently; the rest of the
/// node is unaffected.
pub fn parse_identifier_labels(segment: &str, raw: &str) -> Vec<Label> {
    let mut labels = Vec::new();

    for pair in raw.split(',') {
        let Some((key, value)) = split_pair(pair) else {
            continue;
        };

        let key = sanitize_label_key(key);
        if !is_valid_label_key(&key) {
            continue;
        }

        let qualified = if segment.is_empty() {
            key
        } else {
            format!("{}_{}", sanitize_label_key(segment), key)
        };

        labels.push(Label::new(qualified, strip_quotes(value)));
    }

    labels
}

/// Parse a description string into labels, all-or-nothing.
///
/// The entire string must be comma-separated `key=value` groups with valid
/// keys; otherwise the description contributes zero labels (it stays
/// available verbatim for the debug dump). Keys are not qualified.
pub fn parse_description_labels(text: &str) -> Vec<Label> {
    let mut labels = Vec::new();

    for pair in text.split(',') {
        let Some((key, value)) = split_pair(pair) else {
            return Vec::new();
        };

        let key = sanitize_label_key(key);
        if !is_valid_label_key(&key) {
            return Vec::new();
        }

        labels.push(Label::new(key, strip_quotes(value)));
    }

    labels
}

/// Split a `key=value` pair; exactly one `=` is required.
fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let mut parts = pair.splitn(3, '=');
    let key = parts.next()?;
    let value = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((key, value))
}

/// `-` becomes `_`, apostrophes are dropped.
fn sanitize_label_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            '-' => out.push('_'),
            '\'' => {}
            _ => out.push(c),
        }
    }
    out
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_valid_label_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Strip enclosing quote characters from a predicate value.
fn strip_quotes(value: &str) -> String {
    value
        .trim_matches(|c| c == '\'' || c == '"')
        .to_string()
}
