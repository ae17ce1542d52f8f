//! Data shapes crossing the transport boundary.

use std::fmt;

/// Typed telemetry value as delivered by a device.
///
/// This is a closed union: every consumer matches exhaustively, so there is
/// no "unknown variant" failure mode. Absence is expressed as
/// `Option::<TelemetryValue>::None` at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryValue {
    String(String),
    Int64(i64),
    Uint64(u64),
    Sint64(i64),
    Double(f64),
    Bool(bool),
}

impl fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryValue::String(s) => write!(f, "{}", s),
            TelemetryValue::Int64(v) => write!(f, "{}", v),
            TelemetryValue::Uint64(v) => write!(f, "{}", v),
            TelemetryValue::Sint64(v) => write!(f, "{}", v),
            TelemetryValue::Double(v) => write!(f, "{}", v),
            TelemetryValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// One `(key, value)` entry of a telemetry batch. A `None` value models a
/// key the device reported without any payload.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: Option<TelemetryValue>,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: Option<TelemetryValue>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// One decoded telemetry batch delivered by the transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub entries: Vec<KeyValue>,
}

impl Batch {
    pub fn new(entries: Vec<KeyValue>) -> Self {
        Self { entries }
    }
}
