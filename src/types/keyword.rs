//! Typed keyword values carried by stream descriptors and statistics records

use serde::{Deserialize, Serialize};

/// Runtime value of a keyword.
///
/// Two values are only equal when both the type and the payload match; a `Long(1)`
/// never equals a `Double(1.0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum Value {
    Bool(bool),
    Char(i8),
    Octet(u8),
    Short(i16),
    UShort(u16),
    Long(i32),
    ULong(u32),
    LongLong(i64),
    ULongLong(u64),
    Float(f32),
    Double(f64),
    String(String),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Char(v) => Some(v.into()),
            Value::Octet(v) => Some(v.into()),
            Value::Short(v) => Some(v.into()),
            Value::UShort(v) => Some(v.into()),
            Value::Long(v) => Some(v.into()),
            Value::ULong(v) => Some(v.into()),
            Value::LongLong(v) => Some(v as f64),
            Value::ULongLong(v) => Some(v as f64),
            Value::Float(v) => Some(v.into()),
            Value::Double(v) => Some(v),
            Value::Bool(_) | Value::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Long(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::ULong(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::LongLong(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Named value attached to a stream descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Keyword {
    pub id: String,
    pub value: Value,
}

impl Keyword {
    pub fn new(id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { id: id.into(), value: value.into() }
    }
}
