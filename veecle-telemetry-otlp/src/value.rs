//! Key-value attribute types for telemetry records.
//!
//! Attributes are key-value pairs that provide additional context for spans, events, metric
//! points and log records. Keys are not deduplicated; duplicates are written as given.
//!
//! # Value Types
//!
//! The [`Value`] enum mirrors the OTLP `AnyValue` message:
//! - **Empty**: No value
//! - **Bool**: Boolean values (true/false)
//! - **I64**: 64-bit signed integers
//! - **F64**: 64-bit floating-point numbers
//! - **String**: UTF-8 text
//! - **Bytes**: Raw byte blobs
//! - **Array**: A list of scalar values
//! - **KeyValueList**: A nested list of key-value pairs
//!
//! # Examples
//!
//! ```rust
//! use veecle_telemetry_otlp::{KeyValue, Value};
//!
//! let user_id = KeyValue::new("user_id", 123);
//! let username = KeyValue::new("username", "alice");
//! let ports = KeyValue::new("ports", vec![Value::I64(80), Value::I64(443)]);
//!
//! assert_eq!(user_id.value, Value::I64(123));
//! assert_eq!(ports.value.kind(), "array");
//! ```

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A key-value attribute pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    /// The attribute key.
    pub key: Cow<'static, str>,
    /// The attribute value.
    pub value: Value,
}

impl KeyValue {
    /// Creates a new key-value attribute pair.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use veecle_telemetry_otlp::KeyValue;
    ///
    /// let user_id = KeyValue::new("user_id", 123);
    /// let username = KeyValue::new(String::from("username"), "alice");
    /// ```
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<Cow<'static, str>>,
        V: Into<Value>,
    {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.value)
    }
}

/// A value that can be stored in a telemetry attribute or log body.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// No value.
    #[default]
    Empty,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    I64(i64),
    /// A 64-bit floating-point number.
    F64(f64),
    /// A UTF-8 string.
    String(Cow<'static, str>),
    /// A raw byte blob.
    Bytes(Vec<u8>),
    /// A homogeneous or mixed list of scalar values.
    Array(Vec<Value>),
    /// A nested list of key-value pairs.
    KeyValueList(Vec<KeyValue>),
}

impl Value {
    /// Returns a short name of the value kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Bool(_) => "bool",
            Value::I64(_) => "i64",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::KeyValueList(_) => "kvlist",
        }
    }

    /// Returns the string slice if this is a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => f.write_str("<empty>"),
            // Strings keep their delimiters so the end of the value stays visible.
            Value::String(value) => write!(f, "{value:?}"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::I64(value) => write!(f, "{value}"),
            Value::F64(value) => write!(f, "{value}"),
            Value::Bytes(value) => write!(f, "0x{}", hex::encode(value)),
            Value::Array(values) => {
                f.write_str("[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
            Value::KeyValueList(entries) => {
                f.write_str("{")?;
                for (index, entry) in entries.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{entry}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<Cow<'static, str>> for Value {
    fn from(value: Cow<'static, str>) -> Self {
        Value::String(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value.into())
    }
}

impl From<&'static str> for Value {
    fn from(value: &'static str) -> Self {
        Value::String(Cow::Borrowed(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I64(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::I64(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(values)
    }
}

impl From<Vec<KeyValue>> for Value {
    fn from(entries: Vec<KeyValue>) -> Self {
        Value::KeyValueList(entries)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Empty, Into::into)
    }
}
