//! Attribute and value encoding.
//!
//! [`AttributeWriter`] turns [`Value`]s into OTLP `AnyValue` messages and key-value pairs into
//! `KeyValue` messages. Scalars are framed with lengths computed up front. Arrays are first encoded
//! into a per-thread scratch buffer so their size is known before they are spliced into the
//! parent. Key-value lists are framed with reserved length slots.
//!
//! Values the wire format cannot express here (arrays containing arrays or key-value lists) are
//! dropped: the configured [`UnsupportedValueHook`] is notified and encoding continues.

use std::cell::RefCell;

use crate::encode::{EncodeError, ProtoBuffer, WireType, tag_size, varint_size};
use crate::fields::common::{
    ANY_VALUE_ARRAY, ANY_VALUE_BOOL, ANY_VALUE_BYTES, ANY_VALUE_DOUBLE, ANY_VALUE_INT,
    ANY_VALUE_KVLIST, ANY_VALUE_STRING, ARRAY_VALUE_VALUES, KEY_VALUE_KEY, KEY_VALUE_LIST_VALUES,
    KEY_VALUE_VALUE,
};
use crate::value::Value;

/// Receives the key and value kind of every dropped attribute.
pub type UnsupportedValueHook = fn(key: &str, kind: &str);

/// The default [`UnsupportedValueHook`], logging a warning.
pub fn log_unsupported_value(key: &str, kind: &str) {
    log::warn!("dropping attribute `{key}`: unsupported value of type `{kind}`");
}

thread_local! {
    static ARRAY_SCRATCH: RefCell<ProtoBuffer> = RefCell::new(ProtoBuffer::array_scratch());
}

/// Writes attributes and values with an optional string length limit.
#[derive(Clone, Copy, Debug)]
pub struct AttributeWriter {
    value_length_limit: Option<usize>,
    on_unsupported: UnsupportedValueHook,
}

impl Default for AttributeWriter {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AttributeWriter {
    /// Creates a writer truncating string values to `value_length_limit` characters.
    pub fn new(value_length_limit: Option<usize>) -> Self {
        Self {
            value_length_limit,
            on_unsupported: log_unsupported_value,
        }
    }

    /// Replaces the hook notified about dropped attributes.
    pub fn with_unsupported_value_hook(mut self, hook: UnsupportedValueHook) -> Self {
        self.on_unsupported = hook;
        self
    }

    /// The string length limit in characters.
    pub fn value_length_limit(&self) -> Option<usize> {
        self.value_length_limit
    }

    /// Writes a `KeyValue` message under `field_number`.
    ///
    /// Returns `false` without leaving any bytes behind if the value is not supported.
    pub fn write_attribute(
        &self,
        buffer: &mut ProtoBuffer,
        field_number: u32,
        key: &str,
        value: &Value,
    ) -> Result<bool, EncodeError> {
        if let Some(kind) = unsupported_kind(value) {
            (self.on_unsupported)(key, kind);
            return Ok(false);
        }

        buffer.write_message(field_number, |buffer| {
            buffer.write_string(KEY_VALUE_KEY, key)?;
            self.write_value(buffer, KEY_VALUE_VALUE, value)
        })?;
        Ok(true)
    }

    /// Writes a standalone `AnyValue` message under `field_number`, e.g. a log body.
    ///
    /// `key` only names the value in diagnostics. Returns `false` if the value is not supported.
    pub fn write_any_value(
        &self,
        buffer: &mut ProtoBuffer,
        field_number: u32,
        key: &str,
        value: &Value,
    ) -> Result<bool, EncodeError> {
        if let Some(kind) = unsupported_kind(value) {
            (self.on_unsupported)(key, kind);
            return Ok(false);
        }

        self.write_value(buffer, field_number, value)?;
        Ok(true)
    }

    fn write_value(
        &self,
        buffer: &mut ProtoBuffer,
        field_number: u32,
        value: &Value,
    ) -> Result<(), EncodeError> {
        match value {
            Value::Array(elements) => self.write_array(buffer, field_number, elements),
            Value::KeyValueList(entries) => buffer.write_message(field_number, |buffer| {
                buffer.write_message(ANY_VALUE_KVLIST, |buffer| {
                    for entry in entries {
                        self.write_attribute(buffer, KEY_VALUE_LIST_VALUES, &entry.key, &entry.value)?;
                    }
                    Ok(())
                })
            }),
            scalar => self.write_scalar(buffer, field_number, scalar),
        }
    }

    /// Writes a scalar `AnyValue`, computing its length up front.
    fn write_scalar(
        &self,
        buffer: &mut ProtoBuffer,
        field_number: u32,
        value: &Value,
    ) -> Result<(), EncodeError> {
        match value {
            Value::Empty => buffer.write_tag_and_length(field_number, WireType::Len, 0),
            Value::Bool(value) => {
                buffer.write_tag_and_length(field_number, WireType::Len, tag_size(ANY_VALUE_BOOL) + 1)?;
                buffer.write_bool(ANY_VALUE_BOOL, *value)
            }
            Value::I64(value) => {
                let length = tag_size(ANY_VALUE_INT) + varint_size(*value as u64);
                buffer.write_tag_and_length(field_number, WireType::Len, length)?;
                buffer.write_int64(ANY_VALUE_INT, *value)
            }
            Value::F64(value) => {
                buffer.write_tag_and_length(field_number, WireType::Len, tag_size(ANY_VALUE_DOUBLE) + 8)?;
                buffer.write_double(ANY_VALUE_DOUBLE, *value)
            }
            Value::String(value) => {
                let value = truncate(value, self.value_length_limit);
                write_len_scalar(buffer, field_number, ANY_VALUE_STRING, value.as_bytes())
            }
            Value::Bytes(value) => write_len_scalar(buffer, field_number, ANY_VALUE_BYTES, value),
            Value::Array(_) | Value::KeyValueList(_) => {
                unreachable!("collections are written by `write_value`")
            }
        }
    }

    fn write_array(
        &self,
        buffer: &mut ProtoBuffer,
        field_number: u32,
        elements: &[Value],
    ) -> Result<(), EncodeError> {
        ARRAY_SCRATCH.with_borrow_mut(|scratch| {
            scratch.clear();
            for element in elements {
                if *element != Value::Empty {
                    self.write_scalar(scratch, ARRAY_VALUE_VALUES, element)?;
                }
            }

            let content = scratch.as_bytes();
            let array_length = content.len();
            let value_length =
                tag_size(ANY_VALUE_ARRAY) + varint_size(array_length as u64) + array_length;
            buffer.write_tag_and_length(field_number, WireType::Len, value_length)?;
            buffer.write_tag_and_length(ANY_VALUE_ARRAY, WireType::Len, array_length)?;
            buffer.write_slice(content)
        })
    }
}

fn write_len_scalar(
    buffer: &mut ProtoBuffer,
    field_number: u32,
    value_field: u32,
    bytes: &[u8],
) -> Result<(), EncodeError> {
    let length = tag_size(value_field) + varint_size(bytes.len() as u64) + bytes.len();
    buffer.write_tag_and_length(field_number, WireType::Len, length)?;
    buffer.write_bytes(value_field, bytes)
}

/// Returns the kind of the offending element if `value` cannot be written.
fn unsupported_kind(value: &Value) -> Option<&'static str> {
    match value {
        Value::Array(elements) => elements
            .iter()
            .find(|element| matches!(element, Value::Array(_) | Value::KeyValueList(_)))
            .map(Value::kind),
        _ => None,
    }
}

/// Cuts `value` after `limit` characters.
pub fn truncate(value: &str, limit: Option<usize>) -> &str {
    match limit.and_then(|limit| value.char_indices().nth(limit)) {
        Some((end, _)) => &value[..end],
        None => value,
    }
}

/// Writes attributes of one entity up to a count limit and tracks how many were dropped.
#[derive(Debug)]
pub(crate) struct LimitedAttributes<'a> {
    writer: &'a AttributeWriter,
    field_number: u32,
    limit: usize,
    written: usize,
    dropped: u32,
}

impl<'a> LimitedAttributes<'a> {
    pub(crate) fn new(writer: &'a AttributeWriter, field_number: u32, limit: usize) -> Self {
        Self {
            writer,
            field_number,
            limit,
            written: 0,
            dropped: 0,
        }
    }

    /// Writes the attribute if the limit allows, counts it as dropped otherwise.
    pub(crate) fn write(
        &mut self,
        buffer: &mut ProtoBuffer,
        key: &str,
        value: &Value,
    ) -> Result<(), EncodeError> {
        if self.written >= self.limit {
            self.dropped = self.dropped.saturating_add(1);
            return Ok(());
        }
        if self
            .writer
            .write_attribute(buffer, self.field_number, key, value)?
        {
            self.written += 1;
        }
        Ok(())
    }

    /// Writes the dropped count under `dropped_field_number` if anything was dropped.
    pub(crate) fn finish(
        self,
        buffer: &mut ProtoBuffer,
        dropped_field_number: u32,
    ) -> Result<(), EncodeError> {
        if self.dropped > 0 {
            buffer.write_uint64(dropped_field_number, self.dropped.into())?;
        }
        Ok(())
    }
}
