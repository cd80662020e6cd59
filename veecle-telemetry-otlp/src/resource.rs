//! The entity producing telemetry and the instrumentation scopes inside it.

use std::sync::Arc;

use crate::attribute::{AttributeWriter, LimitedAttributes};
use crate::encode::{EncodeError, ProtoBuffer};
use crate::fields::common::{
    RESOURCE_ATTRIBUTES, RESOURCE_DROPPED_ATTRIBUTES_COUNT, SCOPE_ATTRIBUTES,
    SCOPE_DROPPED_ATTRIBUTES_COUNT, SCOPE_NAME, SCOPE_VERSION,
};
use crate::value::KeyValue;

/// The entity producing telemetry, e.g. a service instance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resource {
    /// Attributes describing the entity.
    pub attributes: Vec<KeyValue>,
    /// Schema url the attributes follow.
    pub schema_url: Option<String>,
}

impl Resource {
    /// Creates a resource from attributes.
    pub fn new(attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        Self {
            attributes: attributes.into_iter().collect(),
            schema_url: None,
        }
    }

    /// Sets the schema url.
    pub fn with_schema_url(mut self, schema_url: impl Into<String>) -> Self {
        self.schema_url = Some(schema_url.into());
        self
    }
}

/// A named source of telemetry, e.g. a library or module.
///
/// Records of one export are grouped by [`name`](Self::name).
///
/// # Examples
///
/// ```rust
/// use veecle_telemetry_otlp::{InstrumentationScope, KeyValue};
///
/// let scope = InstrumentationScope::new("http-client")
///     .with_version("1.2.0")
///     .with_attributes([KeyValue::new("pool", "default")]);
/// assert_eq!(&*scope.name, "http-client");
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstrumentationScope {
    /// The scope name, used as grouping key.
    pub name: Arc<str>,
    /// The scope version.
    pub version: Option<String>,
    /// Scope-level attributes.
    pub attributes: Vec<KeyValue>,
    /// Schema url the scope's telemetry follows.
    pub schema_url: Option<String>,
}

impl InstrumentationScope {
    /// Creates a scope with the given name.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the scope-level attributes.
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        self.attributes = attributes.into_iter().collect();
        self
    }

    /// Sets the schema url.
    pub fn with_schema_url(mut self, schema_url: impl Into<String>) -> Self {
        self.schema_url = Some(schema_url.into());
        self
    }
}

/// Writes a `Resource` message under `field_number`.
pub(crate) fn write_resource(
    buffer: &mut ProtoBuffer,
    writer: &AttributeWriter,
    field_number: u32,
    resource: &Resource,
) -> Result<(), EncodeError> {
    buffer.write_message(field_number, |buffer| {
        let mut attributes = LimitedAttributes::new(writer, RESOURCE_ATTRIBUTES, usize::MAX);
        for attribute in &resource.attributes {
            attributes.write(buffer, &attribute.key, &attribute.value)?;
        }
        attributes.finish(buffer, RESOURCE_DROPPED_ATTRIBUTES_COUNT)
    })
}

/// Writes an `InstrumentationScope` message under `field_number`.
pub(crate) fn write_scope(
    buffer: &mut ProtoBuffer,
    writer: &AttributeWriter,
    field_number: u32,
    scope: &InstrumentationScope,
    attribute_limit: usize,
) -> Result<(), EncodeError> {
    buffer.write_message(field_number, |buffer| {
        buffer.write_string(SCOPE_NAME, &scope.name)?;
        if let Some(version) = &scope.version {
            buffer.write_string(SCOPE_VERSION, version)?;
        }
        let mut attributes = LimitedAttributes::new(writer, SCOPE_ATTRIBUTES, attribute_limit);
        for attribute in &scope.attributes {
            attributes.write(buffer, &attribute.key, &attribute.value)?;
        }
        attributes.finish(buffer, SCOPE_DROPPED_ATTRIBUTES_COUNT)
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_helpers::{field, field_numbers, fields_numbered};

    #[test]
    fn scope_message() {
        let scope = InstrumentationScope::new("db")
            .with_version("0.3.1")
            .with_attributes([KeyValue::new("a", 1), KeyValue::new("b", 2), KeyValue::new("c", 3)]);
        let mut buffer = ProtoBuffer::with_capacity(256);
        write_scope(&mut buffer, &AttributeWriter::default(), 1, &scope, 2).unwrap();

        let message = field(buffer.as_bytes(), 1).unwrap().bytes().unwrap();
        assert_eq!(field_numbers(message), vec![1, 2, 3, 3, 4]);
        assert_eq!(field(message, SCOPE_NAME).unwrap().str(), Some("db"));
        assert_eq!(field(message, SCOPE_VERSION).unwrap().str(), Some("0.3.1"));
        assert_eq!(
            field(message, SCOPE_DROPPED_ATTRIBUTES_COUNT).unwrap().varint(),
            Some(1)
        );
    }

    #[test]
    fn empty_resource_is_an_empty_message() {
        let mut buffer = ProtoBuffer::with_capacity(64);
        write_resource(&mut buffer, &AttributeWriter::default(), 1, &Resource::default()).unwrap();
        assert_eq!(field(buffer.as_bytes(), 1).unwrap().bytes(), Some(&[][..]));

        buffer.clear();
        let resource = Resource::new([KeyValue::new("service.name", "checkout")]);
        write_resource(&mut buffer, &AttributeWriter::default(), 1, &resource).unwrap();
        let message = field(buffer.as_bytes(), 1).unwrap().bytes().unwrap();
        assert_eq!(fields_numbered(message, RESOURCE_ATTRIBUTES).len(), 1);
    }
}
