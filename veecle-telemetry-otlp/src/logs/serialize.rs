use std::fmt::Write as _;

use crate::attribute::{AttributeWriter, LimitedAttributes, UnsupportedValueHook};
use crate::encode::{EncodeError, ProtoBuffer};
use crate::fields::common::ANY_VALUE_STRING;
use crate::fields::logs::*;
use crate::limits::LogRecordLimits;
use crate::resource::{Resource, write_resource, write_scope};
use crate::scope_groups::ScopeGroups;
use crate::value::Value;

use super::{EVENT_ID_ATTRIBUTE, EVENT_NAME_ATTRIBUTE, LogRecord, ORIGINAL_FORMAT_KEY};

const EXCEPTION_TYPE: &str = "exception.type";
const EXCEPTION_MESSAGE: &str = "exception.message";
const EXCEPTION_STACKTRACE: &str = "exception.stacktrace";

/// Options of a [`LogSerializer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogSerializerOptions {
    /// Export the event id and name as `logrecord.event.id` and `logrecord.event.name` attributes.
    pub emit_event_attributes: bool,
}

/// Writes batches of log records as OTLP `LogsData` messages.
///
/// Accepts anything that borrows as a [`LogRecord`], such as pooled
/// [`SharedLogRecord`](super::SharedLogRecord)s.
#[derive(Debug)]
pub struct LogSerializer {
    limits: LogRecordLimits,
    options: LogSerializerOptions,
    attributes: AttributeWriter,
    body: AttributeWriter,
    groups: ScopeGroups,
}

impl LogSerializer {
    /// Creates a serializer applying `limits`.
    pub fn new(limits: LogRecordLimits, options: LogSerializerOptions) -> Self {
        Self {
            limits,
            options,
            attributes: AttributeWriter::new(limits.attribute_value_length),
            body: AttributeWriter::default(),
            groups: ScopeGroups::default(),
        }
    }

    /// Replaces the hook notified about attributes with unsupported values.
    pub fn with_unsupported_value_hook(mut self, hook: UnsupportedValueHook) -> Self {
        self.attributes = self.attributes.with_unsupported_value_hook(hook);
        self.body = self.body.with_unsupported_value_hook(hook);
        self
    }

    /// Appends one `ResourceLogs` entry holding `records` to `buffer`.
    pub fn serialize<R: AsRef<LogRecord>>(
        &mut self,
        buffer: &mut ProtoBuffer,
        resource: &Resource,
        records: &[R],
    ) -> Result<(), EncodeError> {
        self.groups
            .group(records.iter().map(|record| &record.as_ref().scope.name));

        let result = buffer.write_with_retry(|buffer| {
            buffer.write_message(LOGS_DATA_RESOURCE_LOGS, |buffer| {
                self.write_resource_logs(buffer, resource, records)
            })
        });

        self.groups.clear();
        result
    }

    fn write_resource_logs<R: AsRef<LogRecord>>(
        &self,
        buffer: &mut ProtoBuffer,
        resource: &Resource,
        records: &[R],
    ) -> Result<(), EncodeError> {
        write_resource(buffer, &self.attributes, RESOURCE_LOGS_RESOURCE, resource)?;

        for group in self.groups.iter() {
            let scope = &records[group[0]].as_ref().scope;
            buffer.write_message(RESOURCE_LOGS_SCOPE_LOGS, |buffer| {
                write_scope(
                    buffer,
                    &self.attributes,
                    SCOPE_LOGS_SCOPE,
                    scope,
                    self.limits.attribute_count,
                )?;
                for index in group {
                    buffer.write_message(SCOPE_LOGS_LOG_RECORDS, |buffer| {
                        self.write_log_record(buffer, records[*index].as_ref())
                    })?;
                }
                if let Some(schema_url) = &scope.schema_url {
                    buffer.write_string(SCOPE_LOGS_SCHEMA_URL, schema_url)?;
                }
                Ok(())
            })?;
        }

        if let Some(schema_url) = &resource.schema_url {
            buffer.write_string(RESOURCE_LOGS_SCHEMA_URL, schema_url)?;
        }
        Ok(())
    }

    fn write_log_record(&self, buffer: &mut ProtoBuffer, record: &LogRecord) -> Result<(), EncodeError> {
        buffer.write_fixed64_field(LOG_RECORD_TIME_UNIX_NANO, record.timestamp)?;
        buffer.write_fixed64_field(
            LOG_RECORD_OBSERVED_TIME_UNIX_NANO,
            record.observed_timestamp.unwrap_or(record.timestamp),
        )?;
        buffer.write_enum(
            LOG_RECORD_SEVERITY_NUMBER,
            record.severity.map_or(0, |severity| severity.number()),
        )?;
        let severity_text = record
            .severity_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .or_else(|| record.severity.map(|severity| severity.short_name()));
        if let Some(text) = severity_text {
            buffer.write_string(LOG_RECORD_SEVERITY_TEXT, text)?;
        }

        let mut attributes = LimitedAttributes::new(
            &self.attributes,
            LOG_RECORD_ATTRIBUTES,
            self.limits.attribute_count,
        );

        if self.options.emit_event_attributes {
            if record.event_id.id != 0 {
                attributes.write(buffer, EVENT_ID_ATTRIBUTE, &Value::I64(record.event_id.id))?;
            }
            if let Some(name) = record.event_id.name.as_deref().filter(|name| !name.is_empty()) {
                attributes.write(buffer, EVENT_NAME_ATTRIBUTE, &Value::from(name.to_owned()))?;
            }
        }

        if let Some(exception) = &record.exception {
            attributes.write(buffer, EXCEPTION_TYPE, &Value::String(exception.type_name.clone()))?;
            attributes.write(buffer, EXCEPTION_MESSAGE, &Value::String(exception.message.clone()))?;
            attributes.write(
                buffer,
                EXCEPTION_STACKTRACE,
                &Value::String(exception.stack_trace.clone()),
            )?;
        }

        let original_format = record
            .attributes
            .iter()
            .find(|attribute| attribute.key == ORIGINAL_FORMAT_KEY)
            .and_then(|attribute| attribute.value.as_str());
        if let Some(message) = record.formatted_message.as_deref().or(original_format) {
            write_string_body(buffer, message)?;
        } else if let Some(body) = &record.body {
            self.body.write_any_value(buffer, LOG_RECORD_BODY, "body", body)?;
        }

        // The template is only folded into the body when no formatted message replaced it.
        let template_is_body = record.formatted_message.is_none();
        for attribute in &record.attributes {
            if template_is_body && attribute.key == ORIGINAL_FORMAT_KEY {
                continue;
            }
            attributes.write(buffer, &attribute.key, &attribute.value)?;
        }

        let mut scoped_key = String::new();
        for item in &record.scope_items {
            let key = &item.attribute.key;
            if key.is_empty() || key == ORIGINAL_FORMAT_KEY {
                continue;
            }
            scoped_key.clear();
            write!(scoped_key, "scope[{}].{key}", item.scope)
                .expect("writing to a String cannot fail");
            attributes.write(buffer, &scoped_key, &item.attribute.value)?;
        }

        if let Some(name) = record.event_id.name.as_deref().filter(|name| !name.is_empty()) {
            buffer.write_string(LOG_RECORD_EVENT_NAME, name)?;
        }

        if record.trace_id.is_valid() && record.span_id.is_valid() {
            buffer.write_bytes(LOG_RECORD_TRACE_ID, &record.trace_id.to_bytes())?;
            buffer.write_bytes(LOG_RECORD_SPAN_ID, &record.span_id.to_bytes())?;
            buffer.write_fixed32_field(LOG_RECORD_FLAGS, record.trace_flags.0.into())?;
        }

        attributes.finish(buffer, LOG_RECORD_DROPPED_ATTRIBUTES_COUNT)
    }
}

/// Writes a string `AnyValue` body; bodies are not subject to the attribute length limit.
fn write_string_body(buffer: &mut ProtoBuffer, message: &str) -> Result<(), EncodeError> {
    buffer.write_message(LOG_RECORD_BODY, |buffer| {
        buffer.write_string(ANY_VALUE_STRING, message)
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::fields::common::{ANY_VALUE_INT, KEY_VALUE_KEY, KEY_VALUE_VALUE};
    use crate::id::{SpanId, TraceFlags, TraceId};
    use crate::logs::{EventId, ExceptionInfo, Severity, SharedLogRecord};
    use crate::resource::InstrumentationScope;
    use crate::test_helpers::{FieldValue, field, field_numbers, fields_numbered};
    use crate::value::KeyValue;

    fn serialize_with(
        limits: LogRecordLimits,
        options: LogSerializerOptions,
        records: &[LogRecord],
    ) -> Vec<u8> {
        let mut buffer = ProtoBuffer::with_capacity(16);
        LogSerializer::new(limits, options)
            .serialize(&mut buffer, &Resource::default(), records)
            .unwrap();
        buffer.as_bytes().to_vec()
    }

    fn serialize(records: &[LogRecord]) -> Vec<u8> {
        serialize_with(LogRecordLimits::default(), LogSerializerOptions::default(), records)
    }

    fn records_of(bytes: &[u8]) -> Vec<Vec<u8>> {
        let resource_logs = field(bytes, LOGS_DATA_RESOURCE_LOGS).unwrap().bytes().unwrap();
        fields_numbered(resource_logs, RESOURCE_LOGS_SCOPE_LOGS)
            .iter()
            .flat_map(|scope_logs| fields_numbered(scope_logs.bytes().unwrap(), SCOPE_LOGS_LOG_RECORDS))
            .map(|record| record.bytes().unwrap().to_vec())
            .collect()
    }

    fn attribute_keys(record: &[u8]) -> Vec<String> {
        fields_numbered(record, LOG_RECORD_ATTRIBUTES)
            .iter()
            .map(|attribute| {
                field(attribute.bytes().unwrap(), KEY_VALUE_KEY)
                    .unwrap()
                    .str()
                    .unwrap()
                    .to_owned()
            })
            .collect()
    }

    fn body_string(record: &[u8]) -> Option<&str> {
        let body = field(record, LOG_RECORD_BODY)?.bytes()?;
        field(body, ANY_VALUE_STRING)?.str()
    }

    #[test]
    fn minimal_record() {
        let record = LogRecord {
            timestamp: 42,
            ..LogRecord::default()
        };
        let records = records_of(&serialize(&[record]));

        assert_eq!(field_numbers(&records[0]), vec![1, 11, 2]);
        assert_eq!(
            field(&records[0], LOG_RECORD_OBSERVED_TIME_UNIX_NANO).unwrap().value,
            FieldValue::Fixed64(42)
        );
        assert_eq!(field(&records[0], LOG_RECORD_SEVERITY_NUMBER).unwrap().varint(), Some(0));
    }

    #[test]
    fn severity_text_falls_back_to_short_name() {
        let explicit = LogRecord {
            severity: Some(Severity::Warn),
            severity_text: Some("Warning".to_owned()),
            ..LogRecord::default()
        };
        let blank = LogRecord {
            severity: Some(Severity::Info2),
            severity_text: Some("  ".to_owned()),
            ..LogRecord::default()
        };

        let records = records_of(&serialize(&[explicit, blank]));
        assert_eq!(field(&records[0], LOG_RECORD_SEVERITY_TEXT).unwrap().str(), Some("Warning"));
        assert_eq!(field(&records[0], LOG_RECORD_SEVERITY_NUMBER).unwrap().varint(), Some(13));
        assert_eq!(field(&records[1], LOG_RECORD_SEVERITY_TEXT).unwrap().str(), Some("INFO2"));
    }

    #[test]
    fn original_format_becomes_body() {
        let record = LogRecord {
            attributes: vec![
                KeyValue::new(ORIGINAL_FORMAT_KEY, "Hello {name}"),
                KeyValue::new("name", "World"),
            ],
            body: Some(Value::from("ignored")),
            ..LogRecord::default()
        };

        let records = records_of(&serialize(&[record]));
        assert_eq!(body_string(&records[0]), Some("Hello {name}"));
        assert_eq!(attribute_keys(&records[0]), vec!["name"]);
    }

    #[test]
    fn formatted_message_wins() {
        let record = LogRecord {
            formatted_message: Some("Hello World".to_owned()),
            attributes: vec![KeyValue::new(ORIGINAL_FORMAT_KEY, "Hello {name}")],
            ..LogRecord::default()
        };

        let records = records_of(&serialize(&[record]));
        assert_eq!(body_string(&records[0]), Some("Hello World"));
        assert_eq!(attribute_keys(&records[0]), vec![ORIGINAL_FORMAT_KEY]);
    }

    #[test]
    fn explicit_body_of_any_value() {
        let record = LogRecord {
            body: Some(Value::I64(7)),
            ..LogRecord::default()
        };

        let records = records_of(&serialize(&[record]));
        let body = field(&records[0], LOG_RECORD_BODY).unwrap().bytes().unwrap();
        assert_eq!(field(body, ANY_VALUE_INT).unwrap().varint(), Some(7));
    }

    #[test]
    fn attribute_limit_counts_every_source() {
        let mut record = LogRecord {
            exception: Some(ExceptionInfo {
                type_name: "IoError".into(),
                message: "reset".into(),
                stack_trace: "reset".into(),
            }),
            attributes: vec![KeyValue::new("a", 1), KeyValue::new("b", 2)],
            ..LogRecord::default()
        };
        record.push_scope([KeyValue::new("request", 3)]);

        let limits = LogRecordLimits {
            attribute_count: 2,
            ..LogRecordLimits::default()
        };
        let records = records_of(&serialize_with(limits, LogSerializerOptions::default(), &[record]));

        assert_eq!(attribute_keys(&records[0]), vec![EXCEPTION_TYPE, EXCEPTION_MESSAGE]);
        assert_eq!(
            field(&records[0], LOG_RECORD_DROPPED_ATTRIBUTES_COUNT).unwrap().varint(),
            Some(4)
        );
    }

    #[test]
    fn scope_items_are_prefixed() {
        let mut record = LogRecord::default();
        record.push_scope([
            KeyValue::new("request", 1),
            KeyValue::new("", "plain"),
            KeyValue::new(ORIGINAL_FORMAT_KEY, "Handling {request}"),
        ]);
        record.push_scope([KeyValue::new("user", "ann")]);

        let records = records_of(&serialize(&[record]));
        assert_eq!(
            attribute_keys(&records[0]),
            vec!["scope[0].request", "scope[1].user"]
        );
    }

    #[test]
    fn event_attributes_are_optional() {
        let record = LogRecord {
            event_id: EventId {
                id: 12,
                name: Some("checkout".into()),
            },
            ..LogRecord::default()
        };

        let without = records_of(&serialize(&[record.clone()]));
        assert!(attribute_keys(&without[0]).is_empty());
        assert_eq!(field(&without[0], LOG_RECORD_EVENT_NAME).unwrap().str(), Some("checkout"));

        let options = LogSerializerOptions {
            emit_event_attributes: true,
        };
        let with = records_of(&serialize_with(LogRecordLimits::default(), options, &[record]));
        assert_eq!(
            attribute_keys(&with[0]),
            vec![EVENT_ID_ATTRIBUTE, EVENT_NAME_ATTRIBUTE]
        );
        let id = fields_numbered(&with[0], LOG_RECORD_ATTRIBUTES)[0].bytes().unwrap();
        let value = field(id, KEY_VALUE_VALUE).unwrap().bytes().unwrap();
        assert_eq!(field(value, ANY_VALUE_INT).unwrap().varint(), Some(12));
    }

    #[test]
    fn trace_context_requires_both_ids() {
        let full = LogRecord {
            trace_id: TraceId(1),
            span_id: SpanId(2),
            trace_flags: TraceFlags::SAMPLED,
            ..LogRecord::default()
        };
        let partial = LogRecord {
            trace_id: TraceId(1),
            ..LogRecord::default()
        };

        let records = records_of(&serialize(&[full, partial]));
        assert_eq!(
            field(&records[0], LOG_RECORD_TRACE_ID).unwrap().bytes(),
            Some(&TraceId(1).to_bytes()[..])
        );
        assert_eq!(
            field(&records[0], LOG_RECORD_FLAGS).unwrap().value,
            FieldValue::Fixed32(1)
        );
        assert_eq!(field(&records[1], LOG_RECORD_TRACE_ID), None);
        assert_eq!(field(&records[1], LOG_RECORD_FLAGS), None);
    }

    #[test]
    fn shared_records_grouped_by_scope() {
        let first = Arc::new(InstrumentationScope::new("app").with_version("2.0"));
        let second = Arc::new(InstrumentationScope::new("db"));
        let records: Vec<SharedLogRecord> = [&first, &second, &first]
            .into_iter()
            .map(|scope| {
                SharedLogRecord::new(LogRecord {
                    scope: Arc::clone(scope),
                    ..LogRecord::default()
                })
            })
            .collect();

        let mut buffer = ProtoBuffer::with_capacity(16);
        LogSerializer::new(LogRecordLimits::default(), LogSerializerOptions::default())
            .serialize(&mut buffer, &Resource::default(), &records)
            .unwrap();

        let resource_logs = field(buffer.as_bytes(), LOGS_DATA_RESOURCE_LOGS)
            .unwrap()
            .bytes()
            .unwrap();
        let scopes = fields_numbered(resource_logs, RESOURCE_LOGS_SCOPE_LOGS);
        assert_eq!(scopes.len(), 2);
        let counts: Vec<usize> = scopes
            .iter()
            .map(|scope| fields_numbered(scope.bytes().unwrap(), SCOPE_LOGS_LOG_RECORDS).len())
            .collect();
        assert_eq!(counts, vec![2, 1]);
    }
}
