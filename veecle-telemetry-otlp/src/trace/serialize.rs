use crate::attribute::{AttributeWriter, LimitedAttributes, UnsupportedValueHook};
use crate::encode::{EncodeError, ProtoBuffer};
use crate::fields::trace::*;
use crate::id::SpanContext;
use crate::limits::SpanLimits;
use crate::resource::{Resource, write_resource, write_scope};
use crate::scope_groups::ScopeGroups;

use super::{STATUS_CODE_KEY, STATUS_DESCRIPTION_KEY, SpanData, SpanEvent, SpanLink, Status, StatusCode};

/// Writes batches of spans as OTLP `TracesData` messages.
///
/// # Examples
///
/// ```rust
/// use veecle_telemetry_otlp::encode::ProtoBuffer;
/// use veecle_telemetry_otlp::limits::SpanLimits;
/// use veecle_telemetry_otlp::trace::{SpanData, TraceSerializer};
/// use veecle_telemetry_otlp::Resource;
///
/// let mut serializer = TraceSerializer::new(SpanLimits::default());
/// let mut buffer = ProtoBuffer::with_capacity(1024);
/// let spans = [SpanData { name: "GET /".into(), ..SpanData::default() }];
/// serializer.serialize(&mut buffer, &Resource::default(), &spans)?;
/// assert!(!buffer.as_bytes().is_empty());
/// # Ok::<(), veecle_telemetry_otlp::encode::EncodeError>(())
/// ```
#[derive(Debug)]
pub struct TraceSerializer {
    limits: SpanLimits,
    attributes: AttributeWriter,
    groups: ScopeGroups,
}

impl TraceSerializer {
    /// Creates a serializer applying `limits`.
    pub fn new(limits: SpanLimits) -> Self {
        Self {
            limits,
            attributes: AttributeWriter::new(limits.attribute_value_length),
            groups: ScopeGroups::default(),
        }
    }

    /// Replaces the hook notified about attributes with unsupported values.
    pub fn with_unsupported_value_hook(mut self, hook: UnsupportedValueHook) -> Self {
        self.attributes = self.attributes.with_unsupported_value_hook(hook);
        self
    }

    /// Appends one `ResourceSpans` entry holding `spans` to `buffer`.
    ///
    /// The buffer grows as needed; the whole entry is re-encoded after every growth step.
    pub fn serialize(
        &mut self,
        buffer: &mut ProtoBuffer,
        resource: &Resource,
        spans: &[SpanData],
    ) -> Result<(), EncodeError> {
        self.groups.group(spans.iter().map(|span| &span.scope.name));

        let result = buffer.write_with_retry(|buffer| {
            buffer.write_message(TRACES_DATA_RESOURCE_SPANS, |buffer| {
                self.write_resource_spans(buffer, resource, spans)
            })
        });

        self.groups.clear();
        result
    }

    fn write_resource_spans(
        &self,
        buffer: &mut ProtoBuffer,
        resource: &Resource,
        spans: &[SpanData],
    ) -> Result<(), EncodeError> {
        write_resource(buffer, &self.attributes, RESOURCE_SPANS_RESOURCE, resource)?;

        for group in self.groups.iter() {
            let scope = &spans[group[0]].scope;
            buffer.write_message(RESOURCE_SPANS_SCOPE_SPANS, |buffer| {
                write_scope(
                    buffer,
                    &self.attributes,
                    SCOPE_SPANS_SCOPE,
                    scope,
                    self.limits.attribute_count,
                )?;
                for index in group {
                    buffer.write_message(SCOPE_SPANS_SPANS, |buffer| {
                        self.write_span(buffer, &spans[*index])
                    })?;
                }
                if let Some(schema_url) = &scope.schema_url {
                    buffer.write_string(SCOPE_SPANS_SCHEMA_URL, schema_url)?;
                }
                Ok(())
            })?;
        }

        if let Some(schema_url) = &resource.schema_url {
            buffer.write_string(RESOURCE_SPANS_SCHEMA_URL, schema_url)?;
        }
        Ok(())
    }

    fn write_span(&self, buffer: &mut ProtoBuffer, span: &SpanData) -> Result<(), EncodeError> {
        let context = &span.context;
        buffer.write_bytes(SPAN_TRACE_ID, &context.trace_id.to_bytes())?;
        buffer.write_bytes(SPAN_SPAN_ID, &context.span_id.to_bytes())?;
        if let Some(trace_state) = &context.trace_state {
            buffer.write_string(SPAN_TRACE_STATE, trace_state)?;
        }
        if span.parent_span_id.is_valid() {
            buffer.write_bytes(SPAN_PARENT_SPAN_ID, &span.parent_span_id.to_bytes())?;
        }
        buffer.write_fixed32_field(SPAN_FLAGS, span_flags(context, span.parent_is_remote))?;
        buffer.write_string(SPAN_NAME, &span.name)?;
        buffer.write_enum(SPAN_KIND, span.kind.wire_value())?;
        buffer.write_fixed64_field(SPAN_START_TIME_UNIX_NANO, span.start_time_unix_nano)?;
        buffer.write_fixed64_field(SPAN_END_TIME_UNIX_NANO, span.end_time_unix_nano)?;

        let mut tag_code = None;
        let mut tag_description = None;
        let mut attributes =
            LimitedAttributes::new(&self.attributes, SPAN_ATTRIBUTES, self.limits.attribute_count);
        for attribute in &span.attributes {
            match &*attribute.key {
                STATUS_CODE_KEY => {
                    tag_code = attribute.value.as_str().and_then(StatusCode::from_tag);
                }
                STATUS_DESCRIPTION_KEY => {
                    tag_description = attribute.value.as_str();
                }
                key => attributes.write(buffer, key, &attribute.value)?,
            }
        }
        attributes.finish(buffer, SPAN_DROPPED_ATTRIBUTES_COUNT)?;

        let mut dropped_events = 0u32;
        for (index, event) in span.events.iter().enumerate() {
            if index < self.limits.event_count {
                buffer.write_message(SPAN_EVENTS, |buffer| self.write_event(buffer, event))?;
            } else {
                dropped_events += 1;
            }
        }
        if dropped_events > 0 {
            buffer.write_uint64(SPAN_DROPPED_EVENTS_COUNT, dropped_events.into())?;
        }

        let mut dropped_links = 0u32;
        for (index, link) in span.links.iter().enumerate() {
            if index < self.limits.link_count {
                buffer.write_message(SPAN_LINKS, |buffer| self.write_link(buffer, link))?;
            } else {
                dropped_links += 1;
            }
        }
        if dropped_links > 0 {
            buffer.write_uint64(SPAN_DROPPED_LINKS_COUNT, dropped_links.into())?;
        }

        let status = match &span.status {
            Status::Unset => tag_code.map(|code| (code, tag_description)),
            Status::Ok => Some((StatusCode::Ok, None)),
            Status::Error { description } => Some((StatusCode::Error, description.as_deref())),
        };
        if let Some((code, description)) = status {
            buffer.write_message(SPAN_STATUS, |buffer| {
                if code == StatusCode::Error
                    && let Some(description) = description
                {
                    buffer.write_string(STATUS_MESSAGE, description)?;
                }
                buffer.write_enum(STATUS_CODE, code as i32)
            })?;
        }

        Ok(())
    }

    fn write_event(&self, buffer: &mut ProtoBuffer, event: &SpanEvent) -> Result<(), EncodeError> {
        buffer.write_fixed64_field(EVENT_TIME_UNIX_NANO, event.time_unix_nano)?;
        buffer.write_string(EVENT_NAME, &event.name)?;
        let mut attributes = LimitedAttributes::new(
            &self.attributes,
            EVENT_ATTRIBUTES,
            self.limits.event_attribute_count,
        );
        for attribute in &event.attributes {
            attributes.write(buffer, &attribute.key, &attribute.value)?;
        }
        attributes.finish(buffer, EVENT_DROPPED_ATTRIBUTES_COUNT)
    }

    fn write_link(&self, buffer: &mut ProtoBuffer, link: &SpanLink) -> Result<(), EncodeError> {
        let context = &link.context;
        buffer.write_bytes(LINK_TRACE_ID, &context.trace_id.to_bytes())?;
        buffer.write_bytes(LINK_SPAN_ID, &context.span_id.to_bytes())?;
        if let Some(trace_state) = &context.trace_state {
            buffer.write_string(LINK_TRACE_STATE, trace_state)?;
        }
        let mut attributes = LimitedAttributes::new(
            &self.attributes,
            LINK_ATTRIBUTES,
            self.limits.link_attribute_count,
        );
        for attribute in &link.attributes {
            attributes.write(buffer, &attribute.key, &attribute.value)?;
        }
        attributes.finish(buffer, LINK_DROPPED_ATTRIBUTES_COUNT)?;
        buffer.write_fixed32_field(LINK_FLAGS, span_flags(context, context.is_remote))
    }
}

/// Trace flags in the low byte plus whether the context is remote.
fn span_flags(context: &SpanContext, is_remote: bool) -> u32 {
    let mut flags = u32::from(context.trace_flags.0) | SPAN_FLAGS_CONTEXT_HAS_IS_REMOTE;
    if is_remote {
        flags |= SPAN_FLAGS_CONTEXT_IS_REMOTE;
    }
    flags
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::id::{SpanId, TraceFlags, TraceId};
    use crate::resource::InstrumentationScope;
    use crate::test_helpers::{field, field_numbers, fields_numbered};
    use crate::value::KeyValue;

    fn serialize(limits: SpanLimits, spans: &[SpanData]) -> Vec<u8> {
        let mut buffer = ProtoBuffer::with_capacity(16);
        TraceSerializer::new(limits)
            .serialize(&mut buffer, &Resource::default(), spans)
            .unwrap();
        buffer.as_bytes().to_vec()
    }

    /// Returns the span messages of every scope, in order.
    fn spans_of(bytes: &[u8]) -> Vec<Vec<u8>> {
        let resource_spans = field(bytes, TRACES_DATA_RESOURCE_SPANS).unwrap().bytes().unwrap();
        fields_numbered(resource_spans, RESOURCE_SPANS_SCOPE_SPANS)
            .iter()
            .flat_map(|scope_spans| fields_numbered(scope_spans.bytes().unwrap(), SCOPE_SPANS_SPANS))
            .map(|span| span.bytes().unwrap().to_vec())
            .collect()
    }

    fn span(scope: &Arc<InstrumentationScope>, name: &'static str) -> SpanData {
        SpanData {
            scope: Arc::clone(scope),
            context: SpanContext::new(TraceId(1), SpanId(2), TraceFlags::SAMPLED),
            name: name.into(),
            ..SpanData::default()
        }
    }

    #[test]
    fn field_order_and_flags() {
        let scope = Arc::new(InstrumentationScope::new("svc"));
        let mut data = span(&scope, "op");
        data.context = data.context.with_trace_state("k=v");
        data.parent_span_id = SpanId(9);
        data.parent_is_remote = true;
        data.status = Status::Ok;
        data.attributes.push(KeyValue::new("a", 1));

        let bytes = serialize(SpanLimits::default(), &[data]);
        let spans = spans_of(&bytes);
        let span = &spans[0];

        assert_eq!(field_numbers(span), vec![1, 2, 3, 4, 16, 5, 6, 7, 8, 9, 15]);
        assert_eq!(
            field(span, SPAN_FLAGS).unwrap().value,
            crate::test_helpers::FieldValue::Fixed32(0x301)
        );
        assert_eq!(field(span, SPAN_KIND).unwrap().varint(), Some(1));
    }

    #[test]
    fn root_span_has_no_parent() {
        let scope = Arc::new(InstrumentationScope::new("svc"));
        let bytes = serialize(SpanLimits::default(), &[span(&scope, "root")]);
        let spans = spans_of(&bytes);
        assert_eq!(field(&spans[0], SPAN_PARENT_SPAN_ID), None);
        assert_eq!(field(&spans[0], SPAN_STATUS), None);
    }

    #[test]
    fn legacy_status_tags() {
        let scope = Arc::new(InstrumentationScope::new("svc"));
        let mut data = span(&scope, "op");
        data.attributes = vec![
            KeyValue::new(STATUS_CODE_KEY, "error"),
            KeyValue::new(STATUS_DESCRIPTION_KEY, "boom"),
            KeyValue::new("kept", true),
        ];

        let spans = spans_of(&serialize(SpanLimits::default(), &[data]));
        assert_eq!(fields_numbered(&spans[0], SPAN_ATTRIBUTES).len(), 1);

        let status = field(&spans[0], SPAN_STATUS).unwrap().bytes().unwrap();
        assert_eq!(field(status, STATUS_CODE).unwrap().varint(), Some(2));
        assert_eq!(field(status, STATUS_MESSAGE).unwrap().str(), Some("boom"));
    }

    #[test]
    fn sdk_status_wins_over_tags() {
        let scope = Arc::new(InstrumentationScope::new("svc"));
        let mut data = span(&scope, "op");
        data.status = Status::Ok;
        data.attributes = vec![
            KeyValue::new(STATUS_CODE_KEY, "ERROR"),
            KeyValue::new(STATUS_DESCRIPTION_KEY, "ignored"),
        ];

        let spans = spans_of(&serialize(SpanLimits::default(), &[data]));
        let status = field(&spans[0], SPAN_STATUS).unwrap().bytes().unwrap();
        assert_eq!(field(status, STATUS_CODE).unwrap().varint(), Some(1));
        assert_eq!(field(status, STATUS_MESSAGE), None);
    }

    #[test]
    fn unknown_status_tag_writes_no_status() {
        let scope = Arc::new(InstrumentationScope::new("svc"));
        let mut data = span(&scope, "op");
        data.attributes = vec![KeyValue::new(STATUS_CODE_KEY, "broken")];

        let spans = spans_of(&serialize(SpanLimits::default(), &[data]));
        assert_eq!(field(&spans[0], SPAN_STATUS), None);
        assert_eq!(fields_numbered(&spans[0], SPAN_ATTRIBUTES).len(), 0);
    }

    #[test]
    fn event_and_link_limits() {
        let scope = Arc::new(InstrumentationScope::new("svc"));
        let mut data = span(&scope, "op");
        data.events = (0..3)
            .map(|index| SpanEvent::new("tick", index, [KeyValue::new("a", 1), KeyValue::new("b", 2)]))
            .collect();
        let linked = SpanContext::new(TraceId(5), SpanId(6), TraceFlags::default()).with_remote(true);
        data.links = vec![SpanLink::new(linked.clone(), Vec::new()), SpanLink::new(linked, Vec::new())];

        let limits = SpanLimits {
            event_count: 2,
            link_count: 1,
            event_attribute_count: 1,
            ..SpanLimits::default()
        };
        let spans = spans_of(&serialize(limits, &[data]));
        let span = &spans[0];

        let events = fields_numbered(span, SPAN_EVENTS);
        assert_eq!(events.len(), 2);
        assert_eq!(field(span, SPAN_DROPPED_EVENTS_COUNT).unwrap().varint(), Some(1));
        let event = events[0].bytes().unwrap();
        assert_eq!(field_numbers(event), vec![1, 2, 3, 4]);
        assert_eq!(field(event, EVENT_DROPPED_ATTRIBUTES_COUNT).unwrap().varint(), Some(1));

        let links = fields_numbered(span, SPAN_LINKS);
        assert_eq!(links.len(), 1);
        assert_eq!(field(span, SPAN_DROPPED_LINKS_COUNT).unwrap().varint(), Some(1));
        assert_eq!(
            field(links[0].bytes().unwrap(), LINK_FLAGS).unwrap().value,
            crate::test_helpers::FieldValue::Fixed32(0x300)
        );
    }

    #[test]
    fn spans_grouped_by_scope_in_first_seen_order() {
        let first = Arc::new(InstrumentationScope::new("first").with_schema_url("https://schema/1"));
        let second = Arc::new(InstrumentationScope::new("second"));
        let batch = [
            span(&first, "a"),
            span(&second, "b"),
            span(&first, "c"),
        ];

        let bytes = serialize(SpanLimits::default(), &batch);
        let resource_spans = field(&bytes, TRACES_DATA_RESOURCE_SPANS).unwrap().bytes().unwrap();
        let scopes = fields_numbered(resource_spans, RESOURCE_SPANS_SCOPE_SPANS);
        assert_eq!(scopes.len(), 2);

        let names: Vec<Vec<&str>> = scopes
            .iter()
            .map(|scope_spans| {
                fields_numbered(scope_spans.bytes().unwrap(), SCOPE_SPANS_SPANS)
                    .iter()
                    .map(|span| field(span.bytes().unwrap(), SPAN_NAME).unwrap().str().unwrap())
                    .collect()
            })
            .collect();
        assert_eq!(names, vec![vec!["a", "c"], vec!["b"]]);
        assert_eq!(
            field(scopes[0].bytes().unwrap(), SCOPE_SPANS_SCHEMA_URL).unwrap().str(),
            Some("https://schema/1")
        );
    }
}
