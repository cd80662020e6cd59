//! Log records, their pooling and their OTLP serialization.
//!
//! # Core Types
//!
//! - [`LogRecord`]: A log entry with severity, body, attributes and trace context.
//! - [`LogRecordPool`] and [`SharedLogRecord`]: Recycling of records between emitters and exporters.
//! - [`LogEmitter`]: Rents a record, lets the caller fill it and hands it to a processor.
//! - [`LogSerializer`]: Writes a batch of records as an OTLP `LogsData` message.
//!
//! # Body
//!
//! The exported body is the first of:
//! 1. the [formatted message](LogRecord::formatted_message),
//! 2. the string value of the [`ORIGINAL_FORMAT_KEY`] attribute,
//! 3. the explicit [body](LogRecord::body).
//!
//! The [`ORIGINAL_FORMAT_KEY`] attribute is exported as an ordinary attribute only when a formatted
//! message is set; otherwise it is dropped from the attributes.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::id::{SpanContext, SpanId, TraceFlags, TraceId};
use crate::resource::InstrumentationScope;
use crate::value::{KeyValue, Value};

mod emitter;
mod pool;
mod serialize;

pub use self::emitter::LogEmitter;
pub use self::pool::{
    DEFAULT_POOL_CAPACITY, LogRecordPool, MAX_RETAINED_ATTRIBUTES, MAX_RETAINED_SCOPE_ITEMS,
    PoolError, SharedLogRecord,
};
pub use self::serialize::{LogSerializer, LogSerializerOptions};

/// Attribute key holding the message template of a structured log.
pub const ORIGINAL_FORMAT_KEY: &str = "{OriginalFormat}";

/// Attribute key under which the event id is exported.
pub const EVENT_ID_ATTRIBUTE: &str = "logrecord.event.id";

/// Attribute key under which the event name is exported.
pub const EVENT_NAME_ATTRIBUTE: &str = "logrecord.event.name";

/// The OTLP severity number of a log record.
///
/// Each of the six levels has four steps, e.g. [`Severity::Info`] to [`Severity::Info4`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[expect(missing_docs, reason = "the variants are the OTLP severity steps")]
pub enum Severity {
    Trace = 1,
    Trace2,
    Trace3,
    Trace4,
    Debug,
    Debug2,
    Debug3,
    Debug4,
    Info,
    Info2,
    Info3,
    Info4,
    Warn,
    Warn2,
    Warn3,
    Warn4,
    Error,
    Error2,
    Error3,
    Error4,
    Fatal,
    Fatal2,
    Fatal3,
    Fatal4,
}

impl Severity {
    const ALL: [Severity; 24] = [
        Severity::Trace,
        Severity::Trace2,
        Severity::Trace3,
        Severity::Trace4,
        Severity::Debug,
        Severity::Debug2,
        Severity::Debug3,
        Severity::Debug4,
        Severity::Info,
        Severity::Info2,
        Severity::Info3,
        Severity::Info4,
        Severity::Warn,
        Severity::Warn2,
        Severity::Warn3,
        Severity::Warn4,
        Severity::Error,
        Severity::Error2,
        Severity::Error3,
        Severity::Error4,
        Severity::Fatal,
        Severity::Fatal2,
        Severity::Fatal3,
        Severity::Fatal4,
    ];

    /// Returns the severity with OTLP number `number`, 1 to 24.
    pub fn from_number(number: i32) -> Option<Self> {
        let index = usize::try_from(number).ok()?.checked_sub(1)?;
        Self::ALL.get(index).copied()
    }

    /// The OTLP severity number.
    pub fn number(self) -> i32 {
        self as i32
    }

    /// The short name exported as severity text, e.g. `INFO` or `WARN3`.
    pub fn short_name(self) -> &'static str {
        const NAMES: [&str; 24] = [
            "TRACE", "TRACE2", "TRACE3", "TRACE4", "DEBUG", "DEBUG2", "DEBUG3", "DEBUG4", "INFO",
            "INFO2", "INFO3", "INFO4", "WARN", "WARN2", "WARN3", "WARN4", "ERROR", "ERROR2",
            "ERROR3", "ERROR4", "FATAL", "FATAL2", "FATAL3", "FATAL4",
        ];
        NAMES[self as usize - 1]
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Identifies the kind of event a log record describes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventId {
    /// Numeric id, `0` if unset.
    pub id: i64,
    /// Event name.
    pub name: Option<Cow<'static, str>>,
}

/// An error attached to a log record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExceptionInfo {
    /// The error type, exported as `exception.type`.
    pub type_name: Cow<'static, str>,
    /// The error message, exported as `exception.message`.
    pub message: Cow<'static, str>,
    /// The rendered error with its causes, exported as `exception.stacktrace`.
    pub stack_trace: Cow<'static, str>,
}

impl ExceptionInfo {
    /// Captures `error` together with its chain of sources.
    pub fn from_error(type_name: impl Into<Cow<'static, str>>, error: &dyn std::error::Error) -> Self {
        let mut stack_trace = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            stack_trace.push_str("\nCaused by: ");
            stack_trace.push_str(&cause.to_string());
            source = cause.source();
        }

        Self {
            type_name: type_name.into(),
            message: error.to_string().into(),
            stack_trace: stack_trace.into(),
        }
    }
}

/// An attribute of an enclosing logging scope.
///
/// Items of the `n`-th scope are exported as `scope[n].key`.
#[derive(Clone, Debug, PartialEq)]
pub struct ScopeItem {
    /// Position of the scope, outermost first.
    pub scope: usize,
    /// The scope attribute.
    pub attribute: KeyValue,
}

/// A log entry.
///
/// Records are usually rented from a [`LogRecordPool`] through a [`LogEmitter`]; a record created
/// with [`LogRecord::default`] or cloned from another record is not pooled.
#[derive(Clone, Debug)]
pub struct LogRecord {
    /// When the event happened, in nanoseconds since the Unix epoch.
    pub timestamp: u64,
    /// When the event was observed, defaults to [`timestamp`](Self::timestamp) on the wire.
    pub observed_timestamp: Option<u64>,
    /// The trace active when the record was emitted.
    pub trace_id: TraceId,
    /// The span active when the record was emitted.
    pub span_id: SpanId,
    /// Flags of the active span.
    pub trace_flags: TraceFlags,
    /// Severity number.
    pub severity: Option<Severity>,
    /// Severity text; the severity's short name is exported if this is blank.
    pub severity_text: Option<String>,
    /// The message with its template placeholders filled in.
    pub formatted_message: Option<String>,
    /// The body set directly on the record.
    pub body: Option<Value>,
    /// Record attributes.
    pub attributes: Vec<KeyValue>,
    /// Event id and name.
    pub event_id: EventId,
    /// The error the record describes.
    pub exception: Option<ExceptionInfo>,
    /// Attributes of the enclosing logging scopes.
    pub scope_items: Vec<ScopeItem>,
    /// The scope that produced the record; records are grouped by its name.
    pub scope: Arc<InstrumentationScope>,
}

impl Default for LogRecord {
    fn default() -> Self {
        Self {
            timestamp: 0,
            observed_timestamp: None,
            trace_id: TraceId::INVALID,
            span_id: SpanId::INVALID,
            trace_flags: TraceFlags::default(),
            severity: None,
            severity_text: None,
            formatted_message: None,
            body: None,
            attributes: Vec::new(),
            event_id: EventId::default(),
            exception: None,
            scope_items: Vec::new(),
            scope: Arc::default(),
        }
    }
}

impl LogRecord {
    /// Sets the trace context the record was emitted in.
    pub fn set_span_context(&mut self, context: &SpanContext) {
        self.trace_id = context.trace_id;
        self.span_id = context.span_id;
        self.trace_flags = context.trace_flags;
    }

    /// Appends the attributes of one more enclosing scope, nested inside the previous ones.
    pub fn push_scope(&mut self, attributes: impl IntoIterator<Item = KeyValue>) {
        let scope = self.scope_items.last().map_or(0, |item| item.scope + 1);
        self.scope_items
            .extend(attributes.into_iter().map(|attribute| ScopeItem { scope, attribute }));
    }

    /// Resets every field for reuse, keeping collection allocations up to the retention limits.
    fn reset(&mut self) {
        self.timestamp = 0;
        self.observed_timestamp = None;
        self.trace_id = TraceId::INVALID;
        self.span_id = SpanId::INVALID;
        self.trace_flags = TraceFlags::default();
        self.severity = None;
        self.severity_text = None;
        self.formatted_message = None;
        self.body = None;
        self.event_id = EventId::default();
        self.exception = None;
        self.scope = Arc::default();

        if self.attributes.len() > MAX_RETAINED_ATTRIBUTES {
            self.attributes = Vec::new();
        } else {
            self.attributes.clear();
        }
        if self.scope_items.len() > MAX_RETAINED_SCOPE_ITEMS {
            self.scope_items = Vec::new();
        } else {
            self.scope_items.clear();
        }
    }
}

impl AsRef<LogRecord> for LogRecord {
    fn as_ref(&self) -> &LogRecord {
        self
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    #[test_case(1, Some(Severity::Trace))]
    #[test_case(9, Some(Severity::Info))]
    #[test_case(16, Some(Severity::Warn4))]
    #[test_case(24, Some(Severity::Fatal4))]
    #[test_case(0, None)]
    #[test_case(25, None)]
    #[test_case(-3, None)]
    fn severity_from_number(number: i32, expected: Option<Severity>) {
        assert_eq!(Severity::from_number(number), expected);
    }

    #[test]
    fn severity_names_follow_numbers() {
        for number in 1..=24 {
            let severity = Severity::from_number(number).unwrap();
            assert_eq!(severity.number(), number);
        }
        assert_eq!(Severity::Trace.short_name(), "TRACE");
        assert_eq!(Severity::Debug3.short_name(), "DEBUG3");
        assert_eq!(Severity::Error.to_string(), "ERROR");
        assert_eq!(Severity::Fatal4.short_name(), "FATAL4");
    }

    #[test]
    fn nested_scopes_are_numbered() {
        let mut record = LogRecord::default();
        record.push_scope([KeyValue::new("request", 1)]);
        record.push_scope([KeyValue::new("user", "ann"), KeyValue::new("tenant", "x")]);

        let scopes: Vec<usize> = record.scope_items.iter().map(|item| item.scope).collect();
        assert_eq!(scopes, vec![0, 1, 1]);
    }

    #[test]
    fn exception_from_error_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("request failed")]
        struct Outer(#[source] std::io::Error);

        let error = Outer(std::io::Error::other("connection reset"));
        let exception = ExceptionInfo::from_error("Outer", &error);

        assert_eq!(exception.message, "request failed");
        assert_eq!(exception.stack_trace, "request failed\nCaused by: connection reset");
    }

    #[test]
    fn reset_keeps_small_collections() {
        let mut record = LogRecord::default();
        record.attributes.reserve(16);
        record.attributes.push(KeyValue::new("a", 1));
        record.severity = Some(Severity::Info);
        record.reset();

        assert!(record.attributes.is_empty());
        assert!(record.attributes.capacity() >= 16);
        assert_eq!(record.severity, None);

        record.attributes = (0..=MAX_RETAINED_ATTRIBUTES as i64)
            .map(|index| KeyValue::new("key", index))
            .collect();
        record.scope_items = (0..=MAX_RETAINED_SCOPE_ITEMS)
            .map(|scope| ScopeItem {
                scope,
                attribute: KeyValue::new("key", "value"),
            })
            .collect();
        record.reset();

        assert_eq!(record.attributes.capacity(), 0);
        assert_eq!(record.scope_items.capacity(), 0);
    }
}
