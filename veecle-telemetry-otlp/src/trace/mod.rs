//! Finished spans and their OTLP serialization.
//!
//! # Core Types
//!
//! - [`SpanData`]: A finished span, ready for export.
//! - [`SpanEvent`] and [`SpanLink`]: Timestamped annotations and references to other spans.
//! - [`Status`]: The status recorded through the SDK.
//! - [`TraceSerializer`]: Writes a batch of spans as an OTLP `TracesData` message.
//!
//! # Status
//!
//! Besides the SDK-level [`Status`], spans may carry the legacy `otel.status_code` and
//! `otel.status_description` attributes. Those two keys are never exported as attributes. They
//! decide the exported status only when the SDK-level status is [`Status::Unset`].

use std::borrow::Cow;
use std::sync::Arc;

use crate::id::{SpanContext, SpanId};
use crate::resource::InstrumentationScope;
use crate::value::KeyValue;

mod serialize;

pub use self::serialize::TraceSerializer;

/// Attribute key carrying a legacy status code.
pub const STATUS_CODE_KEY: &str = "otel.status_code";

/// Attribute key carrying a legacy status description.
pub const STATUS_DESCRIPTION_KEY: &str = "otel.status_description";

/// The role of a span in a trace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpanKind {
    /// An internal operation.
    #[default]
    Internal,
    /// The server side of a synchronous request.
    Server,
    /// The client side of a synchronous request.
    Client,
    /// The sender of an asynchronous message.
    Producer,
    /// The receiver of an asynchronous message.
    Consumer,
}

impl SpanKind {
    /// The OTLP `SpanKind` enum value.
    pub fn wire_value(self) -> i32 {
        match self {
            SpanKind::Internal => 1,
            SpanKind::Server => 2,
            SpanKind::Client => 3,
            SpanKind::Producer => 4,
            SpanKind::Consumer => 5,
        }
    }
}

/// The OTLP status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCode {
    /// No status was set.
    Unset = 0,
    /// The operation completed successfully.
    Ok = 1,
    /// The operation failed.
    Error = 2,
}

impl StatusCode {
    /// Parses the value of an `otel.status_code` attribute, ignoring case.
    pub fn from_tag(value: &str) -> Option<Self> {
        [StatusCode::Unset, StatusCode::Error, StatusCode::Ok]
            .into_iter()
            .find(|code| value.eq_ignore_ascii_case(code.name()))
    }

    /// The upper-case name used in `otel.status_code` attributes.
    pub fn name(self) -> &'static str {
        match self {
            StatusCode::Unset => "UNSET",
            StatusCode::Ok => "OK",
            StatusCode::Error => "ERROR",
        }
    }
}

/// The status of a span as recorded through the SDK.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Status {
    /// No status was recorded.
    #[default]
    Unset,
    /// The operation completed successfully.
    Ok,
    /// The operation failed.
    Error {
        /// What went wrong.
        description: Option<Cow<'static, str>>,
    },
}

/// A timestamped annotation on a span.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanEvent {
    /// The event name.
    pub name: Cow<'static, str>,
    /// When the event happened, in nanoseconds since the Unix epoch.
    pub time_unix_nano: u64,
    /// Attributes of the event.
    pub attributes: Vec<KeyValue>,
}

impl SpanEvent {
    /// Creates an event.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        time_unix_nano: u64,
        attributes: impl IntoIterator<Item = KeyValue>,
    ) -> Self {
        Self {
            name: name.into(),
            time_unix_nano,
            attributes: attributes.into_iter().collect(),
        }
    }
}

/// A reference from a span to another span.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanLink {
    /// The linked span.
    pub context: SpanContext,
    /// Attributes of the link.
    pub attributes: Vec<KeyValue>,
}

impl SpanLink {
    /// Creates a link.
    pub fn new(context: SpanContext, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        Self {
            context,
            attributes: attributes.into_iter().collect(),
        }
    }
}

/// A finished span.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanData {
    /// The scope that produced the span.
    pub scope: Arc<InstrumentationScope>,
    /// Trace id, span id, flags and trace state of the span.
    pub context: SpanContext,
    /// The parent span, [`SpanId::INVALID`] for root spans.
    pub parent_span_id: SpanId,
    /// Whether the parent was propagated from a remote process.
    pub parent_is_remote: bool,
    /// The operation name.
    pub name: Cow<'static, str>,
    /// The role of the span.
    pub kind: SpanKind,
    /// Start time in nanoseconds since the Unix epoch.
    pub start_time_unix_nano: u64,
    /// End time in nanoseconds since the Unix epoch.
    pub end_time_unix_nano: u64,
    /// Span attributes.
    pub attributes: Vec<KeyValue>,
    /// Span events.
    pub events: Vec<SpanEvent>,
    /// Span links.
    pub links: Vec<SpanLink>,
    /// The SDK-level status.
    pub status: Status,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("ERROR", Some(StatusCode::Error))]
    #[test_case("error", Some(StatusCode::Error))]
    #[test_case("Ok", Some(StatusCode::Ok))]
    #[test_case("unset", Some(StatusCode::Unset))]
    #[test_case("failed", None)]
    #[test_case("", None)]
    fn status_code_from_tag(value: &str, expected: Option<StatusCode>) {
        assert_eq!(StatusCode::from_tag(value), expected);
    }
}
