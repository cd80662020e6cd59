//! Count and length limits applied while serializing records.
//!
//! Limits resolve from, in order of precedence: an explicit value, a signal-specific environment
//! variable, the generic environment variable, the default.
//!
//! | Limit                          | Variables                                                               | Default   |
//! |--------------------------------|-------------------------------------------------------------------------|-----------|
//! | span attribute value length    | `OTEL_SPAN_ATTRIBUTE_VALUE_LENGTH_LIMIT`, `OTEL_ATTRIBUTE_VALUE_LENGTH_LIMIT` | unlimited |
//! | span attribute count           | `OTEL_SPAN_ATTRIBUTE_COUNT_LIMIT`, `OTEL_ATTRIBUTE_COUNT_LIMIT`         | 128       |
//! | span event count               | `OTEL_SPAN_EVENT_COUNT_LIMIT`                                           | 128       |
//! | span link count                | `OTEL_SPAN_LINK_COUNT_LIMIT`                                            | 128       |
//! | event attribute count          | `OTEL_EVENT_ATTRIBUTE_COUNT_LIMIT`, `OTEL_ATTRIBUTE_COUNT_LIMIT`        | 128       |
//! | link attribute count           | `OTEL_LINK_ATTRIBUTE_COUNT_LIMIT`, `OTEL_ATTRIBUTE_COUNT_LIMIT`         | 128       |
//! | log attribute value length     | `OTEL_LOGRECORD_ATTRIBUTE_VALUE_LENGTH_LIMIT`, `OTEL_ATTRIBUTE_VALUE_LENGTH_LIMIT` | unlimited |
//! | log attribute count            | `OTEL_LOGRECORD_ATTRIBUTE_COUNT_LIMIT`, `OTEL_ATTRIBUTE_COUNT_LIMIT`    | 128       |

use crate::env::{process_env, read_usize};

/// The default for every count limit.
pub const DEFAULT_COUNT_LIMIT: usize = 128;

/// Limits for spans, their events and links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanLimits {
    /// Maximum string value length in characters.
    pub attribute_value_length: Option<usize>,
    /// Maximum number of span attributes.
    pub attribute_count: usize,
    /// Maximum number of events per span.
    pub event_count: usize,
    /// Maximum number of links per span.
    pub link_count: usize,
    /// Maximum number of attributes per event.
    pub event_attribute_count: usize,
    /// Maximum number of attributes per link.
    pub link_attribute_count: usize,
}

impl Default for SpanLimits {
    fn default() -> Self {
        Self {
            attribute_value_length: None,
            attribute_count: DEFAULT_COUNT_LIMIT,
            event_count: DEFAULT_COUNT_LIMIT,
            link_count: DEFAULT_COUNT_LIMIT,
            event_attribute_count: DEFAULT_COUNT_LIMIT,
            link_attribute_count: DEFAULT_COUNT_LIMIT,
        }
    }
}

/// Limits for log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecordLimits {
    /// Maximum string value length in characters.
    pub attribute_value_length: Option<usize>,
    /// Maximum number of attributes, scope items included.
    pub attribute_count: usize,
}

impl Default for LogRecordLimits {
    fn default() -> Self {
        Self {
            attribute_value_length: None,
            attribute_count: DEFAULT_COUNT_LIMIT,
        }
    }
}

/// Limits for every signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SdkLimits {
    /// Span limits.
    pub span: SpanLimits,
    /// Log record limits.
    pub log_record: LogRecordLimits,
}

impl SdkLimits {
    /// Resolves the limits from the process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(process_env)
    }

    /// Resolves the limits through `lookup`.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let value_length = read_usize(&lookup, "OTEL_ATTRIBUTE_VALUE_LENGTH_LIMIT");
        let count = read_usize(&lookup, "OTEL_ATTRIBUTE_COUNT_LIMIT");
        let count_or = |name: &str, generic: Option<usize>| {
            read_usize(&lookup, name)
                .or(generic)
                .unwrap_or(DEFAULT_COUNT_LIMIT)
        };

        Self {
            span: SpanLimits {
                attribute_value_length: read_usize(&lookup, "OTEL_SPAN_ATTRIBUTE_VALUE_LENGTH_LIMIT")
                    .or(value_length),
                attribute_count: count_or("OTEL_SPAN_ATTRIBUTE_COUNT_LIMIT", count),
                event_count: count_or("OTEL_SPAN_EVENT_COUNT_LIMIT", None),
                link_count: count_or("OTEL_SPAN_LINK_COUNT_LIMIT", None),
                event_attribute_count: count_or("OTEL_EVENT_ATTRIBUTE_COUNT_LIMIT", count),
                link_attribute_count: count_or("OTEL_LINK_ATTRIBUTE_COUNT_LIMIT", count),
            },
            log_record: LogRecordLimits {
                attribute_value_length: read_usize(
                    &lookup,
                    "OTEL_LOGRECORD_ATTRIBUTE_VALUE_LENGTH_LIMIT",
                )
                .or(value_length),
                attribute_count: count_or("OTEL_LOGRECORD_ATTRIBUTE_COUNT_LIMIT", count),
            },
        }
    }
}
