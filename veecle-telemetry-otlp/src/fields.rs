//! Field numbers of the OTLP `common`, `resource`, `trace`, `metrics` and `logs` v1 messages.
//!
//! These are part of the wire contract and must not change.

pub(crate) mod common {
    pub(crate) const ANY_VALUE_STRING: u32 = 1;
    pub(crate) const ANY_VALUE_BOOL: u32 = 2;
    pub(crate) const ANY_VALUE_INT: u32 = 3;
    pub(crate) const ANY_VALUE_DOUBLE: u32 = 4;
    pub(crate) const ANY_VALUE_ARRAY: u32 = 5;
    pub(crate) const ANY_VALUE_KVLIST: u32 = 6;
    pub(crate) const ANY_VALUE_BYTES: u32 = 7;

    pub(crate) const ARRAY_VALUE_VALUES: u32 = 1;
    pub(crate) const KEY_VALUE_LIST_VALUES: u32 = 1;

    pub(crate) const KEY_VALUE_KEY: u32 = 1;
    pub(crate) const KEY_VALUE_VALUE: u32 = 2;

    pub(crate) const SCOPE_NAME: u32 = 1;
    pub(crate) const SCOPE_VERSION: u32 = 2;
    pub(crate) const SCOPE_ATTRIBUTES: u32 = 3;
    pub(crate) const SCOPE_DROPPED_ATTRIBUTES_COUNT: u32 = 4;

    pub(crate) const RESOURCE_ATTRIBUTES: u32 = 1;
    pub(crate) const RESOURCE_DROPPED_ATTRIBUTES_COUNT: u32 = 2;
}

pub(crate) mod trace {
    pub(crate) const TRACES_DATA_RESOURCE_SPANS: u32 = 1;

    pub(crate) const RESOURCE_SPANS_RESOURCE: u32 = 1;
    pub(crate) const RESOURCE_SPANS_SCOPE_SPANS: u32 = 2;
    pub(crate) const RESOURCE_SPANS_SCHEMA_URL: u32 = 3;

    pub(crate) const SCOPE_SPANS_SCOPE: u32 = 1;
    pub(crate) const SCOPE_SPANS_SPANS: u32 = 2;
    pub(crate) const SCOPE_SPANS_SCHEMA_URL: u32 = 3;

    pub(crate) const SPAN_TRACE_ID: u32 = 1;
    pub(crate) const SPAN_SPAN_ID: u32 = 2;
    pub(crate) const SPAN_TRACE_STATE: u32 = 3;
    pub(crate) const SPAN_PARENT_SPAN_ID: u32 = 4;
    pub(crate) const SPAN_NAME: u32 = 5;
    pub(crate) const SPAN_KIND: u32 = 6;
    pub(crate) const SPAN_START_TIME_UNIX_NANO: u32 = 7;
    pub(crate) const SPAN_END_TIME_UNIX_NANO: u32 = 8;
    pub(crate) const SPAN_ATTRIBUTES: u32 = 9;
    pub(crate) const SPAN_DROPPED_ATTRIBUTES_COUNT: u32 = 10;
    pub(crate) const SPAN_EVENTS: u32 = 11;
    pub(crate) const SPAN_DROPPED_EVENTS_COUNT: u32 = 12;
    pub(crate) const SPAN_LINKS: u32 = 13;
    pub(crate) const SPAN_DROPPED_LINKS_COUNT: u32 = 14;
    pub(crate) const SPAN_STATUS: u32 = 15;
    pub(crate) const SPAN_FLAGS: u32 = 16;

    pub(crate) const EVENT_TIME_UNIX_NANO: u32 = 1;
    pub(crate) const EVENT_NAME: u32 = 2;
    pub(crate) const EVENT_ATTRIBUTES: u32 = 3;
    pub(crate) const EVENT_DROPPED_ATTRIBUTES_COUNT: u32 = 4;

    pub(crate) const LINK_TRACE_ID: u32 = 1;
    pub(crate) const LINK_SPAN_ID: u32 = 2;
    pub(crate) const LINK_TRACE_STATE: u32 = 3;
    pub(crate) const LINK_ATTRIBUTES: u32 = 4;
    pub(crate) const LINK_DROPPED_ATTRIBUTES_COUNT: u32 = 5;
    pub(crate) const LINK_FLAGS: u32 = 6;

    pub(crate) const STATUS_MESSAGE: u32 = 2;
    pub(crate) const STATUS_CODE: u32 = 3;

    pub(crate) const SPAN_FLAGS_CONTEXT_HAS_IS_REMOTE: u32 = 0x100;
    pub(crate) const SPAN_FLAGS_CONTEXT_IS_REMOTE: u32 = 0x200;
}

pub(crate) mod metrics {
    pub(crate) const METRICS_DATA_RESOURCE_METRICS: u32 = 1;

    pub(crate) const RESOURCE_METRICS_RESOURCE: u32 = 1;
    pub(crate) const RESOURCE_METRICS_SCOPE_METRICS: u32 = 2;
    pub(crate) const RESOURCE_METRICS_SCHEMA_URL: u32 = 3;

    pub(crate) const SCOPE_METRICS_SCOPE: u32 = 1;
    pub(crate) const SCOPE_METRICS_METRICS: u32 = 2;
    pub(crate) const SCOPE_METRICS_SCHEMA_URL: u32 = 3;

    pub(crate) const METRIC_NAME: u32 = 1;
    pub(crate) const METRIC_DESCRIPTION: u32 = 2;
    pub(crate) const METRIC_UNIT: u32 = 3;
    pub(crate) const METRIC_GAUGE: u32 = 5;
    pub(crate) const METRIC_SUM: u32 = 7;
    pub(crate) const METRIC_HISTOGRAM: u32 = 9;
    pub(crate) const METRIC_EXPONENTIAL_HISTOGRAM: u32 = 10;

    pub(crate) const GAUGE_DATA_POINTS: u32 = 1;

    pub(crate) const SUM_DATA_POINTS: u32 = 1;
    pub(crate) const SUM_AGGREGATION_TEMPORALITY: u32 = 2;
    pub(crate) const SUM_IS_MONOTONIC: u32 = 3;

    pub(crate) const HISTOGRAM_DATA_POINTS: u32 = 1;
    pub(crate) const HISTOGRAM_AGGREGATION_TEMPORALITY: u32 = 2;

    pub(crate) const NUMBER_DATA_POINT_START_TIME_UNIX_NANO: u32 = 2;
    pub(crate) const NUMBER_DATA_POINT_TIME_UNIX_NANO: u32 = 3;
    pub(crate) const NUMBER_DATA_POINT_AS_DOUBLE: u32 = 4;
    pub(crate) const NUMBER_DATA_POINT_EXEMPLARS: u32 = 5;
    pub(crate) const NUMBER_DATA_POINT_AS_INT: u32 = 6;
    pub(crate) const NUMBER_DATA_POINT_ATTRIBUTES: u32 = 7;
    pub(crate) const NUMBER_DATA_POINT_FLAGS: u32 = 8;

    pub(crate) const HISTOGRAM_DATA_POINT_START_TIME_UNIX_NANO: u32 = 2;
    pub(crate) const HISTOGRAM_DATA_POINT_TIME_UNIX_NANO: u32 = 3;
    pub(crate) const HISTOGRAM_DATA_POINT_COUNT: u32 = 4;
    pub(crate) const HISTOGRAM_DATA_POINT_SUM: u32 = 5;
    pub(crate) const HISTOGRAM_DATA_POINT_BUCKET_COUNTS: u32 = 6;
    pub(crate) const HISTOGRAM_DATA_POINT_EXPLICIT_BOUNDS: u32 = 7;
    pub(crate) const HISTOGRAM_DATA_POINT_EXEMPLARS: u32 = 8;
    pub(crate) const HISTOGRAM_DATA_POINT_ATTRIBUTES: u32 = 9;
    pub(crate) const HISTOGRAM_DATA_POINT_FLAGS: u32 = 10;
    pub(crate) const HISTOGRAM_DATA_POINT_MIN: u32 = 11;
    pub(crate) const HISTOGRAM_DATA_POINT_MAX: u32 = 12;

    pub(crate) const EXPONENTIAL_HISTOGRAM_DATA_POINT_ATTRIBUTES: u32 = 1;
    pub(crate) const EXPONENTIAL_HISTOGRAM_DATA_POINT_START_TIME_UNIX_NANO: u32 = 2;
    pub(crate) const EXPONENTIAL_HISTOGRAM_DATA_POINT_TIME_UNIX_NANO: u32 = 3;
    pub(crate) const EXPONENTIAL_HISTOGRAM_DATA_POINT_COUNT: u32 = 4;
    pub(crate) const EXPONENTIAL_HISTOGRAM_DATA_POINT_SUM: u32 = 5;
    pub(crate) const EXPONENTIAL_HISTOGRAM_DATA_POINT_SCALE: u32 = 6;
    pub(crate) const EXPONENTIAL_HISTOGRAM_DATA_POINT_ZERO_COUNT: u32 = 7;
    pub(crate) const EXPONENTIAL_HISTOGRAM_DATA_POINT_POSITIVE: u32 = 8;
    pub(crate) const EXPONENTIAL_HISTOGRAM_DATA_POINT_NEGATIVE: u32 = 9;
    pub(crate) const EXPONENTIAL_HISTOGRAM_DATA_POINT_FLAGS: u32 = 10;
    pub(crate) const EXPONENTIAL_HISTOGRAM_DATA_POINT_EXEMPLARS: u32 = 11;
    pub(crate) const EXPONENTIAL_HISTOGRAM_DATA_POINT_MIN: u32 = 12;
    pub(crate) const EXPONENTIAL_HISTOGRAM_DATA_POINT_MAX: u32 = 13;
    pub(crate) const EXPONENTIAL_HISTOGRAM_DATA_POINT_ZERO_THRESHOLD: u32 = 14;

    pub(crate) const BUCKETS_OFFSET: u32 = 1;
    pub(crate) const BUCKETS_BUCKET_COUNTS: u32 = 2;

    pub(crate) const EXEMPLAR_TIME_UNIX_NANO: u32 = 2;
    pub(crate) const EXEMPLAR_AS_DOUBLE: u32 = 3;
    pub(crate) const EXEMPLAR_SPAN_ID: u32 = 4;
    pub(crate) const EXEMPLAR_TRACE_ID: u32 = 5;
    pub(crate) const EXEMPLAR_AS_INT: u32 = 6;
    pub(crate) const EXEMPLAR_FILTERED_ATTRIBUTES: u32 = 7;

    pub(crate) const DATA_POINT_FLAGS_NO_RECORDED_VALUE: u32 = 1;
}

pub(crate) mod logs {
    pub(crate) const LOGS_DATA_RESOURCE_LOGS: u32 = 1;

    pub(crate) const RESOURCE_LOGS_RESOURCE: u32 = 1;
    pub(crate) const RESOURCE_LOGS_SCOPE_LOGS: u32 = 2;
    pub(crate) const RESOURCE_LOGS_SCHEMA_URL: u32 = 3;

    pub(crate) const SCOPE_LOGS_SCOPE: u32 = 1;
    pub(crate) const SCOPE_LOGS_LOG_RECORDS: u32 = 2;
    pub(crate) const SCOPE_LOGS_SCHEMA_URL: u32 = 3;

    pub(crate) const LOG_RECORD_TIME_UNIX_NANO: u32 = 1;
    pub(crate) const LOG_RECORD_SEVERITY_NUMBER: u32 = 2;
    pub(crate) const LOG_RECORD_SEVERITY_TEXT: u32 = 3;
    pub(crate) const LOG_RECORD_BODY: u32 = 5;
    pub(crate) const LOG_RECORD_ATTRIBUTES: u32 = 6;
    pub(crate) const LOG_RECORD_DROPPED_ATTRIBUTES_COUNT: u32 = 7;
    pub(crate) const LOG_RECORD_FLAGS: u32 = 8;
    pub(crate) const LOG_RECORD_TRACE_ID: u32 = 9;
    pub(crate) const LOG_RECORD_SPAN_ID: u32 = 10;
    pub(crate) const LOG_RECORD_OBSERVED_TIME_UNIX_NANO: u32 = 11;
    pub(crate) const LOG_RECORD_EVENT_NAME: u32 = 12;
}
