//! Aggregated metrics and their OTLP serialization.
//!
//! # Core Types
//!
//! - [`Metric`]: One instrument's aggregated data points.
//! - [`MetricData`]: Gauge, sum, histogram or exponential histogram points.
//! - [`MetricSerializer`]: Writes a batch of metrics as an OTLP `MetricsData` message.
//!
//! # No recorded value
//!
//! A point with [`no_recorded_value`](NumberDataPoint::no_recorded_value) set marks a gap: the
//! instrument reported nothing since the last collection. Such points are skipped unless
//! [`MetricSerializerOptions::emit_no_recorded_value`] is set, in which case they are written
//! without a value or start time and with the `FLAG_NO_RECORDED_VALUE` data point flag.

use std::borrow::Cow;
use std::sync::Arc;

use crate::id::{SpanId, TraceId};
use crate::resource::InstrumentationScope;
use crate::value::KeyValue;

mod serialize;

pub use self::serialize::{MetricSerializer, MetricSerializerOptions};

/// Whether reported values are deltas or running totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Temporality {
    /// Each value covers the time since the previous collection.
    Delta = 1,
    /// Each value covers the time since the instrument was created.
    #[default]
    Cumulative = 2,
}

/// A long or double measurement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NumberValue {
    /// A 64-bit integer measurement.
    I64(i64),
    /// A double measurement.
    F64(f64),
}

impl Default for NumberValue {
    fn default() -> Self {
        NumberValue::I64(0)
    }
}

/// A sampled raw measurement attached to an aggregated point.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Exemplar {
    /// Attributes of the measurement that the aggregation filtered out.
    pub filtered_attributes: Vec<KeyValue>,
    /// When the measurement was taken, in nanoseconds since the Unix epoch.
    pub time_unix_nano: u64,
    /// The measured value.
    pub value: NumberValue,
    /// The trace active during the measurement.
    pub trace_id: TraceId,
    /// The span active during the measurement, [`SpanId::INVALID`] if none.
    pub span_id: SpanId,
}

/// A gauge or sum data point.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NumberDataPoint {
    /// Attributes identifying the time series.
    pub attributes: Vec<KeyValue>,
    /// Start of the aggregation window.
    pub start_time_unix_nano: u64,
    /// End of the aggregation window.
    pub time_unix_nano: u64,
    /// The aggregated value.
    pub value: NumberValue,
    /// Sampled measurements.
    pub exemplars: Vec<Exemplar>,
    /// The instrument recorded nothing in this window.
    pub no_recorded_value: bool,
}

/// An explicit-bucket histogram data point.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistogramDataPoint {
    /// Attributes identifying the time series.
    pub attributes: Vec<KeyValue>,
    /// Start of the aggregation window.
    pub start_time_unix_nano: u64,
    /// End of the aggregation window.
    pub time_unix_nano: u64,
    /// Number of measurements.
    pub count: u64,
    /// Sum of the measurements.
    pub sum: f64,
    /// Smallest measurement, if tracked.
    pub min: Option<f64>,
    /// Largest measurement, if tracked.
    pub max: Option<f64>,
    /// Upper bounds of the buckets; infinite bounds are not exported.
    pub explicit_bounds: Vec<f64>,
    /// Count per bucket, one more than there are finite bounds.
    pub bucket_counts: Vec<u64>,
    /// Sampled measurements.
    pub exemplars: Vec<Exemplar>,
    /// The instrument recorded nothing in this window.
    pub no_recorded_value: bool,
}

/// A contiguous range of exponential histogram buckets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExponentialBuckets {
    /// Index of the first bucket.
    pub offset: i32,
    /// Count per bucket, starting at `offset`.
    pub bucket_counts: Vec<u64>,
}

/// An exponential histogram data point.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExponentialHistogramDataPoint {
    /// Attributes identifying the time series.
    pub attributes: Vec<KeyValue>,
    /// Start of the aggregation window.
    pub start_time_unix_nano: u64,
    /// End of the aggregation window.
    pub time_unix_nano: u64,
    /// Number of measurements.
    pub count: u64,
    /// Sum of the measurements.
    pub sum: f64,
    /// Smallest measurement, if tracked.
    pub min: Option<f64>,
    /// Largest measurement, if tracked.
    pub max: Option<f64>,
    /// Resolution of the buckets.
    pub scale: i32,
    /// Number of measurements within the zero threshold.
    pub zero_count: u64,
    /// Width of the zero bucket, not exported when zero.
    pub zero_threshold: f64,
    /// Buckets for positive measurements.
    pub positive: ExponentialBuckets,
    /// Buckets for negative measurements, not exported when empty.
    pub negative: ExponentialBuckets,
    /// Sampled measurements.
    pub exemplars: Vec<Exemplar>,
    /// The instrument recorded nothing in this window.
    pub no_recorded_value: bool,
}

/// The aggregated points of a metric.
#[derive(Clone, Debug, PartialEq)]
pub enum MetricData {
    /// Last-value points.
    Gauge(Vec<NumberDataPoint>),
    /// Summed points.
    Sum {
        /// The points.
        points: Vec<NumberDataPoint>,
        /// Delta or cumulative.
        temporality: Temporality,
        /// Whether the sum only ever increases.
        is_monotonic: bool,
    },
    /// Explicit-bucket histogram points.
    Histogram {
        /// The points.
        points: Vec<HistogramDataPoint>,
        /// Delta or cumulative.
        temporality: Temporality,
    },
    /// Exponential histogram points.
    ExponentialHistogram {
        /// The points.
        points: Vec<ExponentialHistogramDataPoint>,
        /// Delta or cumulative.
        temporality: Temporality,
    },
}

impl Default for MetricData {
    fn default() -> Self {
        MetricData::Gauge(Vec::new())
    }
}

/// One instrument's aggregated data.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metric {
    /// The meter that owns the instrument; metrics are grouped by its name.
    pub scope: Arc<InstrumentationScope>,
    /// The instrument name.
    pub name: Cow<'static, str>,
    /// The instrument description.
    pub description: Option<Cow<'static, str>>,
    /// The unit of the values.
    pub unit: Option<Cow<'static, str>>,
    /// The points.
    pub data: MetricData,
}
