use crate::attribute::{AttributeWriter, LimitedAttributes, UnsupportedValueHook};
use crate::encode::{EncodeError, ProtoBuffer, WireType};
use crate::fields::metrics::*;
use crate::resource::{Resource, write_resource, write_scope};
use crate::scope_groups::ScopeGroups;
use crate::value::KeyValue;

use super::{
    Exemplar, ExponentialBuckets, ExponentialHistogramDataPoint, HistogramDataPoint, Metric,
    MetricData, NumberDataPoint, NumberValue, Temporality,
};

/// Options of a [`MetricSerializer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricSerializerOptions {
    /// Write points without a recorded value as flagged gaps instead of skipping them.
    pub emit_no_recorded_value: bool,
}

/// Writes batches of metrics as OTLP `MetricsData` messages.
///
/// Metrics are grouped by meter name. The first metric of a group supplies the version,
/// attributes and schema url of the scope block.
#[derive(Debug)]
pub struct MetricSerializer {
    options: MetricSerializerOptions,
    attributes: AttributeWriter,
    groups: ScopeGroups,
}

impl MetricSerializer {
    /// Creates a serializer.
    pub fn new(options: MetricSerializerOptions) -> Self {
        Self {
            options,
            attributes: AttributeWriter::default(),
            groups: ScopeGroups::default(),
        }
    }

    /// Replaces the hook notified about attributes with unsupported values.
    pub fn with_unsupported_value_hook(mut self, hook: UnsupportedValueHook) -> Self {
        self.attributes = self.attributes.with_unsupported_value_hook(hook);
        self
    }

    /// Appends one `ResourceMetrics` entry holding `metrics` to `buffer`.
    pub fn serialize(
        &mut self,
        buffer: &mut ProtoBuffer,
        resource: &Resource,
        metrics: &[Metric],
    ) -> Result<(), EncodeError> {
        self.groups.group(metrics.iter().map(|metric| &metric.scope.name));

        let result = buffer.write_with_retry(|buffer| {
            buffer.write_message(METRICS_DATA_RESOURCE_METRICS, |buffer| {
                self.write_resource_metrics(buffer, resource, metrics)
            })
        });

        self.groups.clear();
        result
    }

    fn write_resource_metrics(
        &self,
        buffer: &mut ProtoBuffer,
        resource: &Resource,
        metrics: &[Metric],
    ) -> Result<(), EncodeError> {
        write_resource(buffer, &self.attributes, RESOURCE_METRICS_RESOURCE, resource)?;

        for group in self.groups.iter() {
            let scope = &metrics[group[0]].scope;
            buffer.write_message(RESOURCE_METRICS_SCOPE_METRICS, |buffer| {
                write_scope(buffer, &self.attributes, SCOPE_METRICS_SCOPE, scope, usize::MAX)?;
                for index in group {
                    buffer.write_message(SCOPE_METRICS_METRICS, |buffer| {
                        self.write_metric(buffer, &metrics[*index])
                    })?;
                }
                if let Some(schema_url) = &scope.schema_url {
                    buffer.write_string(SCOPE_METRICS_SCHEMA_URL, schema_url)?;
                }
                Ok(())
            })?;
        }

        if let Some(schema_url) = &resource.schema_url {
            buffer.write_string(RESOURCE_METRICS_SCHEMA_URL, schema_url)?;
        }
        Ok(())
    }

    fn write_metric(&self, buffer: &mut ProtoBuffer, metric: &Metric) -> Result<(), EncodeError> {
        buffer.write_string(METRIC_NAME, &metric.name)?;
        if let Some(description) = &metric.description {
            buffer.write_string(METRIC_DESCRIPTION, description)?;
        }
        if let Some(unit) = &metric.unit {
            buffer.write_string(METRIC_UNIT, unit)?;
        }

        match &metric.data {
            MetricData::Gauge(points) => buffer.write_message(METRIC_GAUGE, |buffer| {
                self.write_number_points(buffer, GAUGE_DATA_POINTS, points)
            }),
            MetricData::Sum {
                points,
                temporality,
                is_monotonic,
            } => buffer.write_message(METRIC_SUM, |buffer| {
                self.write_number_points(buffer, SUM_DATA_POINTS, points)?;
                write_temporality(buffer, SUM_AGGREGATION_TEMPORALITY, *temporality)?;
                buffer.write_bool(SUM_IS_MONOTONIC, *is_monotonic)
            }),
            MetricData::Histogram {
                points,
                temporality,
            } => buffer.write_message(METRIC_HISTOGRAM, |buffer| {
                for point in points.iter().filter(|point| self.should_write(point.no_recorded_value)) {
                    buffer.write_message(HISTOGRAM_DATA_POINTS, |buffer| {
                        self.write_histogram_point(buffer, point)
                    })?;
                }
                write_temporality(buffer, HISTOGRAM_AGGREGATION_TEMPORALITY, *temporality)
            }),
            MetricData::ExponentialHistogram {
                points,
                temporality,
            } => buffer.write_message(METRIC_EXPONENTIAL_HISTOGRAM, |buffer| {
                for point in points.iter().filter(|point| self.should_write(point.no_recorded_value)) {
                    buffer.write_message(HISTOGRAM_DATA_POINTS, |buffer| {
                        self.write_exponential_histogram_point(buffer, point)
                    })?;
                }
                write_temporality(buffer, HISTOGRAM_AGGREGATION_TEMPORALITY, *temporality)
            }),
        }
    }

    fn should_write(&self, no_recorded_value: bool) -> bool {
        !no_recorded_value || self.options.emit_no_recorded_value
    }

    fn write_number_points(
        &self,
        buffer: &mut ProtoBuffer,
        field_number: u32,
        points: &[NumberDataPoint],
    ) -> Result<(), EncodeError> {
        for point in points.iter().filter(|point| self.should_write(point.no_recorded_value)) {
            buffer.write_message(field_number, |buffer| self.write_number_point(buffer, point))?;
        }
        Ok(())
    }

    fn write_number_point(
        &self,
        buffer: &mut ProtoBuffer,
        point: &NumberDataPoint,
    ) -> Result<(), EncodeError> {
        if point.no_recorded_value {
            buffer.write_fixed64_field(NUMBER_DATA_POINT_TIME_UNIX_NANO, point.time_unix_nano)?;
            self.write_point_attributes(buffer, NUMBER_DATA_POINT_ATTRIBUTES, &point.attributes)?;
            return buffer.write_uint64(
                NUMBER_DATA_POINT_FLAGS,
                DATA_POINT_FLAGS_NO_RECORDED_VALUE.into(),
            );
        }

        buffer.write_fixed64_field(
            NUMBER_DATA_POINT_START_TIME_UNIX_NANO,
            point.start_time_unix_nano,
        )?;
        buffer.write_fixed64_field(NUMBER_DATA_POINT_TIME_UNIX_NANO, point.time_unix_nano)?;
        match point.value {
            NumberValue::I64(value) => buffer.write_sfixed64(NUMBER_DATA_POINT_AS_INT, value)?,
            NumberValue::F64(value) => buffer.write_double(NUMBER_DATA_POINT_AS_DOUBLE, value)?,
        }
        self.write_point_attributes(buffer, NUMBER_DATA_POINT_ATTRIBUTES, &point.attributes)?;
        self.write_exemplars(buffer, NUMBER_DATA_POINT_EXEMPLARS, &point.exemplars)
    }

    fn write_histogram_point(
        &self,
        buffer: &mut ProtoBuffer,
        point: &HistogramDataPoint,
    ) -> Result<(), EncodeError> {
        if point.no_recorded_value {
            buffer.write_fixed64_field(HISTOGRAM_DATA_POINT_TIME_UNIX_NANO, point.time_unix_nano)?;
            self.write_point_attributes(buffer, HISTOGRAM_DATA_POINT_ATTRIBUTES, &point.attributes)?;
            return buffer.write_uint64(
                HISTOGRAM_DATA_POINT_FLAGS,
                DATA_POINT_FLAGS_NO_RECORDED_VALUE.into(),
            );
        }

        buffer.write_fixed64_field(
            HISTOGRAM_DATA_POINT_START_TIME_UNIX_NANO,
            point.start_time_unix_nano,
        )?;
        buffer.write_fixed64_field(HISTOGRAM_DATA_POINT_TIME_UNIX_NANO, point.time_unix_nano)?;
        self.write_point_attributes(buffer, HISTOGRAM_DATA_POINT_ATTRIBUTES, &point.attributes)?;
        buffer.write_fixed64_field(HISTOGRAM_DATA_POINT_COUNT, point.count)?;
        buffer.write_double(HISTOGRAM_DATA_POINT_SUM, point.sum)?;
        if let Some(min) = point.min {
            buffer.write_double(HISTOGRAM_DATA_POINT_MIN, min)?;
        }
        if let Some(max) = point.max {
            buffer.write_double(HISTOGRAM_DATA_POINT_MAX, max)?;
        }
        buffer.write_packed_fixed64(HISTOGRAM_DATA_POINT_BUCKET_COUNTS, &point.bucket_counts)?;

        let finite_bounds = point
            .explicit_bounds
            .iter()
            .filter(|bound| !bound.is_infinite())
            .count();
        if finite_bounds > 0 {
            buffer.write_tag_and_length(
                HISTOGRAM_DATA_POINT_EXPLICIT_BOUNDS,
                WireType::Len,
                finite_bounds * 8,
            )?;
            for bound in point.explicit_bounds.iter().filter(|bound| !bound.is_infinite()) {
                buffer.write_fixed64(bound.to_bits())?;
            }
        }

        self.write_exemplars(buffer, HISTOGRAM_DATA_POINT_EXEMPLARS, &point.exemplars)
    }

    fn write_exponential_histogram_point(
        &self,
        buffer: &mut ProtoBuffer,
        point: &ExponentialHistogramDataPoint,
    ) -> Result<(), EncodeError> {
        if point.no_recorded_value {
            buffer.write_fixed64_field(
                EXPONENTIAL_HISTOGRAM_DATA_POINT_TIME_UNIX_NANO,
                point.time_unix_nano,
            )?;
            self.write_point_attributes(
                buffer,
                EXPONENTIAL_HISTOGRAM_DATA_POINT_ATTRIBUTES,
                &point.attributes,
            )?;
            return buffer.write_uint64(
                EXPONENTIAL_HISTOGRAM_DATA_POINT_FLAGS,
                DATA_POINT_FLAGS_NO_RECORDED_VALUE.into(),
            );
        }

        self.write_point_attributes(
            buffer,
            EXPONENTIAL_HISTOGRAM_DATA_POINT_ATTRIBUTES,
            &point.attributes,
        )?;
        buffer.write_fixed64_field(
            EXPONENTIAL_HISTOGRAM_DATA_POINT_START_TIME_UNIX_NANO,
            point.start_time_unix_nano,
        )?;
        buffer.write_fixed64_field(
            EXPONENTIAL_HISTOGRAM_DATA_POINT_TIME_UNIX_NANO,
            point.time_unix_nano,
        )?;
        buffer.write_fixed64_field(EXPONENTIAL_HISTOGRAM_DATA_POINT_COUNT, point.count)?;
        buffer.write_double(EXPONENTIAL_HISTOGRAM_DATA_POINT_SUM, point.sum)?;
        if let Some(min) = point.min {
            buffer.write_double(EXPONENTIAL_HISTOGRAM_DATA_POINT_MIN, min)?;
        }
        if let Some(max) = point.max {
            buffer.write_double(EXPONENTIAL_HISTOGRAM_DATA_POINT_MAX, max)?;
        }
        buffer.write_sint32(EXPONENTIAL_HISTOGRAM_DATA_POINT_SCALE, point.scale)?;
        buffer.write_fixed64_field(EXPONENTIAL_HISTOGRAM_DATA_POINT_ZERO_COUNT, point.zero_count)?;
        write_buckets(buffer, EXPONENTIAL_HISTOGRAM_DATA_POINT_POSITIVE, &point.positive)?;
        if !point.negative.bucket_counts.is_empty() {
            write_buckets(buffer, EXPONENTIAL_HISTOGRAM_DATA_POINT_NEGATIVE, &point.negative)?;
        }
        self.write_exemplars(
            buffer,
            EXPONENTIAL_HISTOGRAM_DATA_POINT_EXEMPLARS,
            &point.exemplars,
        )?;
        if point.zero_threshold != 0.0 {
            buffer.write_double(
                EXPONENTIAL_HISTOGRAM_DATA_POINT_ZERO_THRESHOLD,
                point.zero_threshold,
            )?;
        }
        Ok(())
    }

    fn write_point_attributes(
        &self,
        buffer: &mut ProtoBuffer,
        field_number: u32,
        attributes: &[KeyValue],
    ) -> Result<(), EncodeError> {
        let mut limited = LimitedAttributes::new(&self.attributes, field_number, usize::MAX);
        for attribute in attributes {
            limited.write(buffer, &attribute.key, &attribute.value)?;
        }
        Ok(())
    }

    fn write_exemplars(
        &self,
        buffer: &mut ProtoBuffer,
        field_number: u32,
        exemplars: &[Exemplar],
    ) -> Result<(), EncodeError> {
        for exemplar in exemplars {
            buffer.write_message(field_number, |buffer| {
                self.write_point_attributes(
                    buffer,
                    EXEMPLAR_FILTERED_ATTRIBUTES,
                    &exemplar.filtered_attributes,
                )?;
                match exemplar.value {
                    NumberValue::I64(value) => buffer.write_sfixed64(EXEMPLAR_AS_INT, value)?,
                    NumberValue::F64(value) => buffer.write_double(EXEMPLAR_AS_DOUBLE, value)?,
                }
                buffer.write_fixed64_field(EXEMPLAR_TIME_UNIX_NANO, exemplar.time_unix_nano)?;
                if exemplar.span_id.is_valid() {
                    buffer.write_bytes(EXEMPLAR_SPAN_ID, &exemplar.span_id.to_bytes())?;
                    buffer.write_bytes(EXEMPLAR_TRACE_ID, &exemplar.trace_id.to_bytes())?;
                }
                Ok(())
            })?;
        }
        Ok(())
    }
}

fn write_temporality(
    buffer: &mut ProtoBuffer,
    field_number: u32,
    temporality: Temporality,
) -> Result<(), EncodeError> {
    buffer.write_enum(field_number, temporality as i32)
}

fn write_buckets(
    buffer: &mut ProtoBuffer,
    field_number: u32,
    buckets: &ExponentialBuckets,
) -> Result<(), EncodeError> {
    buffer.write_message(field_number, |buffer| {
        buffer.write_sint32(BUCKETS_OFFSET, buckets.offset)?;
        for count in &buckets.bucket_counts {
            buffer.write_uint64(BUCKETS_BUCKET_COUNTS, *count)?;
        }
        Ok(())
    })
}
