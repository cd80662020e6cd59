//! Exporting batches of records.
//!
//! # Exporter Trait
//!
//! The [`Exporter`] trait receives one [`Batch`] at a time from a
//! [processor](crate::processor) and reports whether it was delivered. Exporters do not retry
//! failed batches on behalf of the processor; a failed batch is dropped.
//!
//! # Built-in Exporters
//!
//! - [`OtlpExporter`] - Encodes batches as OTLP protobuf and hands them to a [`Transport`]
//! - [`InMemoryExporter`] - Collects exported records in memory for testing purposes

mod test_exporter;

use std::fmt::{self, Debug};
use std::io;
use std::time::{Duration, Instant};

#[doc(hidden)]
pub use self::test_exporter::InMemoryExporter;
use crate::encode::{EncodeError, ProtoBuffer};
use crate::logs::{LogRecord, LogSerializer};
use crate::metrics::{Metric, MetricSerializer};
use crate::resource::Resource;
use crate::trace::{SpanData, TraceSerializer};

/// Initial capacity of the [`OtlpExporter`] payload buffer.
pub const DEFAULT_PAYLOAD_CAPACITY: usize = 750_000;

/// Size of the gRPC message prefix: a compression flag and a big-endian `u32` length.
pub const GRPC_HEADER_SIZE: usize = 5;

/// Whether an export delivered its batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportResult {
    /// The batch was delivered.
    Success,
    /// The batch was not delivered and is dropped.
    Failure,
}

impl ExportResult {
    /// Returns `true` for [`ExportResult::Success`].
    pub fn is_success(self) -> bool {
        self == ExportResult::Success
    }
}

/// The records handed to one [`Exporter::export`] call.
#[derive(Debug)]
pub struct Batch<'a, T> {
    items: &'a [T],
    deadline: Option<Instant>,
}

// Derives would require `T: Clone`.
impl<T> Clone for Batch<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Batch<'_, T> {}

impl<'a, T> Batch<'a, T> {
    /// Creates a batch that should be exported before `deadline`, if any.
    pub fn new(items: &'a [T], deadline: Option<Instant>) -> Self {
        Self { items, deadline }
    }

    /// The records.
    pub fn items(&self) -> &'a [T] {
        self.items
    }

    /// The number of records.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch has no records.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The instant the export should finish by.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, `None` if there is none.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl<'a, T> IntoIterator for Batch<'a, T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Trait for delivering batches of records to a backend.
///
/// # Examples
///
/// ```rust
/// use veecle_telemetry_otlp::export::{Batch, ExportResult, Exporter};
///
/// #[derive(Debug, Default)]
/// struct CountingExporter {
///     exported: usize,
/// }
///
/// impl Exporter<String> for CountingExporter {
///     fn export(&mut self, batch: Batch<'_, String>) -> ExportResult {
///         self.exported += batch.len();
///         ExportResult::Success
///     }
/// }
///
/// let mut exporter = CountingExporter::default();
/// let lines = ["a".to_owned(), "b".to_owned()];
/// assert!(exporter.export(Batch::new(&lines, None)).is_success());
/// assert_eq!(exporter.exported, 2);
/// ```
pub trait Exporter<T>: Debug + Send {
    /// Delivers `batch`, ideally before its deadline.
    fn export(&mut self, batch: Batch<'_, T>) -> ExportResult;

    /// Releases the exporter's resources; `None` waits as long as needed.
    ///
    /// Returns whether the shutdown completed in time.
    fn shutdown(&mut self, timeout: Option<Duration>) -> bool {
        let _ = timeout;
        true
    }
}

/// Writes one signal's records as the body of an OTLP export request.
pub trait SignalSerializer<T>: Debug + Send {
    /// Appends a `Resource*` entry holding `items` to `buffer`.
    fn serialize(
        &mut self,
        buffer: &mut ProtoBuffer,
        resource: &Resource,
        items: &[T],
    ) -> Result<(), EncodeError>;
}

impl SignalSerializer<SpanData> for TraceSerializer {
    fn serialize(
        &mut self,
        buffer: &mut ProtoBuffer,
        resource: &Resource,
        items: &[SpanData],
    ) -> Result<(), EncodeError> {
        TraceSerializer::serialize(self, buffer, resource, items)
    }
}

impl SignalSerializer<Metric> for MetricSerializer {
    fn serialize(
        &mut self,
        buffer: &mut ProtoBuffer,
        resource: &Resource,
        items: &[Metric],
    ) -> Result<(), EncodeError> {
        MetricSerializer::serialize(self, buffer, resource, items)
    }
}

impl<R: AsRef<LogRecord>> SignalSerializer<R> for LogSerializer {
    fn serialize(
        &mut self,
        buffer: &mut ProtoBuffer,
        resource: &Resource,
        items: &[R],
    ) -> Result<(), EncodeError> {
        LogSerializer::serialize(self, buffer, resource, items)
    }
}

/// An error delivering an encoded payload.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The deadline passed before the payload was delivered.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// The receiver rejected the payload.
    #[error("payload rejected: {0}")]
    Rejected(String),
    /// Writing the payload failed.
    #[error("failed to send payload")]
    Io(#[from] io::Error),
}

/// Trait for the sender that moves encoded payloads to a collector, e.g. over HTTP or gRPC.
pub trait Transport: Debug + Send {
    /// Sends one encoded export request.
    fn send(&mut self, payload: &[u8], deadline: Option<Instant>) -> Result<(), TransportError>;

    /// Releases the transport's resources; `None` waits as long as needed.
    fn shutdown(&mut self, timeout: Option<Duration>) -> bool {
        let _ = timeout;
        true
    }
}

/// How an encoded export request is framed before it is sent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PayloadFraming {
    /// The bare protobuf message, as sent over OTLP/HTTP.
    #[default]
    Raw,
    /// Prefixed with the 5-byte gRPC message header.
    Grpc,
}

/// Encodes batches as OTLP export requests and hands them to a [`Transport`].
///
/// The payload buffer is reused across exports; it starts at [`DEFAULT_PAYLOAD_CAPACITY`] bytes
/// and grows as needed up to [`MAX_BUFFER_CAPACITY`](crate::encode::MAX_BUFFER_CAPACITY).
pub struct OtlpExporter<S, X> {
    resource: Resource,
    serializer: S,
    transport: X,
    framing: PayloadFraming,
    buffer: ProtoBuffer,
}

impl<S: Debug, X: Debug> Debug for OtlpExporter<S, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtlpExporter")
            .field("resource", &self.resource)
            .field("serializer", &self.serializer)
            .field("transport", &self.transport)
            .field("framing", &self.framing)
            .field("buffer_capacity", &self.buffer.capacity())
            .finish()
    }
}

impl<S, X> OtlpExporter<S, X> {
    /// Creates an exporter for records from `resource`.
    pub fn new(resource: Resource, serializer: S, transport: X) -> Self {
        Self::with_buffer(
            resource,
            serializer,
            transport,
            ProtoBuffer::with_capacity(DEFAULT_PAYLOAD_CAPACITY),
        )
    }

    /// Creates an exporter encoding into `buffer`.
    pub fn with_buffer(resource: Resource, serializer: S, transport: X, buffer: ProtoBuffer) -> Self {
        Self {
            resource,
            serializer,
            transport,
            framing: PayloadFraming::default(),
            buffer,
        }
    }

    /// Sets how payloads are framed.
    pub fn with_framing(mut self, framing: PayloadFraming) -> Self {
        self.framing = framing;
        self
    }

    /// The transport.
    pub fn transport(&self) -> &X {
        &self.transport
    }

    /// The transport, mutably.
    pub fn transport_mut(&mut self) -> &mut X {
        &mut self.transport
    }

    /// Encodes `items` into the payload buffer and returns the framed payload.
    pub fn encode<T>(&mut self, items: &[T]) -> Result<&[u8], EncodeError>
    where
        S: SignalSerializer<T>,
    {
        self.buffer.clear();

        if self.framing == PayloadFraming::Grpc {
            self.buffer
                .write_with_retry(|buffer| buffer.write_slice(&[0; GRPC_HEADER_SIZE]))?;
        }

        self.serializer
            .serialize(&mut self.buffer, &self.resource, items)?;

        if self.framing == PayloadFraming::Grpc {
            let length = self.buffer.position() - GRPC_HEADER_SIZE;
            let length = u32::try_from(length).map_err(|_| EncodeError::LengthOverflow { length })?;
            self.buffer.overwrite(1, &length.to_be_bytes());
        }

        Ok(self.buffer.as_bytes())
    }
}

impl<T, S, X> Exporter<T> for OtlpExporter<S, X>
where
    S: SignalSerializer<T>,
    X: Transport,
{
    fn export(&mut self, batch: Batch<'_, T>) -> ExportResult {
        if let Err(error) = self.encode(batch.items()) {
            log::error!("failed to encode a batch of {} records: {error}", batch.len());
            return ExportResult::Failure;
        }

        match self.transport.send(self.buffer.as_bytes(), batch.deadline()) {
            Ok(()) => ExportResult::Success,
            Err(error) => {
                log::warn!("failed to export a batch of {} records: {error}", batch.len());
                ExportResult::Failure
            }
        }
    }

    fn shutdown(&mut self, timeout: Option<Duration>) -> bool {
        self.transport.shutdown(timeout)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::encode::Growth;
    use crate::fields::trace::{RESOURCE_SPANS_SCOPE_SPANS, TRACES_DATA_RESOURCE_SPANS};
    use crate::limits::SpanLimits;
    use crate::test_helpers::{field, fields_numbered};
    use crate::value::KeyValue;

    #[derive(Debug, Default, Clone)]
    struct RecordingTransport {
        payloads: Arc<Mutex<Vec<Vec<u8>>>>,
        fail: bool,
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, payload: &[u8], _deadline: Option<Instant>) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Rejected("unavailable".to_owned()));
            }
            self.payloads.lock().unwrap().push(payload.to_vec());
            Ok(())
        }
    }

    fn spans() -> Vec<SpanData> {
        vec![SpanData {
            name: "GET /".into(),
            ..SpanData::default()
        }]
    }

    #[test]
    fn raw_payload_is_a_request_message() {
        let transport = RecordingTransport::default();
        let payloads = Arc::clone(&transport.payloads);
        let mut exporter = OtlpExporter::new(
            Resource::new([KeyValue::new("service.name", "checkout")]),
            TraceSerializer::new(SpanLimits::default()),
            transport,
        );

        let spans = spans();
        assert_eq!(exporter.export(Batch::new(&spans, None)), ExportResult::Success);

        let payloads = payloads.lock().unwrap();
        let resource_spans = field(&payloads[0], TRACES_DATA_RESOURCE_SPANS)
            .unwrap()
            .bytes()
            .unwrap();
        assert_eq!(fields_numbered(resource_spans, RESOURCE_SPANS_SCOPE_SPANS).len(), 1);
    }

    #[test]
    fn grpc_framing_prefixes_length() {
        let transport = RecordingTransport::default();
        let payloads = Arc::clone(&transport.payloads);
        let mut exporter = OtlpExporter::new(
            Resource::default(),
            TraceSerializer::new(SpanLimits::default()),
            transport,
        )
        .with_framing(PayloadFraming::Grpc);

        let spans = spans();
        assert!(exporter.export(Batch::new(&spans, None)).is_success());

        let payloads = payloads.lock().unwrap();
        let payload = &payloads[0];
        assert_eq!(payload[0], 0);
        let length = u32::from_be_bytes(payload[1..5].try_into().unwrap());
        assert_eq!(length as usize, payload.len() - GRPC_HEADER_SIZE);
        assert!(field(&payload[GRPC_HEADER_SIZE..], TRACES_DATA_RESOURCE_SPANS).is_some());
    }

    #[test]
    fn transport_failure_fails_the_export() {
        let transport = RecordingTransport {
            fail: true,
            ..RecordingTransport::default()
        };
        let mut exporter = OtlpExporter::new(
            Resource::default(),
            TraceSerializer::new(SpanLimits::default()),
            transport,
        );

        let spans = spans();
        assert_eq!(exporter.export(Batch::new(&spans, None)), ExportResult::Failure);
    }

    #[test]
    fn encode_failure_fails_the_export() {
        let transport = RecordingTransport::default();
        let payloads = Arc::clone(&transport.payloads);
        let mut exporter = OtlpExporter::with_buffer(
            Resource::default(),
            TraceSerializer::new(SpanLimits::default()),
            transport,
            ProtoBuffer::new(8, 16, Growth::Checkpoint),
        );

        let spans = spans();
        assert_eq!(exporter.export(Batch::new(&spans, None)), ExportResult::Failure);
        assert!(payloads.lock().unwrap().is_empty());
    }

    #[test]
    fn buffer_is_reused_between_exports() {
        let mut exporter = OtlpExporter::new(
            Resource::default(),
            TraceSerializer::new(SpanLimits::default()),
            RecordingTransport::default(),
        );

        let spans = spans();
        let first = exporter.encode(&spans).unwrap().to_vec();
        let second = exporter.encode(&spans).unwrap().to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn batch_remaining_time() {
        let items = [1, 2, 3];
        assert_eq!(Batch::new(&items, None).remaining(), None);

        let batch = Batch::new(&items, Some(Instant::now() + Duration::from_secs(60)));
        assert!(batch.remaining().unwrap() > Duration::from_secs(30));
        assert_eq!(batch.into_iter().copied().sum::<i32>(), 6);
    }
}
