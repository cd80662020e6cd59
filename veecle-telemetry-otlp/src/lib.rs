//! # `veecle-telemetry-otlp`
//!
//! OTLP export for traces, metrics and logs.
//!
//! This crate turns in-memory telemetry records into the OTLP protobuf wire format and moves them
//! from the threads producing them to a background exporter, without blocking the producers.
//!
//! ## Features
//!
//! - **Encoding**: A growable protobuf buffer with reserved length prefixes that are patched once a
//!   message is complete, see [`encode`].
//! - **Signals**: Serializers for spans, metrics and log records that group records by
//!   instrumentation scope, see [`trace`], [`metrics`] and [`logs`].
//! - **Pooling**: Reference-counted log records that are recycled instead of reallocated, see
//!   [`logs::LogRecordPool`].
//! - **Batching**: A bounded, drop-on-full queue drained by a worker thread, see
//!   [`processor::BatchExportProcessor`].
//!
//! The network transport is not part of this crate: [`export::OtlpExporter`] hands encoded requests
//! to an [`export::Transport`].
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Instant;
//!
//! use veecle_telemetry_otlp::export::{OtlpExporter, Transport, TransportError};
//! use veecle_telemetry_otlp::limits::LogRecordLimits;
//! use veecle_telemetry_otlp::logs::{
//!     LogEmitter, LogSerializer, LogSerializerOptions, Severity, SharedLogRecord,
//! };
//! use veecle_telemetry_otlp::processor::{
//!     BatchExportOptions, BatchExportProcessor, Processor, Signal,
//! };
//! use veecle_telemetry_otlp::{InstrumentationScope, KeyValue, Resource};
//!
//! #[derive(Debug)]
//! struct Discard;
//!
//! impl Transport for Discard {
//!     fn send(&mut self, _payload: &[u8], _deadline: Option<Instant>) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let exporter = OtlpExporter::new(
//!     Resource::new([KeyValue::new("service.name", "checkout")]),
//!     LogSerializer::new(LogRecordLimits::default(), LogSerializerOptions::default()),
//!     Discard,
//! );
//! let processor: Arc<BatchExportProcessor<SharedLogRecord>> = Arc::new(BatchExportProcessor::new(
//!     exporter,
//!     BatchExportOptions::builder(Signal::Logs).build()?,
//! )?);
//!
//! let emitter = LogEmitter::new(Arc::new(InstrumentationScope::new("orders")), processor.clone());
//! emitter.emit(|record| {
//!     record.severity = Some(Severity::Info);
//!     record.formatted_message = Some("order placed".to_owned());
//!     record.attributes.push(KeyValue::new("order.id", 1234));
//! });
//!
//! assert!(processor.shutdown(None));
//! # Ok(())
//! # }
//! ```

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod attribute;
pub mod encode;
mod env;
pub mod export;
mod fields;
pub mod id;
pub mod limits;
pub mod logs;
pub mod metrics;
pub mod processor;
pub mod resource;
mod scope_groups;
pub mod trace;
pub mod value;

#[doc(hidden)]
pub mod test_helpers;

pub use self::resource::{InstrumentationScope, Resource};
pub use self::value::{KeyValue, Value};
