use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{LogRecord, LogRecordPool, SharedLogRecord};
use crate::processor::Processor;
use crate::resource::InstrumentationScope;

/// Emits log records of one instrumentation scope into a processor.
///
/// Records are rented from a [`LogRecordPool`] and go back to it once the processor and its
/// exporter release them.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use veecle_telemetry_otlp::InstrumentationScope;
/// use veecle_telemetry_otlp::export::InMemoryExporter;
/// use veecle_telemetry_otlp::logs::{LogEmitter, Severity, SharedLogRecord};
/// use veecle_telemetry_otlp::processor::SimpleExportProcessor;
///
/// let (exporter, exported) = InMemoryExporter::<SharedLogRecord>::new();
/// let emitter = LogEmitter::new(
///     Arc::new(InstrumentationScope::new("checkout")),
///     Arc::new(SimpleExportProcessor::new(exporter)),
/// );
///
/// emitter.emit(|record| {
///     record.severity = Some(Severity::Warn);
///     record.formatted_message = Some("cart is empty".to_owned());
/// });
///
/// let exported = exported.lock().unwrap();
/// assert_eq!(&*exported[0].scope.name, "checkout");
/// assert_ne!(exported[0].timestamp, 0);
/// ```
#[derive(Debug, Clone)]
pub struct LogEmitter {
    scope: Arc<InstrumentationScope>,
    pool: LogRecordPool,
    processor: Arc<dyn Processor<SharedLogRecord>>,
}

impl LogEmitter {
    /// Creates an emitter renting from [`LogRecordPool::global`].
    pub fn new(
        scope: Arc<InstrumentationScope>,
        processor: Arc<dyn Processor<SharedLogRecord>>,
    ) -> Self {
        Self::with_pool(scope, processor, LogRecordPool::global())
    }

    /// Creates an emitter renting from `pool`.
    pub fn with_pool(
        scope: Arc<InstrumentationScope>,
        processor: Arc<dyn Processor<SharedLogRecord>>,
        pool: LogRecordPool,
    ) -> Self {
        Self {
            scope,
            pool,
            processor,
        }
    }

    /// Returns the scope stamped on every emitted record.
    pub fn scope(&self) -> &Arc<InstrumentationScope> {
        &self.scope
    }

    /// Rents a record, lets `fill` describe the event and hands the record to the processor.
    ///
    /// A zero [`timestamp`](LogRecord::timestamp) is replaced with the current time.
    pub fn emit(&self, fill: impl FnOnce(&mut LogRecord)) {
        let mut record = self.pool.rent();
        match record.get_mut() {
            Some(fields) => {
                fields.scope = Arc::clone(&self.scope);
                fill(fields);
                if fields.timestamp == 0 {
                    fields.timestamp = now_nanos();
                }
            }
            None => {
                log::debug!("rented log record is still shared, emitting it unchanged");
            }
        }
        self.processor.on_end(record);
    }
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos() as u64)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::logs::Severity;

    /// Keeps every record it receives.
    #[derive(Debug, Default)]
    struct Collect(Mutex<Vec<SharedLogRecord>>);

    impl Processor<SharedLogRecord> for Collect {
        fn on_end(&self, record: SharedLogRecord) {
            self.0.lock().unwrap().push(record);
        }

        fn force_flush(&self, _timeout: Option<Duration>) -> bool {
            true
        }

        fn shutdown(&self, _timeout: Option<Duration>) -> bool {
            self.0.lock().unwrap().clear();
            true
        }
    }

    #[test]
    fn stamps_scope_and_keeps_explicit_timestamp() {
        let collect = Arc::new(Collect::default());
        let emitter = LogEmitter::with_pool(
            Arc::new(InstrumentationScope::new("payments").with_version("2.1")),
            collect.clone(),
            LogRecordPool::new(4).unwrap(),
        );

        emitter.emit(|record| {
            record.timestamp = 42;
            record.severity = Some(Severity::Error);
        });

        let records = collect.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, 42);
        assert_eq!(records[0].severity, Some(Severity::Error));
        assert_eq!(&*records[0].scope.name, "payments");
        assert!(Arc::ptr_eq(&records[0].scope, emitter.scope()));
        assert!(records[0].is_pooled());
    }

    #[test]
    fn released_records_return_to_the_pool() {
        let collect = Arc::new(Collect::default());
        let pool = LogRecordPool::new(4).unwrap();
        let emitter = LogEmitter::with_pool(
            Arc::new(InstrumentationScope::new("jobs")),
            collect.clone(),
            pool.clone(),
        );

        emitter.emit(|record| record.formatted_message = Some("first".to_owned()));
        assert!(collect.shutdown(None));

        // The recycled record comes back cleared.
        emitter.emit(|_| {});
        let records = collect.0.lock().unwrap();
        assert_eq!(records[0].formatted_message, None);
        assert_ne!(records[0].timestamp, 0);
    }
}
