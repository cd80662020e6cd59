//! Hand-off from record producers to exporters.
//!
//! A [`Processor`] receives every finished record through [`Processor::on_end`]. The
//! [`BatchExportProcessor`] queues records and exports them from a background thread, the
//! [`SimpleExportProcessor`] exports each record as it arrives, and the [`CompositeProcessor`] fans
//! records out to several processors.

use std::fmt::Debug;
use std::slice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::export::{Batch, Exporter};

mod batch;
mod circular_buffer;
mod options;

pub use self::batch::{BatchExportProcessor, WORKER_THREAD_NAME};
pub use self::options::{
    BatchExportOptions, BatchExportOptionsBuilder, BatchOptionsError, DEFAULT_EXPORTER_TIMEOUT,
    DEFAULT_MAX_EXPORT_BATCH_SIZE, DEFAULT_MAX_QUEUE_SIZE, DEFAULT_SCHEDULED_DELAY, Signal,
};

/// Receives finished records.
///
/// Timeouts of `None` wait indefinitely.
pub trait Processor<T>: Debug + Send + Sync {
    /// Accepts a finished record, without blocking the calling thread on export.
    fn on_end(&self, record: T);

    /// Exports every record received so far, returning whether that completed in time.
    fn force_flush(&self, timeout: Option<Duration>) -> bool;

    /// Flushes and releases the processor's resources.
    ///
    /// Only the first call does any work, later calls return `false`.
    fn shutdown(&self, timeout: Option<Duration>) -> bool;
}

/// Failure to construct a processor.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// The options do not describe a working processor.
    #[error("invalid batch export options")]
    InvalidOptions(#[from] BatchOptionsError),

    /// The worker thread could not be started.
    #[error("failed to spawn the batch export worker thread")]
    SpawnWorker(#[source] std::io::Error),
}

/// Exports every record synchronously on the thread that ended it.
#[derive(Debug)]
pub struct SimpleExportProcessor<E> {
    exporter: Mutex<E>,
    exporter_timeout: Duration,
    shut_down: AtomicBool,
}

impl<E> SimpleExportProcessor<E> {
    /// Creates a processor exporting through `exporter`.
    pub fn new(exporter: E) -> Self {
        Self {
            exporter: Mutex::new(exporter),
            exporter_timeout: DEFAULT_EXPORTER_TIMEOUT,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Sets the time each export is given, zero meaning no deadline.
    pub fn with_exporter_timeout(mut self, exporter_timeout: Duration) -> Self {
        self.exporter_timeout = exporter_timeout;
        self
    }
}

impl<T, E> Processor<T> for SimpleExportProcessor<E>
where
    E: Exporter<T>,
{
    fn on_end(&self, record: T) {
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }

        let deadline = if self.exporter_timeout.is_zero() {
            None
        } else {
            Instant::now().checked_add(self.exporter_timeout)
        };

        let mut exporter = self.exporter.lock().unwrap_or_else(PoisonError::into_inner);
        if !exporter
            .export(Batch::new(slice::from_ref(&record), deadline))
            .is_success()
        {
            log::debug!("dropping a record after a failed export");
        }
    }

    fn force_flush(&self, _timeout: Option<Duration>) -> bool {
        true
    }

    fn shutdown(&self, timeout: Option<Duration>) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.exporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shutdown(timeout)
    }
}

/// Forwards records to several processors in registration order.
///
/// Each processor but the last receives a clone of the record. Flush and shutdown reach every
/// processor, each given what remains of the overall timeout.
///
/// # Examples
///
/// ```rust
/// use veecle_telemetry_otlp::export::InMemoryExporter;
/// use veecle_telemetry_otlp::processor::{CompositeProcessor, Processor, SimpleExportProcessor};
///
/// let (first, first_exported) = InMemoryExporter::<i32>::new();
/// let (second, second_exported) = InMemoryExporter::<i32>::new();
/// let processor = CompositeProcessor::new()
///     .with(SimpleExportProcessor::new(first))
///     .with(SimpleExportProcessor::new(second));
///
/// processor.on_end(7);
/// assert_eq!(*first_exported.lock().unwrap(), vec![7]);
/// assert_eq!(*second_exported.lock().unwrap(), vec![7]);
/// ```
pub struct CompositeProcessor<T> {
    processors: Vec<Box<dyn Processor<T>>>,
}

impl<T> Debug for CompositeProcessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeProcessor")
            .field("processors", &self.processors)
            .finish()
    }
}

impl<T> Default for CompositeProcessor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CompositeProcessor<T> {
    /// Creates a composite without processors.
    pub fn new() -> Self {
        Self {
            processors: Vec::new(),
        }
    }

    /// Appends `processor`.
    pub fn with(mut self, processor: impl Processor<T> + 'static) -> Self {
        self.push(Box::new(processor));
        self
    }

    /// Appends `processor`.
    pub fn push(&mut self, processor: Box<dyn Processor<T>>) {
        self.processors.push(processor);
    }

    /// Returns the number of processors.
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Returns `true` if there are no processors.
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    fn each_within(
        &self,
        timeout: Option<Duration>,
        mut call: impl FnMut(&dyn Processor<T>, Option<Duration>) -> bool,
    ) -> bool {
        let start = Instant::now();
        let mut result = true;
        for processor in &self.processors {
            let remaining = timeout.map(|timeout| timeout.saturating_sub(start.elapsed()));
            result &= call(processor.as_ref(), remaining);
        }
        result
    }
}

impl<T: Clone> Processor<T> for CompositeProcessor<T> {
    fn on_end(&self, record: T) {
        let Some((last, rest)) = self.processors.split_last() else {
            return;
        };
        for processor in rest {
            processor.on_end(record.clone());
        }
        last.on_end(record);
    }

    fn force_flush(&self, timeout: Option<Duration>) -> bool {
        self.each_within(timeout, |processor, timeout| processor.force_flush(timeout))
    }

    fn shutdown(&self, timeout: Option<Duration>) -> bool {
        self.each_within(timeout, |processor, timeout| processor.shutdown(timeout))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::export::InMemoryExporter;

    /// Records the timeouts it is called with.
    #[derive(Debug)]
    struct TimeoutRecorder {
        delay: Duration,
        timeouts: Arc<Mutex<Vec<Option<Duration>>>>,
    }

    impl Processor<u32> for TimeoutRecorder {
        fn on_end(&self, _record: u32) {}

        fn force_flush(&self, timeout: Option<Duration>) -> bool {
            self.timeouts.lock().unwrap().push(timeout);
            thread::sleep(self.delay);
            true
        }

        fn shutdown(&self, timeout: Option<Duration>) -> bool {
            self.timeouts.lock().unwrap().push(timeout);
            false
        }
    }

    #[test]
    fn simple_processor_exports_each_record() {
        let (exporter, exported) = InMemoryExporter::<&str>::new();
        let processor = SimpleExportProcessor::new(exporter);

        processor.on_end("a");
        processor.on_end("b");
        assert_eq!(*exported.lock().unwrap(), vec!["a", "b"]);
        assert!(Processor::<&str>::force_flush(&processor, Some(Duration::ZERO)));
    }

    #[test]
    fn simple_processor_shuts_down_once() {
        let (exporter, exported) = InMemoryExporter::<u32>::new();
        let shut_down = exporter.shutdown_flag();
        let processor = SimpleExportProcessor::new(exporter);

        assert!(Processor::<u32>::shutdown(&processor, None));
        assert!(shut_down.load(Ordering::Acquire));
        assert!(!Processor::<u32>::shutdown(&processor, None));

        processor.on_end(1_u32);
        assert!(exported.lock().unwrap().is_empty());
    }

    #[test]
    fn composite_clones_for_all_but_last() {
        #[derive(Debug)]
        struct Counted(Arc<()>);

        impl Clone for Counted {
            fn clone(&self) -> Self {
                Self(Arc::clone(&self.0))
            }
        }

        let (first, first_exported) = InMemoryExporter::<u32>::new();
        let (second, _) = InMemoryExporter::<u32>::new();
        let processor = CompositeProcessor::new()
            .with(SimpleExportProcessor::new(first))
            .with(SimpleExportProcessor::new(second));
        processor.on_end(3);
        assert_eq!(*first_exported.lock().unwrap(), vec![3]);
        assert_eq!(processor.len(), 2);

        let token = Arc::new(());
        let (exporter, exported) = InMemoryExporter::<Counted>::new();
        let processor = CompositeProcessor::new()
            .with(SimpleExportProcessor::new(exporter))
            .with(CompositeProcessor::<Counted>::new());
        processor.on_end(Counted(Arc::clone(&token)));
        // One copy kept by the exporter, the last processor consumed the original.
        assert_eq!(exported.lock().unwrap().len(), 1);
        assert_eq!(Arc::strong_count(&token), 2);
    }

    #[test]
    fn empty_composite() {
        let processor = CompositeProcessor::<u32>::default();
        processor.on_end(1);
        assert!(processor.is_empty());
        assert!(processor.force_flush(None));
        assert!(processor.shutdown(Some(Duration::ZERO)));
    }

    #[test]
    fn composite_distributes_the_remaining_timeout() {
        let timeouts = Arc::new(Mutex::new(Vec::new()));
        let processor = CompositeProcessor::new()
            .with(TimeoutRecorder {
                delay: Duration::from_millis(30),
                timeouts: Arc::clone(&timeouts),
            })
            .with(TimeoutRecorder {
                delay: Duration::from_millis(30),
                timeouts: Arc::clone(&timeouts),
            })
            .with(TimeoutRecorder {
                delay: Duration::ZERO,
                timeouts: Arc::clone(&timeouts),
            });

        assert!(processor.force_flush(Some(Duration::from_millis(40))));

        let timeouts = timeouts.lock().unwrap().clone();
        assert_eq!(timeouts.len(), 3);
        assert!(timeouts[0].unwrap() > Duration::from_millis(30));
        assert!(timeouts[1].unwrap() <= Duration::from_millis(10));
        // Exhausted deadlines still reach every processor, clamped to zero.
        assert_eq!(timeouts[2], Some(Duration::ZERO));
    }

    #[test]
    fn composite_infinite_timeout_and_results() {
        let timeouts = Arc::new(Mutex::new(Vec::new()));
        let (exporter, _) = InMemoryExporter::<u32>::new();
        let processor = CompositeProcessor::new()
            .with(TimeoutRecorder {
                delay: Duration::ZERO,
                timeouts: Arc::clone(&timeouts),
            })
            .with(SimpleExportProcessor::new(exporter));

        // The recorder refuses shutdown, the exporter accepts it.
        assert!(!processor.shutdown(None));
        assert_eq!(*timeouts.lock().unwrap(), vec![None]);
    }
}
