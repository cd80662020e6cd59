use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{Batch, ExportResult, Exporter};

/// An exporter for testing that stores every exported record in memory.
///
/// This exporter is useful for unit tests and integration tests where you need to verify which
/// records a processor delivered.
#[derive(Debug)]
pub struct InMemoryExporter<T> {
    /// Shared vector storing all exported records.
    pub exported: Arc<Mutex<Vec<T>>>,
    failing: Arc<AtomicBool>,
    export_delay: Option<Duration>,
    shut_down: Arc<AtomicBool>,
}

impl<T> InMemoryExporter<T> {
    /// Creates a new exporter and returns both the exporter and a handle to the record storage.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use veecle_telemetry_otlp::export::{Batch, Exporter, InMemoryExporter};
    ///
    /// let (mut exporter, exported) = InMemoryExporter::<i32>::new();
    /// exporter.export(Batch::new(&[1, 2], None));
    /// assert_eq!(*exported.lock().unwrap(), vec![1, 2]);
    /// ```
    pub fn new() -> (Self, Arc<Mutex<Vec<T>>>) {
        let exported = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                exported: exported.clone(),
                failing: Arc::new(AtomicBool::new(false)),
                export_delay: None,
                shut_down: Arc::new(AtomicBool::new(false)),
            },
            exported,
        )
    }

    /// Sleeps for `delay` in every export, to simulate a slow backend.
    pub fn with_export_delay(mut self, delay: Duration) -> Self {
        self.export_delay = Some(delay);
        self
    }

    /// Returns a switch that makes exports fail, and store nothing, while it is set.
    pub fn failure_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.failing)
    }

    /// Returns a flag that is set once the exporter is shut down.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shut_down)
    }
}

impl<T: Clone + std::fmt::Debug + Send> Exporter<T> for InMemoryExporter<T> {
    fn export(&mut self, batch: Batch<'_, T>) -> ExportResult {
        if let Some(delay) = self.export_delay {
            std::thread::sleep(delay);
        }
        if self.failing.load(Ordering::Acquire) {
            return ExportResult::Failure;
        }

        self.exported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(batch.items());
        ExportResult::Success
    }

    fn shutdown(&mut self, _timeout: Option<Duration>) -> bool {
        self.shut_down.store(true, Ordering::Release);
        true
    }
}
