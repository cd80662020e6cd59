use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::hint;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, Thread};
use std::time::{Duration, Instant};

use super::circular_buffer::CircularBuffer;
use super::options::BatchExportOptions;
use super::{Processor, ProcessorError};
use crate::export::{Batch, Exporter};

/// Name of the thread exporting queued records.
pub const WORKER_THREAD_NAME: &str = "otlp-batch-export";

/// Upper bound of a single wait for worker progress, so a missed notification only costs latency.
const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Drain target while no shutdown is in progress.
const NOT_DRAINING: u64 = u64::MAX;

/// Queues records and exports them in batches from a background thread.
///
/// [`on_end`](Processor::on_end) never blocks: a record arriving while the queue is full or after
/// shutdown started is dropped and counted. The worker exports when the scheduled delay elapses,
/// when a full batch is queued, or when asked to flush. Failed exports are not retried.
///
/// # Examples
///
/// ```rust
/// use veecle_telemetry_otlp::export::InMemoryExporter;
/// use veecle_telemetry_otlp::processor::{BatchExportOptions, BatchExportProcessor, Processor};
///
/// let (exporter, exported) = InMemoryExporter::<&str>::new();
/// let processor = BatchExportProcessor::new(exporter, BatchExportOptions::default()).unwrap();
///
/// processor.on_end("record");
/// assert!(processor.force_flush(None));
/// assert_eq!(*exported.lock().unwrap(), vec!["record"]);
/// ```
pub struct BatchExportProcessor<T> {
    shared: Arc<Shared<T>>,
    worker_thread: Thread,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T> std::fmt::Debug for BatchExportProcessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExportProcessor")
            .field("options", &self.shared.options)
            .field("queue", &self.shared.queue)
            .field("dropped", &self.dropped_count())
            .finish_non_exhaustive()
    }
}

/// State shared between the processor handle and its worker.
struct Shared<T> {
    options: BatchExportOptions,
    queue: CircularBuffer<T>,
    dropped: AtomicU64,
    shutdown_started: AtomicBool,
    /// Number of `on_end` calls that passed the shutdown check and have not finished enqueueing.
    producers: AtomicU64,
    /// Queue position the worker drains up to before shutting the exporter down.
    drain_target: AtomicU64,
    shutdown_deadline: Mutex<Option<Instant>>,
    progress: Mutex<Progress>,
    progress_changed: Condvar,
}

#[derive(Debug, Default)]
struct Progress {
    /// Queue position up to which every record went through an export.
    completed: u64,
    /// Set once the exporter has been shut down.
    shutdown_result: Option<bool>,
}

impl<T> Shared<T> {
    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn draining(&self) -> bool {
        self.drain_target.load(Ordering::Acquire) != NOT_DRAINING
    }

    /// Sets the drain target once every producer that missed the shutdown flag has enqueued.
    ///
    /// Must be called after `shutdown_started` is set.
    fn begin_drain(&self) {
        while self.producers.load(Ordering::SeqCst) != 0 {
            hint::spin_loop();
        }
        self.drain_target
            .store(self.queue.added_count(), Ordering::Release);
    }

    fn shutdown_deadline(&self) -> Option<Instant> {
        *self
            .shutdown_deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for `done` to hold, giving up at `deadline`.
    fn wait_for(
        &self,
        deadline: Option<Instant>,
        worker: &Thread,
        done: impl Fn(&Self, &Progress) -> Option<bool>,
    ) -> bool {
        let mut progress = self.progress();
        loop {
            if let Some(result) = done(self, &*progress) {
                return result;
            }

            let wait = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return false;
                    }
                    remaining.min(PROGRESS_POLL_INTERVAL)
                }
                None => PROGRESS_POLL_INTERVAL,
            };

            progress = self
                .progress_changed
                .wait_timeout(progress, wait)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
            worker.unpark();
        }
    }
}

impl<T> BatchExportProcessor<T>
where
    T: Send + Sync + 'static,
{
    /// Starts the worker thread feeding `exporter`.
    pub fn new<E>(exporter: E, options: BatchExportOptions) -> Result<Self, ProcessorError>
    where
        E: Exporter<T> + 'static,
    {
        options.validate()?;

        let shared = Arc::new(Shared {
            options,
            queue: CircularBuffer::new(options.max_queue_size),
            dropped: AtomicU64::new(0),
            shutdown_started: AtomicBool::new(false),
            producers: AtomicU64::new(0),
            drain_target: AtomicU64::new(NOT_DRAINING),
            shutdown_deadline: Mutex::new(None),
            progress: Mutex::new(Progress::default()),
            progress_changed: Condvar::new(),
        });

        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_owned())
            .spawn({
                let shared = Arc::clone(&shared);
                move || run_worker(&shared, exporter)
            })
            .map_err(ProcessorError::SpawnWorker)?;

        Ok(Self {
            shared,
            worker_thread: worker.thread().clone(),
            worker: Mutex::new(Some(worker)),
        })
    }
}

impl<T> BatchExportProcessor<T> {
    /// Returns the options the processor runs with.
    pub fn options(&self) -> &BatchExportOptions {
        &self.shared.options
    }

    /// Returns the number of records dropped because the queue was full or shut down.
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Returns the number of records passed to [`on_end`](Processor::on_end), dropped or not.
    pub fn received_count(&self) -> u64 {
        self.shared.queue.added_count() + self.dropped_count()
    }

    /// Returns the number of records the worker has taken off the queue.
    pub fn processed_count(&self) -> u64 {
        self.shared.queue.removed_count()
    }

    /// Returns the number of records waiting in the queue.
    pub fn queued_count(&self) -> usize {
        self.shared.queue.count()
    }

    fn join_worker(&self) -> bool {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle.map(JoinHandle::join) {
            Some(Err(_)) => {
                log::error!("the {WORKER_THREAD_NAME} thread panicked");
                false
            }
            _ => true,
        }
    }
}

impl<T> Processor<T> for BatchExportProcessor<T>
where
    T: Send + Sync,
{
    fn on_end(&self, record: T) {
        // Pairs with `begin_drain`: either the shutdown sees this producer or it sees the flag.
        self.shared.producers.fetch_add(1, Ordering::SeqCst);
        if self.shared.shutdown_started.load(Ordering::SeqCst) {
            self.shared.producers.fetch_sub(1, Ordering::SeqCst);
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let added = self.shared.queue.try_add(record);
        self.shared.producers.fetch_sub(1, Ordering::SeqCst);
        match added {
            Ok(()) => {
                if self.shared.queue.count() >= self.shared.options.max_export_batch_size {
                    self.worker_thread.unpark();
                }
            }
            Err(_) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn force_flush(&self, timeout: Option<Duration>) -> bool {
        let target = self.shared.queue.added_count();
        if self.shared.progress().completed >= target {
            return true;
        }

        self.worker_thread.unpark();
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        self.shared
            .wait_for(deadline, &self.worker_thread, |_, progress| {
                if progress.completed >= target {
                    Some(true)
                } else if progress.shutdown_result.is_some() {
                    Some(false)
                } else {
                    None
                }
            })
    }

    fn shutdown(&self, timeout: Option<Duration>) -> bool {
        if self.shared.shutdown_started.swap(true, Ordering::SeqCst) {
            return false;
        }

        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        *self
            .shared
            .shutdown_deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = deadline;
        self.shared.begin_drain();
        self.worker_thread.unpark();

        let result = self
            .shared
            .wait_for(deadline, &self.worker_thread, |_, progress| {
                progress.shutdown_result
            });

        if result || self.shared.progress().shutdown_result.is_some() {
            self.join_worker() && result
        } else {
            log::warn!("the {WORKER_THREAD_NAME} thread did not finish before the shutdown timeout");
            false
        }
    }
}

impl<T> Drop for BatchExportProcessor<T> {
    fn drop(&mut self) {
        if self.shared.shutdown_started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.begin_drain();
        self.worker_thread.unpark();
        self.join_worker();
    }
}

/// Exports queued records until a shutdown drained the queue, then shuts the exporter down.
fn run_worker<T, E>(shared: &Shared<T>, mut exporter: E)
where
    E: Exporter<T>,
{
    let options = shared.options;
    let mut batch = Vec::with_capacity(options.max_export_batch_size);

    loop {
        if !shared.draining() && shared.queue.count() < options.max_export_batch_size {
            thread::park_timeout(options.scheduled_delay);
        }

        // Records queued after this point wait for the next round.
        let target = shared.queue.added_count();
        while shared.queue.removed_count() < target {
            while batch.len() < options.max_export_batch_size {
                match shared.queue.read() {
                    Some(record) => batch.push(record),
                    None => break,
                }
            }
            if batch.is_empty() {
                break;
            }

            let mut deadline = options.export_deadline(Instant::now());
            if let Some(shutdown_deadline) = shared.shutdown_deadline() {
                deadline = Some(deadline.map_or(shutdown_deadline, |d| d.min(shutdown_deadline)));
            }

            let result = exporter.export(Batch::new(&batch, deadline));
            if !result.is_success() {
                log::debug!("dropping {} records after a failed export", batch.len());
            }
            // Dropping the records returns pooled ones to their pool.
            batch.clear();

            shared.progress().completed = shared.queue.removed_count();
            shared.progress_changed.notify_all();
        }

        let drain_target = shared.drain_target.load(Ordering::Acquire);
        if drain_target != NOT_DRAINING && shared.queue.removed_count() >= drain_target {
            break;
        }
    }

    let remaining = shared
        .shutdown_deadline()
        .map(|deadline| deadline.saturating_duration_since(Instant::now()));
    let result = exporter.shutdown(remaining);

    shared.progress().shutdown_result = Some(result);
    shared.progress_changed.notify_all();
}
