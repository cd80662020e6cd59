//! Batch processor tuning.

use std::time::{Duration, Instant};

use crate::env::{process_env, read_millis, read_usize};

/// Default upper bound of records waiting in the queue.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 2048;
/// Default delay between two scheduled exports.
pub const DEFAULT_SCHEDULED_DELAY: Duration = Duration::from_millis(5000);
/// Default time an exporter is given per batch.
pub const DEFAULT_EXPORTER_TIMEOUT: Duration = Duration::from_millis(30000);
/// Default upper bound of records per exported batch.
pub const DEFAULT_MAX_EXPORT_BATCH_SIZE: usize = 512;

/// Selects the environment variables a [`BatchExportOptionsBuilder`] consults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// `OTEL_BSP_*` variables, used for spans and any other non-log signal.
    Traces,
    /// `OTEL_BLRP_*` variables.
    Logs,
}

impl Signal {
    fn max_queue_size_variable(self) -> &'static str {
        match self {
            Self::Traces => "OTEL_BSP_MAX_QUEUE_SIZE",
            Self::Logs => "OTEL_BLRP_MAX_QUEUE_SIZE",
        }
    }

    fn scheduled_delay_variable(self) -> &'static str {
        match self {
            Self::Traces => "OTEL_BSP_SCHEDULE_DELAY",
            Self::Logs => "OTEL_BLRP_SCHEDULE_DELAY",
        }
    }

    fn exporter_timeout_variable(self) -> &'static str {
        match self {
            Self::Traces => "OTEL_BSP_EXPORT_TIMEOUT",
            Self::Logs => "OTEL_BLRP_EXPORT_TIMEOUT",
        }
    }

    fn max_export_batch_size_variable(self) -> &'static str {
        match self {
            Self::Traces => "OTEL_BSP_MAX_EXPORT_BATCH_SIZE",
            Self::Logs => "OTEL_BLRP_MAX_EXPORT_BATCH_SIZE",
        }
    }
}

/// An invalid combination of batch processor options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BatchOptionsError {
    /// The queue cannot hold any record.
    #[error("the max queue size must be greater than zero")]
    ZeroQueueSize,

    /// The batch size is zero or larger than the queue.
    #[error("the max export batch size {batch_size} must be between 1 and the max queue size {queue_size}")]
    InvalidBatchSize {
        /// Configured batch size.
        batch_size: usize,
        /// Configured queue size.
        queue_size: usize,
    },

    /// Scheduled exports would never wait.
    #[error("the scheduled delay must be greater than zero")]
    ZeroScheduledDelay,
}

/// Tuning of a [`BatchExportProcessor`](super::BatchExportProcessor).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchExportOptions {
    /// Records arriving while this many are queued are dropped.
    pub max_queue_size: usize,
    /// Time between two scheduled exports.
    pub scheduled_delay: Duration,
    /// Time an exporter is given per batch, zero meaning no deadline.
    pub exporter_timeout: Duration,
    /// Upper bound of records handed to the exporter at once.
    pub max_export_batch_size: usize,
}

impl Default for BatchExportOptions {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            scheduled_delay: DEFAULT_SCHEDULED_DELAY,
            exporter_timeout: DEFAULT_EXPORTER_TIMEOUT,
            max_export_batch_size: DEFAULT_MAX_EXPORT_BATCH_SIZE,
        }
    }
}

impl BatchExportOptions {
    /// Returns a builder resolving unset options from the `signal`'s environment variables.
    pub fn builder(signal: Signal) -> BatchExportOptionsBuilder {
        BatchExportOptionsBuilder::new(signal)
    }

    /// Checks that a processor can run with these options.
    pub fn validate(&self) -> Result<(), BatchOptionsError> {
        if self.max_queue_size == 0 {
            return Err(BatchOptionsError::ZeroQueueSize);
        }
        if self.max_export_batch_size == 0 || self.max_export_batch_size > self.max_queue_size {
            return Err(BatchOptionsError::InvalidBatchSize {
                batch_size: self.max_export_batch_size,
                queue_size: self.max_queue_size,
            });
        }
        if self.scheduled_delay.is_zero() {
            return Err(BatchOptionsError::ZeroScheduledDelay);
        }
        Ok(())
    }

    /// Returns the deadline of an export starting at `now`.
    pub(crate) fn export_deadline(&self, now: Instant) -> Option<Instant> {
        if self.exporter_timeout.is_zero() {
            return None;
        }
        now.checked_add(self.exporter_timeout)
    }
}

/// Builds [`BatchExportOptions`], resolving each option as explicit value, then environment
/// variable, then default.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use veecle_telemetry_otlp::processor::{BatchExportOptions, Signal};
///
/// let options = BatchExportOptions::builder(Signal::Logs)
///     .with_scheduled_delay(Duration::from_millis(100))
///     .build_with_env(|name| (name == "OTEL_BLRP_MAX_QUEUE_SIZE").then(|| "64".to_owned()))
///     .unwrap();
///
/// assert_eq!(options.max_queue_size, 64);
/// assert_eq!(options.scheduled_delay, Duration::from_millis(100));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct BatchExportOptionsBuilder {
    signal: Signal,
    max_queue_size: Option<usize>,
    scheduled_delay: Option<Duration>,
    exporter_timeout: Option<Duration>,
    max_export_batch_size: Option<usize>,
}

impl BatchExportOptionsBuilder {
    /// Creates a builder with every option unset.
    pub fn new(signal: Signal) -> Self {
        Self {
            signal,
            max_queue_size: None,
            scheduled_delay: None,
            exporter_timeout: None,
            max_export_batch_size: None,
        }
    }

    /// Sets the max queue size.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = Some(max_queue_size);
        self
    }

    /// Sets the scheduled delay.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = Some(scheduled_delay);
        self
    }

    /// Sets the exporter timeout.
    pub fn with_exporter_timeout(mut self, exporter_timeout: Duration) -> Self {
        self.exporter_timeout = Some(exporter_timeout);
        self
    }

    /// Sets the max export batch size.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = Some(max_export_batch_size);
        self
    }

    /// Resolves the options against the process environment.
    pub fn build(self) -> Result<BatchExportOptions, BatchOptionsError> {
        self.build_with_env(process_env)
    }

    /// Resolves the options against `lookup`, which maps a variable name to its value.
    pub fn build_with_env(
        self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<BatchExportOptions, BatchOptionsError> {
        let defaults = BatchExportOptions::default();
        let signal = self.signal;

        let options = BatchExportOptions {
            max_queue_size: self
                .max_queue_size
                .or_else(|| read_usize(&lookup, signal.max_queue_size_variable()))
                .unwrap_or(defaults.max_queue_size),
            scheduled_delay: self
                .scheduled_delay
                .or_else(|| read_millis(&lookup, signal.scheduled_delay_variable()))
                .unwrap_or(defaults.scheduled_delay),
            exporter_timeout: self
                .exporter_timeout
                .or_else(|| read_millis(&lookup, signal.exporter_timeout_variable()))
                .unwrap_or(defaults.exporter_timeout),
            max_export_batch_size: self
                .max_export_batch_size
                .or_else(|| read_usize(&lookup, signal.max_export_batch_size_variable()))
                .unwrap_or(defaults.max_export_batch_size),
        };

        options.validate()?;
        Ok(options)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults() {
        let options = BatchExportOptions::builder(Signal::Traces)
            .build_with_env(no_env)
            .unwrap();
        assert_eq!(options, BatchExportOptions::default());
        assert_eq!(options.max_queue_size, 2048);
        assert_eq!(options.scheduled_delay, Duration::from_secs(5));
        assert_eq!(options.exporter_timeout, Duration::from_secs(30));
        assert_eq!(options.max_export_batch_size, 512);
    }

    #[test_case(Signal::Traces, "OTEL_BSP" ; "traces")]
    #[test_case(Signal::Logs, "OTEL_BLRP" ; "logs")]
    fn environment_per_signal(signal: Signal, prefix: &str) {
        let lookup = |name: &str| {
            let suffix = name.strip_prefix(prefix)?.strip_prefix('_')?;
            match suffix {
                "MAX_QUEUE_SIZE" => Some("100".to_owned()),
                "SCHEDULE_DELAY" => Some("250".to_owned()),
                "EXPORT_TIMEOUT" => Some("0".to_owned()),
                "MAX_EXPORT_BATCH_SIZE" => Some("10".to_owned()),
                _ => None,
            }
        };

        let options = BatchExportOptions::builder(signal)
            .build_with_env(lookup)
            .unwrap();

        assert_eq!(
            options,
            BatchExportOptions {
                max_queue_size: 100,
                scheduled_delay: Duration::from_millis(250),
                exporter_timeout: Duration::ZERO,
                max_export_batch_size: 10,
            }
        );
    }

    #[test]
    fn explicit_value_wins_over_environment() {
        let lookup = |name: &str| (name == "OTEL_BSP_MAX_QUEUE_SIZE").then(|| "100".to_owned());

        let options = BatchExportOptions::builder(Signal::Traces)
            .with_max_queue_size(4096)
            .build_with_env(lookup)
            .unwrap();

        assert_eq!(options.max_queue_size, 4096);
    }

    #[test]
    fn unparseable_environment_is_ignored() {
        let lookup = |name: &str| (name == "OTEL_BLRP_SCHEDULE_DELAY").then(|| "soon".to_owned());

        let options = BatchExportOptions::builder(Signal::Logs)
            .build_with_env(lookup)
            .unwrap();

        assert_eq!(options.scheduled_delay, DEFAULT_SCHEDULED_DELAY);
    }

    #[test]
    fn logs_ignore_trace_variables() {
        let lookup = |name: &str| (name == "OTEL_BSP_MAX_QUEUE_SIZE").then(|| "100".to_owned());

        let options = BatchExportOptions::builder(Signal::Logs)
            .build_with_env(lookup)
            .unwrap();

        assert_eq!(options.max_queue_size, DEFAULT_MAX_QUEUE_SIZE);
    }

    #[test_case(0, 1, 1, BatchOptionsError::ZeroQueueSize ; "zero queue")]
    #[test_case(10, 0, 1, BatchOptionsError::InvalidBatchSize { batch_size: 0, queue_size: 10 } ; "zero batch")]
    #[test_case(10, 11, 1, BatchOptionsError::InvalidBatchSize { batch_size: 11, queue_size: 10 } ; "batch larger than queue")]
    #[test_case(10, 10, 0, BatchOptionsError::ZeroScheduledDelay ; "zero delay")]
    fn validation(queue: usize, batch: usize, delay_millis: u64, expected: BatchOptionsError) {
        let result = BatchExportOptions::builder(Signal::Traces)
            .with_max_queue_size(queue)
            .with_max_export_batch_size(batch)
            .with_scheduled_delay(Duration::from_millis(delay_millis))
            .build_with_env(no_env);

        assert_eq!(result, Err(expected));
    }

    #[test]
    fn zero_timeout_has_no_deadline() {
        let now = Instant::now();
        let options = BatchExportOptions {
            exporter_timeout: Duration::ZERO,
            ..BatchExportOptions::default()
        };
        assert_eq!(options.export_deadline(now), None);

        let options = BatchExportOptions::default();
        assert_eq!(
            options.export_deadline(now),
            Some(now + DEFAULT_EXPORTER_TIMEOUT)
        );
    }

    #[test]
    #[serial_test::serial]
    fn build_reads_process_environment() {
        // SAFETY: environment tests are serialized and no other thread reads this variable.
        unsafe { std::env::set_var("OTEL_BSP_MAX_EXPORT_BATCH_SIZE", "32") };

        let options = BatchExportOptions::builder(Signal::Traces).build();

        // SAFETY: as above.
        unsafe { std::env::remove_var("OTEL_BSP_MAX_EXPORT_BATCH_SIZE") };

        assert_eq!(options.unwrap().max_export_batch_size, 32);
    }
}
