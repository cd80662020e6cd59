//! Recycling of log records.
//!
//! A pool has two tiers. Each thread keeps one record in a thread-local slot, which serves rents
//! and returns without contention. Behind it sits a bounded shared array of records. Two
//! monotonically increasing counters select its slots: a renter claims `rent_index` and a
//! returner claims `return_index` by compare-and-swap, both reduced modulo the capacity. A renter
//! that claims a slot whose record is not yet published spins briefly and retries.
//!
//! Records are handed out as [`SharedLogRecord`]s. Each handle holds one reference. The record
//! goes back to the pool when the last handle is dropped, after its fields are reset.

use std::cell::RefCell;
use std::fmt;
use std::hint;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicPtr, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::LogRecord;

/// Capacity of the shared tier of [`LogRecordPool::global`] unless resized.
pub const DEFAULT_POOL_CAPACITY: usize = 2048;

/// Recycled records with more attributes than this drop their attribute storage.
pub const MAX_RETAINED_ATTRIBUTES: usize = 64;

/// Recycled records with more scope items than this drop their scope storage.
pub const MAX_RETAINED_SCOPE_ITEMS: usize = 100;

/// Spins a renter waits for a claimed slot to be published before it retries.
const SLOT_SPIN_LIMIT: u32 = 1_000;

/// Spins the last handle waits for handles that already released their reference to go away.
const RELEASE_SPIN_LIMIT: u32 = 10_000;

/// Reference count reported for records created outside a pool.
const UNPOOLED_REFERENCE_COUNT: i32 = i32::MAX;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

static GLOBAL_POOL: RwLock<Option<LogRecordPool>> = RwLock::new(None);

thread_local! {
    static LOCAL_RECORD: RefCell<Option<LocalRecord>> = const { RefCell::new(None) };
}

#[derive(Debug)]
struct LocalRecord {
    pool_id: u64,
    record: Arc<PooledRecord>,
}

/// A record together with the number of handles referencing it.
#[derive(Debug)]
struct PooledRecord {
    record: LogRecord,
    reference_count: AtomicI32,
}

impl PooledRecord {
    fn new(record: LogRecord, reference_count: i32) -> Self {
        Self {
            record,
            reference_count: AtomicI32::new(reference_count),
        }
    }
}

/// An error creating a [`LogRecordPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The shared tier must hold at least one record.
    #[error("log record pool capacity must be greater than zero")]
    ZeroCapacity,
}

/// A pool of reusable [`LogRecord`]s.
///
/// Cloning the pool yields another handle to the same records.
///
/// # Examples
///
/// ```rust
/// use veecle_telemetry_otlp::logs::LogRecordPool;
///
/// let pool = LogRecordPool::shared_only(4)?;
/// let mut record = pool.rent();
/// record.get_mut().unwrap().formatted_message = Some("hello".to_owned());
/// drop(record);
///
/// assert_eq!(pool.count(), 1);
/// assert_eq!(pool.rent().formatted_message, None);
/// # Ok::<(), veecle_telemetry_otlp::logs::PoolError>(())
/// ```
#[derive(Clone)]
pub struct LogRecordPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    id: u64,
    thread_local: bool,
    slots: Box<[AtomicPtr<PooledRecord>]>,
    rent_index: AtomicU64,
    return_index: AtomicU64,
}

impl fmt::Debug for LogRecordPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogRecordPool")
            .field("id", &self.inner.id)
            .field("capacity", &self.capacity())
            .field("count", &self.count())
            .field("thread_local", &self.inner.thread_local)
            .finish()
    }
}

impl LogRecordPool {
    /// Creates a pool with a per-thread slot and a shared tier of `capacity` records.
    pub fn new(capacity: usize) -> Result<Self, PoolError> {
        Self::with_tiers(capacity, true)
    }

    /// Creates a pool without the per-thread slot.
    pub fn shared_only(capacity: usize) -> Result<Self, PoolError> {
        Self::with_tiers(capacity, false)
    }

    fn with_tiers(capacity: usize, thread_local: bool) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }
        Ok(Self::build(capacity, thread_local))
    }

    /// Creates a pool; `capacity` must not be zero.
    fn build(capacity: usize, thread_local: bool) -> Self {
        let slots = (0..capacity)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();

        Self {
            inner: Arc::new(PoolInner {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                thread_local,
                slots,
                rent_index: AtomicU64::new(0),
                return_index: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the process-wide pool, creating it with [`DEFAULT_POOL_CAPACITY`] on first use.
    pub fn global() -> Self {
        if let Some(pool) = &*GLOBAL_POOL.read().unwrap_or_else(PoisonError::into_inner) {
            return pool.clone();
        }

        GLOBAL_POOL
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(|| Self::build(DEFAULT_POOL_CAPACITY, true))
            .clone()
    }

    /// Replaces the process-wide pool with a new one of `capacity` records.
    ///
    /// Records rented from the previous pool return to it.
    pub fn resize_global(capacity: usize) -> Result<(), PoolError> {
        let pool = Self::new(capacity)?;
        *GLOBAL_POOL.write().unwrap_or_else(PoisonError::into_inner) = Some(pool);
        Ok(())
    }

    /// The capacity of the shared tier.
    pub fn capacity(&self) -> usize {
        self.inner.slots.len()
    }

    /// The number of records in the shared tier.
    pub fn count(&self) -> usize {
        let return_index = self.inner.return_index.load(Ordering::Acquire);
        let rent_index = self.inner.rent_index.load(Ordering::Acquire);
        usize::try_from(return_index.saturating_sub(rent_index)).unwrap_or(usize::MAX)
    }

    /// Takes a cleared record from the pool or allocates a new one.
    ///
    /// The returned handle holds the only reference.
    pub fn rent(&self) -> SharedLogRecord {
        let record = self
            .take_local()
            .or_else(|| self.inner.take_shared())
            .unwrap_or_else(|| {
                log::debug!("log record pool {} is empty, allocating", self.inner.id);
                Arc::new(PooledRecord::new(LogRecord::default(), 1))
            });
        record.reference_count.store(1, Ordering::Relaxed);

        SharedLogRecord {
            record: ManuallyDrop::new(record),
            pool: Some(self.clone()),
        }
    }

    fn take_local(&self) -> Option<Arc<PooledRecord>> {
        if !self.inner.thread_local {
            return None;
        }

        LOCAL_RECORD
            .try_with(|local| {
                let mut local = local.try_borrow_mut().ok()?;
                if local.as_ref()?.pool_id != self.inner.id {
                    return None;
                }
                local.take().map(|local| local.record)
            })
            .ok()
            .flatten()
    }

    /// Stores `record` in the per-thread slot, handing it back if the slot is taken.
    fn put_local(&self, record: Arc<PooledRecord>) -> Result<(), Arc<PooledRecord>> {
        if !self.inner.thread_local {
            return Err(record);
        }

        let mut record = Some(record);
        let stored = LOCAL_RECORD
            .try_with(|local| {
                let Ok(mut local) = local.try_borrow_mut() else {
                    return false;
                };
                if local.is_some() {
                    return false;
                }
                *local = record.take().map(|record| LocalRecord {
                    pool_id: self.inner.id,
                    record,
                });
                true
            })
            .unwrap_or(false);

        match record {
            Some(record) if !stored => Err(record),
            _ => Ok(()),
        }
    }

    /// Resets `record` and stores it, once every other handle to it is gone.
    fn recycle(&self, mut record: Arc<PooledRecord>) {
        let mut spins = 0;
        while Arc::get_mut(&mut record).is_none() {
            if spins == RELEASE_SPIN_LIMIT {
                log::debug!("log record still shared after its last release, not recycling it");
                return;
            }
            spins += 1;
            hint::spin_loop();
        }
        let Some(exclusive) = Arc::get_mut(&mut record) else {
            return;
        };
        exclusive.record.reset();

        if let Err(record) = self.put_local(record) {
            self.inner.put_shared(record);
        }
    }
}

impl PoolInner {
    fn slot(&self, index: u64) -> &AtomicPtr<PooledRecord> {
        // The modulus is below `slots.len()`, so it fits in `usize`.
        &self.slots[(index % self.slots.len() as u64) as usize]
    }

    fn take_shared(&self) -> Option<Arc<PooledRecord>> {
        loop {
            let rent_index = self.rent_index.load(Ordering::Acquire);
            let return_index = self.return_index.load(Ordering::Acquire);
            if rent_index >= return_index {
                return None;
            }
            if self
                .rent_index
                .compare_exchange(rent_index, rent_index + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }

            let slot = self.slot(rent_index);
            for _ in 0..SLOT_SPIN_LIMIT {
                let record = slot.swap(ptr::null_mut(), Ordering::AcqRel);
                if !record.is_null() {
                    // SAFETY: Non-null slot pointers come from `Arc::into_raw` in `put_shared`, and
                    // the swap moved this one out of the slot, so it is converted back exactly once.
                    return Some(unsafe { Arc::from_raw(record) });
                }
                hint::spin_loop();
            }

            // The returner that claimed this slot has not published yet; claim another one.
        }
    }

    fn put_shared(&self, record: Arc<PooledRecord>) {
        let capacity = self.slots.len() as u64;
        loop {
            let return_index = self.return_index.load(Ordering::Acquire);
            let rent_index = self.rent_index.load(Ordering::Acquire);
            if return_index.saturating_sub(rent_index) >= capacity {
                return;
            }
            if self
                .return_index
                .compare_exchange(
                    return_index,
                    return_index + 1,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_err()
            {
                continue;
            }

            let displaced = self
                .slot(return_index)
                .swap(Arc::into_raw(record).cast_mut(), Ordering::AcqRel);
            if !displaced.is_null() {
                // SAFETY: Non-null slot pointers come from `Arc::into_raw`, and the swap moved this
                // one out of the slot.
                drop(unsafe { Arc::from_raw(displaced) });
            }
            return;
        }
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        for slot in &mut self.slots {
            let record = *slot.get_mut();
            if !record.is_null() {
                // SAFETY: Non-null slot pointers come from `Arc::into_raw`, and `&mut self` rules
                // out concurrent access to the slot.
                drop(unsafe { Arc::from_raw(record) });
            }
        }
    }
}

/// A reference-counted handle to a [`LogRecord`].
///
/// Cloning adds a reference. Dropping the last handle of a pooled record resets the record and
/// returns it to its pool.
pub struct SharedLogRecord {
    record: ManuallyDrop<Arc<PooledRecord>>,
    pool: Option<LogRecordPool>,
}

impl SharedLogRecord {
    /// Wraps a record that does not belong to any pool.
    pub fn new(record: LogRecord) -> Self {
        Self {
            record: ManuallyDrop::new(Arc::new(PooledRecord::new(
                record,
                UNPOOLED_REFERENCE_COUNT,
            ))),
            pool: None,
        }
    }

    /// Returns the record for filling in, if this is its only handle.
    pub fn get_mut(&mut self) -> Option<&mut LogRecord> {
        Arc::get_mut(&mut self.record).map(|pooled| &mut pooled.record)
    }

    /// Creates another handle, adding a reference if the record is pooled.
    pub fn add_reference(&self) -> Self {
        if self.pool.is_some() {
            self.record.reference_count.fetch_add(1, Ordering::Relaxed);
        }
        Self {
            record: ManuallyDrop::new(Arc::clone(&self.record)),
            pool: self.pool.clone(),
        }
    }

    /// The number of references, [`i32::MAX`] for records outside a pool.
    pub fn reference_count(&self) -> i32 {
        self.record.reference_count.load(Ordering::Acquire)
    }

    /// Whether the record returns to a pool once released.
    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }
}

impl Clone for SharedLogRecord {
    fn clone(&self) -> Self {
        self.add_reference()
    }
}

impl Deref for SharedLogRecord {
    type Target = LogRecord;

    fn deref(&self) -> &LogRecord {
        &self.record.record
    }
}

impl AsRef<LogRecord> for SharedLogRecord {
    fn as_ref(&self) -> &LogRecord {
        &self.record.record
    }
}

impl fmt::Debug for SharedLogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedLogRecord")
            .field("record", &self.record.record)
            .field("reference_count", &self.reference_count())
            .finish()
    }
}

impl Drop for SharedLogRecord {
    fn drop(&mut self) {
        // SAFETY: `self.record` is not accessed again after being taken.
        let record = unsafe { ManuallyDrop::take(&mut self.record) };
        let Some(pool) = self.pool.take() else {
            return;
        };
        if record.reference_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            pool.recycle(record);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::thread;

    use pretty_assertions::assert_eq;
    use serial_test::serial;

    use super::*;
    use crate::value::KeyValue;

    fn address(record: &SharedLogRecord) -> *const LogRecord {
        ptr::from_ref(&**record)
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(LogRecordPool::new(0).unwrap_err(), PoolError::ZeroCapacity);
        assert_eq!(
            LogRecordPool::shared_only(0).unwrap_err(),
            PoolError::ZeroCapacity
        );
    }

    #[test]
    fn rent_and_return() {
        let pool = LogRecordPool::shared_only(2).unwrap();

        let first = pool.rent();
        let second = pool.rent();
        drop(first);
        assert_eq!(pool.count(), 1);

        let manual = SharedLogRecord::new(LogRecord::default());
        assert_eq!(manual.reference_count(), i32::MAX);
        assert!(!manual.is_pooled());
        drop(manual.clone());
        drop(manual);
        assert_eq!(pool.count(), 1);

        drop(second);
        assert_eq!(pool.count(), 2);

        let first = pool.rent();
        assert_eq!(pool.count(), 1);
        let second = pool.rent();
        assert_eq!(pool.count(), 0);
        let third = pool.rent();
        let fourth = pool.rent();

        drop((first, second, third, fourth));
        assert_eq!(pool.count(), 2);
    }

    #[test]
    fn last_reference_returns_the_record() {
        let pool = LogRecordPool::shared_only(2).unwrap();

        let record = pool.rent();
        assert_eq!(record.reference_count(), 1);

        let other = record.add_reference();
        assert_eq!(record.reference_count(), 2);
        assert_eq!(address(&record), address(&other));

        drop(other);
        assert_eq!(record.reference_count(), 1);
        assert_eq!(pool.count(), 0);

        drop(record);
        assert_eq!(pool.count(), 1);
    }

    #[test]
    fn unpooled_handles_keep_their_count() {
        let record = SharedLogRecord::new(LogRecord {
            formatted_message: Some("standalone".to_owned()),
            ..LogRecord::default()
        });

        let other = record.clone();
        let third = other.add_reference();
        assert_eq!(record.reference_count(), i32::MAX);
        assert_eq!(third.reference_count(), i32::MAX);
        assert_eq!(address(&record), address(&third));

        drop((other, third));
        assert_eq!(record.reference_count(), i32::MAX);
        assert_eq!(record.formatted_message.as_deref(), Some("standalone"));
    }

    #[test]
    fn shared_handles_cannot_mutate() {
        let pool = LogRecordPool::shared_only(1).unwrap();
        let mut record = pool.rent();
        assert!(record.get_mut().is_some());

        let _other = record.clone();
        assert!(record.get_mut().is_none());
    }

    #[test]
    fn recycled_records_are_cleared() {
        let pool = LogRecordPool::shared_only(1).unwrap();

        let mut record = pool.rent();
        let inner = record.get_mut().unwrap();
        inner.attributes = Vec::with_capacity(16);
        inner.attributes.push(KeyValue::new("key1", "value1"));
        inner.attributes.push(KeyValue::new("key2", "value2"));
        inner.push_scope([KeyValue::new("request", 7)]);
        inner.formatted_message = Some("hello".to_owned());
        let before = address(&record);
        drop(record);

        let record = pool.rent();
        assert_eq!(address(&record), before);
        assert!(record.attributes.is_empty());
        assert_eq!(record.attributes.capacity(), 16);
        assert!(record.scope_items.is_empty());
        assert_eq!(record.formatted_message, None);
        assert_eq!(record.reference_count(), 1);
    }

    #[test]
    fn thread_local_slot_comes_first() {
        let pool = LogRecordPool::new(4).unwrap();

        let record = pool.rent();
        let before = address(&record);
        drop(record);
        assert_eq!(pool.count(), 0);

        let record = pool.rent();
        assert_eq!(address(&record), before);

        let other = pool.rent();
        drop(record);
        drop(other);
        assert_eq!(pool.count(), 1);
    }

    #[test]
    fn thread_local_slot_is_per_pool() {
        let first = LogRecordPool::new(1).unwrap();
        let second = LogRecordPool::new(1).unwrap();

        drop(first.rent());
        drop(second.rent());

        assert_eq!(first.count(), 0);
        assert_eq!(second.count(), 1);
    }

    #[test]
    fn concurrent_rent_and_return_stay_bounded() {
        let pool = LogRecordPool::shared_only(8).unwrap();

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for index in 0..10_000i64 {
                        let mut record = pool.rent();
                        if let Some(inner) = record.get_mut() {
                            inner.attributes.push(KeyValue::new("index", index));
                        }
                        let other = record.add_reference();
                        drop(record);
                        assert!(other.attributes.len() <= 1);
                    }
                });
            }
        });

        assert!(pool.count() <= pool.capacity());
    }

    #[test]
    #[serial]
    fn global_pool_resizes() {
        LogRecordPool::resize_global(DEFAULT_POOL_CAPACITY).unwrap();
        assert_eq!(LogRecordPool::global().capacity(), DEFAULT_POOL_CAPACITY);

        assert_eq!(
            LogRecordPool::resize_global(0),
            Err(PoolError::ZeroCapacity)
        );

        let before = LogRecordPool::global();
        LogRecordPool::resize_global(1).unwrap();
        let after = LogRecordPool::global();
        assert_eq!(after.capacity(), 1);
        assert!(!Arc::ptr_eq(&before.inner, &after.inner));

        LogRecordPool::resize_global(DEFAULT_POOL_CAPACITY).unwrap();
    }
}
