//! Bounded multi-producer single-consumer queue feeding the batch worker.

use std::hint;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

/// Attempts a producer makes to claim a position before giving up.
const ADD_SPIN_LIMIT: usize = 50_000;

/// A fixed-capacity ring of boxed values.
///
/// Any number of threads may [`try_add`](Self::try_add) concurrently, producers never block and a
/// full buffer rejects the value. Only one thread may [`read`](Self::read) at a time.
///
/// `head` counts claimed positions and `tail` counts consumed positions. Both only grow, so they
/// double as the added and removed counters.
pub(crate) struct CircularBuffer<T> {
    slots: Box<[AtomicPtr<T>]>,
    head: AtomicU64,
    tail: AtomicU64,
    _values: PhantomData<T>,
}

impl<T> std::fmt::Debug for CircularBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircularBuffer")
            .field("capacity", &self.capacity())
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

impl<T> CircularBuffer<T> {
    /// Creates an empty buffer, `capacity` must be non-zero.
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            slots: (0..capacity)
                .map(|_| AtomicPtr::new(ptr::null_mut()))
                .collect(),
            head: AtomicU64::new(0),
            tail: AtomicU64::new(0),
            _values: PhantomData,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of values added but not yet read.
    pub(crate) fn count(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        (head - tail) as usize
    }

    /// Returns the number of values ever added.
    pub(crate) fn added_count(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }

    /// Returns the number of values ever read.
    pub(crate) fn removed_count(&self) -> u64 {
        self.tail.load(Ordering::Acquire)
    }

    fn slot(&self, position: u64) -> &AtomicPtr<T> {
        &self.slots[(position % self.slots.len() as u64) as usize]
    }

    /// Adds `value`, handing it back when the buffer is full or too contended.
    pub(crate) fn try_add(&self, value: T) -> Result<(), T> {
        let capacity = self.slots.len() as u64;

        for _ in 0..ADD_SPIN_LIMIT {
            // `tail` first: it can only grow towards `head`, so the difference never underflows.
            let tail = self.tail.load(Ordering::Acquire);
            let head = self.head.load(Ordering::Acquire);
            if head - tail >= capacity {
                return Err(value);
            }

            if self
                .head
                .compare_exchange_weak(head, head + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                // The reader empties a slot before advancing `tail` past it, so the claimed slot
                // is empty.
                self.slot(head)
                    .store(Box::into_raw(Box::new(value)), Ordering::Release);
                return Ok(());
            }

            hint::spin_loop();
        }

        Err(value)
    }

    /// Removes the oldest value.
    ///
    /// Must only be called from the single consumer thread.
    pub(crate) fn read(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Acquire);
        if tail >= self.head.load(Ordering::Acquire) {
            return None;
        }

        let slot = self.slot(tail);
        loop {
            // A producer that claimed this position may not have published its value yet.
            let value = slot.swap(ptr::null_mut(), Ordering::AcqRel);
            if !value.is_null() {
                self.tail.store(tail + 1, Ordering::Release);
                // SAFETY: non-null slot values come from `Box::into_raw` in `try_add`, and the swap
                // above took sole ownership of it.
                return Some(*unsafe { Box::from_raw(value) });
            }
            hint::spin_loop();
        }
    }
}

impl<T> Drop for CircularBuffer<T> {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut() {
            let value = std::mem::replace(slot.get_mut(), ptr::null_mut());
            if !value.is_null() {
                // SAFETY: non-null slot values come from `Box::into_raw` and nothing else can
                // access the slots during drop.
                drop(unsafe { Box::from_raw(value) });
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn first_in_first_out() {
        let buffer = CircularBuffer::new(3);
        assert_eq!(buffer.try_add(1), Ok(()));
        assert_eq!(buffer.try_add(2), Ok(()));
        assert_eq!(buffer.read(), Some(1));
        assert_eq!(buffer.try_add(3), Ok(()));
        assert_eq!(buffer.try_add(4), Ok(()));
        assert_eq!(buffer.count(), 3);

        assert_eq!(buffer.read(), Some(2));
        assert_eq!(buffer.read(), Some(3));
        assert_eq!(buffer.read(), Some(4));
        assert_eq!(buffer.read(), None);
        assert_eq!((buffer.added_count(), buffer.removed_count()), (4, 4));
    }

    #[test]
    fn full_buffer_rejects() {
        let buffer = CircularBuffer::new(2);
        buffer.try_add("a").unwrap();
        buffer.try_add("b").unwrap();

        assert_eq!(buffer.try_add("c"), Err("c"));
        assert_eq!(buffer.count(), 2);
        assert_eq!(buffer.capacity(), 2);
    }

    #[test]
    fn drop_releases_queued_values() {
        let value = Arc::new(());
        let buffer = CircularBuffer::new(4);
        buffer.try_add(Arc::clone(&value)).unwrap();
        buffer.try_add(Arc::clone(&value)).unwrap();
        assert_eq!(Arc::strong_count(&value), 3);

        drop(buffer);
        assert_eq!(Arc::strong_count(&value), 1);
    }

    #[test]
    fn concurrent_producers() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 1000;

        let buffer = CircularBuffer::new(64);
        let mut received = Vec::new();

        thread::scope(|scope| {
            for producer in 0..PRODUCERS {
                let buffer = &buffer;
                scope.spawn(move || {
                    for index in 0..PER_PRODUCER {
                        let mut value = producer * PER_PRODUCER + index;
                        while let Err(rejected) = buffer.try_add(value) {
                            value = rejected;
                            thread::yield_now();
                        }
                    }
                });
            }

            while received.len() < PRODUCERS * PER_PRODUCER {
                match buffer.read() {
                    Some(value) => received.push(value),
                    None => thread::yield_now(),
                }
            }
        });

        // Each producer's values stay in order.
        for producer in 0..PRODUCERS {
            let own: Vec<_> = received
                .iter()
                .copied()
                .filter(|value| value / PER_PRODUCER == producer)
                .collect();
            let expected: Vec<_> =
                (producer * PER_PRODUCER..(producer + 1) * PER_PRODUCER).collect();
            assert_eq!(own, expected);
        }
    }
}
