//! Bounded lock-free event ring
//!
//! Transports records from any number of producer contexts to a consumer
//! without either side ever waiting on the other.
//!
//! # Design
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ PRODUCERS (event contexts, hot path)                            │
//! │   handle_event() → ring.submit(record)                          │
//! │   CAS reserves the tail slot, copy, release-store slot stamp    │
//! └─────────────────────────────────────────────────────────────────┘
//!                          │
//!                          │ crossbeam ArrayQueue (stamped slots)
//!                          ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ CONSUMER (outside the core)                                     │
//! │   loop {                                                        │
//! │     for record in ring.drain(64) { ... }                        │
//! │     lost = ring.take_lost();                                    │
//! │   }                                                             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A slot only becomes visible to the consumer once its stamp is published,
//! so a record is never read half-written. When the ring is full the
//! producer applies the [`OverflowPolicy`] and reports what happened in the
//! [`SubmitResult`]; it never blocks.

use crate::error::{ProbeError, Result};
use crate::record::{EventRecord, Record};
use crossbeam::queue::ArrayQueue;
use crossbeam::utils::CachePadded;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// What `submit` does when the ring is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Reject the new record
    #[default]
    DropNewest,
    /// Evict the oldest unconsumed record to make room
    OverwriteOldest,
}

/// Outcome of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitResult {
    Stored,
    /// Ring full under `DropNewest`: the new record was discarded
    Overflow,
    /// Ring full under `OverwriteOldest`: the oldest record was discarded
    OverwroteOldest,
}

/// Bounded multi-producer ring of records
///
/// # Example
///
/// ```
/// use probecore::record::EventRecord;
/// use probecore::ring::{EventRing, OverflowPolicy, SubmitResult};
///
/// let max = EventRecord::ENCODED_LEN;
/// let ring = EventRing::with_max_record_size(2, OverflowPolicy::DropNewest, max);
/// let record = EventRecord::new(0, 1, "init", "Hello World");
///
/// assert_eq!(ring.submit(record).unwrap(), SubmitResult::Stored);
/// assert_eq!(ring.submit(record).unwrap(), SubmitResult::Stored);
/// assert_eq!(ring.submit(record).unwrap(), SubmitResult::Overflow);
///
/// assert_eq!(ring.drain(8).count(), 2);
/// assert_eq!(ring.take_lost(), 1);
/// ```
pub struct EventRing<T = EventRecord> {
    queue: ArrayQueue<T>,
    policy: OverflowPolicy,
    max_record_size: usize,

    /// Metrics: accepted for submission (size check passed)
    submitted: CachePadded<AtomicU64>,

    /// Metrics: rejected under DropNewest
    dropped: CachePadded<AtomicU64>,

    /// Metrics: evicted under OverwriteOldest
    overwritten: CachePadded<AtomicU64>,

    /// Metrics: delivered to the consumer
    drained: CachePadded<AtomicU64>,

    /// Dropped or evicted since the consumer last called `take_lost`
    lost: CachePadded<AtomicU64>,
}

impl<T: Record> EventRing<T> {
    /// Create a ring of `capacity` records with no record size limit
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self::with_max_record_size(capacity, policy, usize::MAX)
    }

    /// Create a ring that rejects records encoding to more than `max_record_size` bytes
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn with_max_record_size(
        capacity: usize,
        policy: OverflowPolicy,
        max_record_size: usize,
    ) -> Self {
        assert!(capacity > 0, "Ring buffer capacity must be > 0");

        Self {
            queue: ArrayQueue::new(capacity),
            policy,
            max_record_size,
            submitted: CachePadded::new(AtomicU64::new(0)),
            dropped: CachePadded::new(AtomicU64::new(0)),
            overwritten: CachePadded::new(AtomicU64::new(0)),
            drained: CachePadded::new(AtomicU64::new(0)),
            lost: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Append a record (hot path, never blocks)
    pub fn submit(&self, record: T) -> Result<SubmitResult> {
        let size = record.encoded_len();
        if size > self.max_record_size {
            return Err(ProbeError::RecordTooLarge {
                size,
                max: self.max_record_size,
            });
        }

        self.submitted.fetch_add(1, Ordering::Relaxed);

        let result = match self.policy {
            OverflowPolicy::DropNewest => match self.queue.push(record) {
                Ok(()) => SubmitResult::Stored,
                Err(_rejected) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    SubmitResult::Overflow
                }
            },
            OverflowPolicy::OverwriteOldest => match self.queue.force_push(record) {
                None => SubmitResult::Stored,
                Some(_evicted) => {
                    self.overwritten.fetch_add(1, Ordering::Relaxed);
                    SubmitResult::OverwroteOldest
                }
            },
        };

        if result != SubmitResult::Stored {
            self.lost.fetch_add(1, Ordering::AcqRel);
        }

        Ok(result)
    }
}

impl<T> EventRing<T> {
    /// Remove up to `max` of the oldest records, in submission order
    ///
    /// The iterator is lazy: each `next` pops one record. It stops at `max`
    /// records or at the first empty observation, and does not resume if
    /// records arrive afterwards. `drain(0)` touches nothing.
    pub fn drain(&self, max: usize) -> Drain<'_, T> {
        Drain {
            ring: self,
            remaining: max,
        }
    }

    /// Records currently available (best effort under concurrent submission)
    pub fn peek_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn max_record_size(&self) -> usize {
        self.max_record_size
    }

    /// Records dropped or evicted since the previous call
    pub fn take_lost(&self) -> u64 {
        self.lost.swap(0, Ordering::AcqRel)
    }

    pub fn stats(&self) -> RingStats {
        RingStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            overwritten: self.overwritten.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            current_size: self.queue.len(),
            capacity: self.queue.capacity(),
        }
    }
}

/// Lazy draining iterator returned by [`EventRing::drain`]
pub struct Drain<'a, T> {
    ring: &'a EventRing<T>,
    remaining: usize,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.remaining == 0 {
            return None;
        }

        match self.ring.queue.pop() {
            Some(record) => {
                self.remaining -= 1;
                self.ring.drained.fetch_add(1, Ordering::Relaxed);
                Some(record)
            }
            None => {
                self.remaining = 0;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

impl<T> std::iter::FusedIterator for Drain<'_, T> {}

/// Ring statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingStats {
    pub submitted: u64,
    pub dropped: u64,
    pub overwritten: u64,
    pub drained: u64,
    pub current_size: usize,
    pub capacity: usize,
}

impl RingStats {
    /// Fraction of submissions that lost a record (0.0 to 1.0)
    pub fn drop_rate(&self) -> f64 {
        if self.submitted == 0 {
            0.0
        } else {
            (self.dropped + self.overwritten) as f64 / self.submitted as f64
        }
    }

    /// Calculate ring utilization (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        self.current_size as f64 / self.capacity as f64
    }
}
