//! Fixed-capacity keyed counter table
//!
//! Maps a small integer key (a principal id, an opcode, a port...) to a
//! monotonically increasing 64-bit count. Any number of event contexts may
//! call [`KeyedCounterTable::increment`] concurrently; per-key increments are
//! linearizable, so N increments always yield a count of exactly N.
//!
//! # Design
//!
//! ```text
//!  home(key) = fnv1a(key) & mask
//!
//!  ┌───────┬───────┬───────┬───────┬───────┬───────┬───────┬───────┐
//!  │ EMPTY │ OCC 7 │ OCC 9 │ CLAIM │ EMPTY │ EMPTY │ OCC 3 │ EMPTY │
//!  └───────┴───────┴───────┴───────┴───────┴───────┴───────┴───────┘
//!              ▲ linear probe until the key or the first EMPTY slot
//! ```
//!
//! - The slot array is a power of two at least twice the key capacity, so a
//!   probe always reaches an empty slot.
//! - A new key claims a slot with `EMPTY -> CLAIMED` (CAS), reserves one unit
//!   of capacity, writes key and count, then release-stores `OCCUPIED`.
//! - An occupied slot never changes key, so lookups need no locks and counts
//!   advance with a single `fetch_add`.
//! - Probers that hit a `CLAIMED` slot spin until the claimer publishes or
//!   backs out; the claimer's window is a handful of stores.

use crate::error::{ProbeError, Result};
use fnv::FnvHasher;
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};

/// Counter and dispatch key
pub type Key = u64;

const EMPTY: u8 = 0;
const CLAIMED: u8 = 1;
const OCCUPIED: u8 = 2;

#[derive(Debug)]
struct Slot {
    state: AtomicU8,
    key: AtomicU64,
    count: AtomicU64,
}

impl Slot {
    fn vacant() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            key: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }
}

/// Lock-free, fixed-capacity map from [`Key`] to a `u64` count
///
/// # Example
///
/// ```
/// use probecore::counter_table::KeyedCounterTable;
///
/// let table = KeyedCounterTable::new(2);
/// table.increment(7).unwrap();
/// table.increment(7).unwrap();
/// assert_eq!(table.get(7), Some(2));
/// assert_eq!(table.get(8), None);
/// ```
#[derive(Debug)]
pub struct KeyedCounterTable {
    slots: Box<[Slot]>,
    mask: usize,
    capacity: usize,
    len: AtomicUsize,
}

impl KeyedCounterTable {
    /// Create a table holding at most `capacity` distinct keys
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0, or too large for a power-of-two slot array
    /// of at least twice the capacity.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Counter table capacity must be > 0");

        let Some(size) = capacity
            .checked_mul(2)
            .and_then(usize::checked_next_power_of_two)
        else {
            panic!("Counter table capacity {capacity} is too large");
        };
        let slots = (0..size).map(|_| Slot::vacant()).collect();

        Self {
            slots,
            mask: size - 1,
            capacity,
            len: AtomicUsize::new(0),
        }
    }

    /// Increment the count for `key`, inserting it at 0 first if absent
    ///
    /// Returns the count after the increment. Inserting a new key into a full
    /// table fails with [`ProbeError::CapacityExceeded`] and leaves the table
    /// unchanged.
    pub fn increment(&self, key: Key) -> Result<u64> {
        let mut index = self.home(key);
        let mut probed = 0;

        while probed < self.slots.len() {
            let slot = &self.slots[index];

            match slot.state.load(Ordering::Acquire) {
                OCCUPIED => {
                    if slot.key.load(Ordering::Relaxed) == key {
                        return Ok(slot.count.fetch_add(1, Ordering::AcqRel) + 1);
                    }
                }
                CLAIMED => {
                    // Another context is publishing this slot; look again.
                    std::hint::spin_loop();
                    continue;
                }
                _ => {
                    if slot
                        .state
                        .compare_exchange(EMPTY, CLAIMED, Ordering::Acquire, Ordering::Acquire)
                        .is_err()
                    {
                        continue;
                    }

                    if !self.reserve() {
                        slot.state.store(EMPTY, Ordering::Release);
                        return Err(ProbeError::CapacityExceeded {
                            key,
                            capacity: self.capacity,
                        });
                    }

                    slot.key.store(key, Ordering::Relaxed);
                    slot.count.store(1, Ordering::Relaxed);
                    slot.state.store(OCCUPIED, Ordering::Release);
                    return Ok(1);
                }
            }

            index = (index + 1) & self.mask;
            probed += 1;
        }

        Err(ProbeError::CapacityExceeded {
            key,
            capacity: self.capacity,
        })
    }

    /// Read the count for `key` without creating an entry
    pub fn get(&self, key: Key) -> Option<u64> {
        let mut index = self.home(key);

        for _ in 0..self.slots.len() {
            let slot = &self.slots[index];
            match slot.state.load(Ordering::Acquire) {
                OCCUPIED => {
                    if slot.key.load(Ordering::Relaxed) == key {
                        return Some(slot.count.load(Ordering::Acquire));
                    }
                }
                // An unpublished claim means the key is not visible yet.
                _ => return None,
            }
            index = (index + 1) & self.mask;
        }

        None
    }

    /// Snapshot of every `(key, count)` pair, sorted by key
    pub fn entries(&self) -> Vec<(Key, u64)> {
        let mut entries: Vec<(Key, u64)> = self
            .slots
            .iter()
            .filter(|slot| slot.state.load(Ordering::Acquire) == OCCUPIED)
            .map(|slot| {
                (
                    slot.key.load(Ordering::Relaxed),
                    slot.count.load(Ordering::Acquire),
                )
            })
            .collect();
        entries.sort_unstable_by_key(|&(key, _)| key);
        entries
    }

    /// Remove every entry (administrative reset)
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot.state.get_mut() = EMPTY;
            *slot.key.get_mut() = 0;
            *slot.count.get_mut() = 0;
        }
        *self.len.get_mut() = 0;
    }

    /// Number of keys currently stored (best effort under concurrent inserts)
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of distinct keys
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn home(&self, key: Key) -> usize {
        let mut hasher = FnvHasher::default();
        hasher.write_u64(key);
        (hasher.finish() as usize) & self.mask
    }

    fn reserve(&self) -> bool {
        self.len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |len| {
                (len < self.capacity).then_some(len + 1)
            })
            .is_ok()
    }
}

const GLOBAL_KEY: Key = 0;

/// Process-wide counter: a single-key [`KeyedCounterTable`]
#[derive(Debug)]
pub struct GlobalCounter {
    table: KeyedCounterTable,
}

impl GlobalCounter {
    pub fn new() -> Self {
        Self {
            table: KeyedCounterTable::new(1),
        }
    }

    /// Increment and return the new value
    pub fn increment(&self) -> u64 {
        // One key can never exceed a capacity of one.
        self.table
            .increment(GLOBAL_KEY)
            .unwrap_or_else(|_| self.get())
    }

    /// Current value (0 before the first increment)
    pub fn get(&self) -> u64 {
        self.table.get(GLOBAL_KEY).unwrap_or(0)
    }
}

impl Default for GlobalCounter {
    fn default() -> Self {
        Self::new()
    }
}
