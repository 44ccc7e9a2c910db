//! Comprehensive property-based tests for pre-commit hook
//!
//! Covers the invariants the instrumentation core promises, using proptest.
//! Designed to run under 30 seconds as a pre-commit quality gate.
//!
//! Core features tested:
//! 1. Keyed counting (no lost updates, no partial inserts)
//! 2. Opcode dispatch (handler or fallback, exactly once)
//! 3. Event ring ordering and overflow policies
//! 4. Record wire layout
//! 5. Configuration parsing

use probecore::counter_table::KeyedCounterTable;
use probecore::dispatch::{handler, DispatchTableBuilder, HandlerRef, Verdict};
use probecore::error::ProbeError;
use probecore::record::EventRecord;
use probecore::ring::{EventRing, OverflowPolicy, SubmitResult};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn record(seq: u32) -> EventRecord {
    EventRecord::new(seq, seq, "prop", "Hello World")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_counts_match_increment_multiset(keys in prop::collection::vec(0u64..32, 0..200)) {
        let table = KeyedCounterTable::new(32);
        let mut expected: BTreeMap<u64, u64> = BTreeMap::new();

        for key in &keys {
            let returned = table.increment(*key).unwrap();
            let count = expected.entry(*key).or_insert(0);
            *count += 1;
            // Property: increment returns the new count
            prop_assert_eq!(returned, *count);
        }

        let expected: Vec<(u64, u64)> = expected.into_iter().collect();
        prop_assert_eq!(table.entries(), expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_capacity_exceeded_leaves_table_unchanged(
        capacity in 1usize..8,
        keys in prop::collection::vec(0u64..16, 1..64),
    ) {
        let table = KeyedCounterTable::new(capacity);

        for key in keys {
            let before = table.entries();
            match table.increment(key) {
                Ok(_) => {}
                Err(ProbeError::CapacityExceeded { key: rejected, .. }) => {
                    prop_assert_eq!(rejected, key);
                    prop_assert_eq!(table.entries(), before);
                    prop_assert_eq!(table.get(key), None);
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
            prop_assert!(table.len() <= capacity);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_get_never_creates_entries(keys in prop::collection::vec(any::<u64>(), 0..50)) {
        let table = KeyedCounterTable::new(4);
        for key in keys {
            prop_assert_eq!(table.get(key), None);
        }
        prop_assert!(table.is_empty());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_dispatch_runs_handler_or_fallback_once(
        registered in prop::collection::btree_set(0u32..64, 0..32),
        opcode in 0u32..128,
    ) {
        let handler_hits = Arc::new(AtomicU64::new(0));
        let fallback_hits = Arc::new(AtomicU64::new(0));

        let counting = |hits: &Arc<AtomicU64>| -> HandlerRef<()> {
            let hits = hits.clone();
            handler(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
                Verdict::Unit
            })
        };

        let mut builder = DispatchTableBuilder::new(64, counting(&fallback_hits));
        let shared = counting(&handler_hits);
        for op in &registered {
            builder.register(*op, shared.clone()).unwrap();
        }
        let table = builder.build();

        let outcome = table.dispatch(opcode, &());

        if registered.contains(&opcode) {
            prop_assert!(outcome.is_handled());
            prop_assert_eq!(handler_hits.load(Ordering::SeqCst), 1);
            prop_assert_eq!(fallback_hits.load(Ordering::SeqCst), 0);
        } else {
            prop_assert!(!outcome.is_handled());
            prop_assert_eq!(handler_hits.load(Ordering::SeqCst), 0);
            prop_assert_eq!(fallback_hits.load(Ordering::SeqCst), 1);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_ring_preserves_submission_order(capacity in 1usize..64, count in 0usize..64) {
        let count = count.min(capacity);
        let ring = EventRing::new(capacity, OverflowPolicy::DropNewest);

        for seq in 0..count as u32 {
            prop_assert_eq!(ring.submit(record(seq)).unwrap(), SubmitResult::Stored);
        }

        let drained: Vec<u32> = ring.drain(capacity).map(|r| r.pid).collect();
        prop_assert_eq!(drained, (0..count as u32).collect::<Vec<_>>());

        // Nothing is delivered twice
        prop_assert_eq!(ring.drain(capacity).count(), 0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_overflow_policies(capacity in 1usize..32, extra in 1usize..16) {
        let total = (capacity + extra) as u32;

        let drop_newest = EventRing::new(capacity, OverflowPolicy::DropNewest);
        let overwrite = EventRing::new(capacity, OverflowPolicy::OverwriteOldest);

        for seq in 0..total {
            let kept = drop_newest.submit(record(seq)).unwrap();
            let evicted = overwrite.submit(record(seq)).unwrap();

            if (seq as usize) < capacity {
                prop_assert_eq!(kept, SubmitResult::Stored);
                prop_assert_eq!(evicted, SubmitResult::Stored);
            } else {
                prop_assert_eq!(kept, SubmitResult::Overflow);
                prop_assert_eq!(evicted, SubmitResult::OverwroteOldest);
            }
        }

        // DropNewest keeps the first `capacity`, OverwriteOldest the last
        let first: Vec<u32> = drop_newest.drain(usize::MAX).map(|r| r.pid).collect();
        let last: Vec<u32> = overwrite.drain(usize::MAX).map(|r| r.pid).collect();
        prop_assert_eq!(first, (0..capacity as u32).collect::<Vec<_>>());
        prop_assert_eq!(last, (extra as u32..total).collect::<Vec<_>>());

        prop_assert_eq!(drop_newest.take_lost(), extra as u64);
        prop_assert_eq!(overwrite.take_lost(), extra as u64);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_drain_zero_is_idempotent(capacity in 1usize..32, count in 0usize..48) {
        let ring = EventRing::new(capacity, OverflowPolicy::OverwriteOldest);
        for seq in 0..count as u32 {
            ring.submit(record(seq)).unwrap();
        }

        let before_len = ring.peek_len();
        let before_stats = ring.stats();

        for _ in 0..3 {
            prop_assert_eq!(ring.drain(0).count(), 0);
        }

        prop_assert_eq!(ring.peek_len(), before_len);
        prop_assert_eq!(ring.stats(), before_stats);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_drain_frees_capacity(capacity in 1usize..32, take in 0usize..32) {
        let ring = EventRing::new(capacity, OverflowPolicy::DropNewest);
        for seq in 0..capacity as u32 {
            ring.submit(record(seq)).unwrap();
        }

        let taken = ring.drain(take).count();
        prop_assert_eq!(taken, take.min(capacity));

        // After draining N records, N more submissions fit
        for seq in 0..taken as u32 {
            prop_assert_eq!(ring.submit(record(seq)).unwrap(), SubmitResult::Stored);
        }
        prop_assert_eq!(ring.submit(record(0)).unwrap(), SubmitResult::Overflow);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_record_decoding_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..80)) {
        // Property: arbitrary input either decodes or reports a malformed record
        match EventRecord::from_bytes(&bytes) {
            Ok(decoded) => {
                prop_assert!(bytes.len() >= EventRecord::ENCODED_LEN);
                prop_assert_eq!(&decoded.to_bytes()[..], &bytes[..EventRecord::ENCODED_LEN]);
            }
            Err(ProbeError::MalformedRecord { len, expected }) => {
                prop_assert_eq!(len, bytes.len());
                prop_assert_eq!(expected, EventRecord::ENCODED_LEN);
            }
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_command_names_truncate_to_fit(command in "[a-zA-Z0-9_é]{0,40}") {
        let rec = EventRecord::new(0, 1, &command, "Hello World");
        let name = rec.command.to_string();

        prop_assert!(name.len() <= 15);
        prop_assert!(command.starts_with(&name));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_config_capacities_parse(
        counter in 1usize..100_000,
        slots in 1usize..1024,
        ring in 1usize..100_000,
    ) {
        use probecore::config::ProbeConfig;

        let text = format!(
            "counter_capacity = {counter}\ndispatch_slots = {slots}\nring_capacity = {ring}\n"
        );
        let config = ProbeConfig::from_toml_str(&text).unwrap();

        prop_assert_eq!(config.counter_capacity, counter);
        prop_assert_eq!(config.dispatch_slots, slots);
        prop_assert_eq!(config.ring_capacity, ring);
        prop_assert!(config.validate().is_ok());
    }
}

#[test]
fn test_distinct_keys_fill_exactly_to_capacity() {
    let table = KeyedCounterTable::new(3);
    let admitted: BTreeSet<u64> = (0..10u64)
        .filter(|key| table.increment(*key).is_ok())
        .collect();
    assert_eq!(admitted, BTreeSet::from([0, 1, 2]));
}
