//! Probe core: per-event orchestration of counting, dispatch and emission
//!
//! ```text
//!   ProbeSetup::initialize(config)      Uninitialized (registration phase)
//!        │  register_handler(opcode, h)
//!        ▼
//!   setup.activate()                    Ready
//!        │  handle_event(ctx)
//!        ▼
//!   steady state                        Active
//!        │  teardown()
//!        ▼
//!   handle_event → NotReady             TornDown
//! ```
//!
//! `ProbeCore` is `Send + Sync`; share it behind an `Arc` and call
//! `handle_event` from as many contexts as the hook layer provides. The
//! event ring is reference counted separately, so a consumer holding
//! [`ProbeCore::event_ring`] keeps draining after the core is gone.

use crate::config::{Behavior, ProbeConfig};
use crate::context::{EventContext, KeySource};
use crate::counter_table::{GlobalCounter, Key, KeyedCounterTable};
use crate::dispatch::{
    handler, DispatchOutcome, DispatchStats, DispatchTable, DispatchTableBuilder, HandlerRef,
    Verdict,
};
use crate::error::{ConfigError, ProbeError, Result};
use crate::record::{EventRecord, Message};
use crate::ring::{EventRing, RingStats, SubmitResult};
use fnv::FnvHashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Handler over probe events
pub type EventHandlerRef = HandlerRef<EventContext>;

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Uninitialized,
    Ready,
    Active,
    TornDown,
}

const READY: u8 = 0;
const ACTIVE: u8 = 1;
const TORN_DOWN: u8 = 2;

/// Setup phase: components are constructed, handlers are being registered
pub struct ProbeSetup {
    config: ProbeConfig,
    counters: KeyedCounterTable,
    dispatch: DispatchTableBuilder<EventContext>,
    ring: Arc<EventRing>,
}

impl ProbeSetup {
    /// Validate `config` and construct the counter table, dispatch table and ring
    pub fn initialize(config: ProbeConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let fallback_verdict = config.default_verdict;
        let setup = Self {
            counters: KeyedCounterTable::new(config.counter_capacity),
            dispatch: DispatchTableBuilder::new(
                config.dispatch_slots,
                handler(move |_| fallback_verdict),
            ),
            ring: Arc::new(EventRing::with_max_record_size(
                config.ring_capacity,
                config.overflow_policy,
                config.max_record_size,
            )),
            config,
        };

        tracing::info!(
            counter_capacity = setup.config.counter_capacity,
            dispatch_slots = setup.config.dispatch_slots,
            ring_capacity = setup.config.ring_capacity,
            overflow_policy = ?setup.config.overflow_policy,
            "probe core initialized"
        );

        Ok(setup)
    }

    pub fn state(&self) -> ProbeState {
        ProbeState::Uninitialized
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Register the handler for `opcode`; each opcode may be registered once
    pub fn register_handler(&mut self, opcode: u32, handler: EventHandlerRef) -> Result<()> {
        self.dispatch.register(opcode, handler)?;
        tracing::debug!(opcode, "handler registered");
        Ok(())
    }

    pub fn is_registered(&self, opcode: u32) -> bool {
        self.dispatch.is_registered(opcode)
    }

    /// Install or replace the handler for `opcode`
    pub fn replace_handler(
        &mut self,
        opcode: u32,
        handler: EventHandlerRef,
    ) -> Result<Option<EventHandlerRef>> {
        self.dispatch.replace(opcode, handler)
    }

    /// Replace the fallback run for opcodes without a handler
    pub fn set_fallback(&mut self, fallback: EventHandlerRef) {
        self.dispatch.set_fallback(fallback);
    }

    /// Consumer side of the ring; may be taken before activation
    pub fn event_ring(&self) -> Arc<EventRing> {
        self.ring.clone()
    }

    /// Freeze the dispatch table and start accepting events
    pub fn activate(self) -> ProbeCore {
        let messages = self
            .config
            .messages
            .iter()
            .map(|o| (o.principal, Message::new(&o.message)))
            .collect();

        let core = ProbeCore {
            state: AtomicU8::new(READY),
            counters: self.counters,
            dispatch: self.dispatch.build(),
            ring: self.ring,
            behavior: self.config.behavior,
            default_verdict: self.config.default_verdict,
            default_message: Message::new(&self.config.default_message),
            messages,
            global: GlobalCounter::new(),
            events: GlobalCounter::new(),
            capacity_exceeded: GlobalCounter::new(),
        };

        tracing::info!(
            registered = core.dispatch.registered(),
            "probe core ready"
        );

        core
    }
}

/// Steady-state probe core
pub struct ProbeCore {
    state: AtomicU8,
    counters: KeyedCounterTable,
    dispatch: DispatchTable<EventContext>,
    ring: Arc<EventRing>,
    behavior: Behavior,
    default_verdict: Verdict,
    default_message: Message,
    messages: FnvHashMap<u32, Message>,

    /// Counter for `KeySource::Global` events
    global: GlobalCounter,

    /// Metrics: every handled event
    events: GlobalCounter,

    /// Metrics: events whose key did not fit in the counter table
    capacity_exceeded: GlobalCounter,
}

impl ProbeCore {
    /// Process one event from the hook layer
    ///
    /// Counts the event under its derived key, dispatches on its opcode and
    /// emits a record, as configured. Returns the dispatched handler's
    /// verdict, or the configured default verdict when no handler decided.
    /// A full counter table or ring does not fail the event; both are
    /// counted in [`ProbeCore::stats`].
    pub fn handle_event(&self, ctx: &EventContext) -> Result<Verdict> {
        match self.state.load(Ordering::Acquire) {
            TORN_DOWN => return Err(ProbeError::NotReady),
            READY => {
                let _ = self.state.compare_exchange(
                    READY,
                    ACTIVE,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
            _ => {}
        }

        let seen = self.events.increment();
        tracing::trace!(events = seen, "Hello World");

        if self.behavior.count {
            if ctx.key_source == KeySource::Global {
                self.global.increment();
            } else if let Some(key) = ctx.derive_key() {
                if let Err(err) = self.counters.increment(key) {
                    self.capacity_exceeded.increment();
                    tracing::debug!(key, %err, "event not aggregated");
                }
            }
        }

        let mut verdict = self.default_verdict;

        if self.behavior.dispatch {
            if let Some(opcode) = ctx.opcode {
                match self.dispatch.dispatch(opcode, ctx) {
                    DispatchOutcome::Handled(decided) => verdict = decided,
                    DispatchOutcome::Fallback(decided) => {
                        tracing::trace!(opcode, "Another syscall: {}", opcode);
                        verdict = decided;
                    }
                    DispatchOutcome::DepthExceeded => {}
                }
            }
        }

        if self.behavior.emit {
            let record = self.record_for(ctx);
            if let result @ (SubmitResult::Overflow | SubmitResult::OverwroteOldest) =
                self.ring.submit(record)?
            {
                tracing::debug!(?result, "event ring full");
            }
        }

        Ok(verdict)
    }

    /// Stop accepting events; draining and counter reads stay available
    pub fn teardown(&self) {
        if self.state.swap(TORN_DOWN, Ordering::AcqRel) != TORN_DOWN {
            tracing::info!(events = self.events.get(), "probe core torn down");
        }
    }

    pub fn state(&self) -> ProbeState {
        match self.state.load(Ordering::Acquire) {
            READY => ProbeState::Ready,
            ACTIVE => ProbeState::Active,
            _ => ProbeState::TornDown,
        }
    }

    /// Count recorded for `key`, if the key has been seen
    pub fn read_counter(&self, key: Key) -> Option<u64> {
        self.counters.get(key)
    }

    /// Value of the global counter fed by `KeySource::Global` events
    pub fn read_global_counter(&self) -> u64 {
        self.global.get()
    }

    /// Every `(key, count)` pair, sorted by key
    pub fn counter_entries(&self) -> Vec<(Key, u64)> {
        self.counters.entries()
    }

    /// Remove up to `max` of the oldest records
    pub fn drain_events(&self, max: usize) -> Vec<EventRecord> {
        self.ring.drain(max).collect()
    }

    /// Shared handle to the event ring for an external consumer
    pub fn event_ring(&self) -> Arc<EventRing> {
        self.ring.clone()
    }

    pub fn dispatch_table(&self) -> &DispatchTable<EventContext> {
        &self.dispatch
    }

    pub fn stats(&self) -> ProbeStats {
        ProbeStats {
            events: self.events.get(),
            capacity_exceeded: self.capacity_exceeded.get(),
            global: self.global.get(),
            counter_keys: self.counters.len(),
            dispatch: self.dispatch.stats(),
            ring: self.ring.stats(),
        }
    }

    fn record_for(&self, ctx: &EventContext) -> EventRecord {
        let task = &ctx.task;
        EventRecord {
            principal: task.uid,
            pid: task.tgid,
            command: task.command,
            message: self
                .messages
                .get(&task.uid)
                .copied()
                .unwrap_or(self.default_message),
        }
    }
}

/// Probe core statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeStats {
    /// Events handled
    pub events: u64,
    /// Events whose new key did not fit in the counter table
    pub capacity_exceeded: u64,
    /// Global counter value
    pub global: u64,
    /// Distinct keys in the counter table
    pub counter_keys: usize,
    pub dispatch: DispatchStats,
    pub ring: RingStats,
}
