//! Opcode-indexed tail-dispatch table
//!
//! A fixed array of handler slots indexed by opcode, plus one fallback
//! handler for every opcode without an entry. Handlers are registered while
//! the table is being built; the built table is immutable, so dispatch is a
//! bounds check and an index with no locking on the hot path.
//!
//! # Tail calls
//!
//! Dispatch is a call, not a jump: the caller gets a [`DispatchOutcome`]
//! back and decides whether to run its own trailing logic (e.g. a default
//! trace line when only the fallback ran). Handlers receive an
//! [`Invocation`] and may dispatch again on the same table; nesting stops at
//! [`MAX_TAIL_CALL_DEPTH`].
//!
//! # Example
//!
//! ```
//! use probecore::dispatch::{handler, DispatchOutcome, DispatchTableBuilder, Verdict};
//!
//! let mut builder = DispatchTableBuilder::<u32>::new(300, handler(|_| Verdict::Unit));
//! builder.register(59, handler(|_| Verdict::Continue)).unwrap();
//! let table = builder.build();
//!
//! assert_eq!(table.dispatch(59, &0), DispatchOutcome::Handled(Verdict::Continue));
//! assert_eq!(table.dispatch(60, &0), DispatchOutcome::Fallback(Verdict::Unit));
//! ```

use crate::counter_table::GlobalCounter;
use crate::error::{ProbeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Maximum nesting of dispatches from within handlers (the kernel's tail call limit)
pub const MAX_TAIL_CALL_DEPTH: usize = 33;

/// Per-event decision returned by handlers and the probe core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Packet-style: continue normal processing
    Continue,
    /// Packet-style: drop the event
    Drop,
    /// Trace-style: no decision
    #[default]
    Unit,
}

/// A dispatch target
pub trait Handler<E>: Send + Sync {
    fn handle(&self, call: &Invocation<'_, E>) -> Verdict;
}

impl<E, F> Handler<E> for F
where
    F: Fn(&Invocation<'_, E>) -> Verdict + Send + Sync,
{
    fn handle(&self, call: &Invocation<'_, E>) -> Verdict {
        self(call)
    }
}

/// Shared handler reference; one handler may sit in many slots
pub type HandlerRef<E> = Arc<dyn Handler<E>>;

/// Wrap a closure as a [`HandlerRef`]
pub fn handler<E, F>(f: F) -> HandlerRef<E>
where
    F: Fn(&Invocation<'_, E>) -> Verdict + Send + Sync + 'static,
{
    Arc::new(f)
}

/// What a dispatch ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A registered handler ran and returned this verdict
    Handled(Verdict),
    /// No handler for the opcode; the fallback ran and returned this verdict
    Fallback(Verdict),
    /// Nesting limit reached; nothing ran
    DepthExceeded,
}

impl DispatchOutcome {
    pub fn verdict(&self) -> Option<Verdict> {
        match *self {
            DispatchOutcome::Handled(verdict) | DispatchOutcome::Fallback(verdict) => Some(verdict),
            DispatchOutcome::DepthExceeded => None,
        }
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, DispatchOutcome::Handled(_))
    }
}

/// A single handler invocation
pub struct Invocation<'a, E> {
    table: &'a DispatchTable<E>,
    opcode: u32,
    event: &'a E,
    depth: usize,
}

impl<'a, E> Invocation<'a, E> {
    /// Opcode this invocation was dispatched on
    pub fn opcode(&self) -> u32 {
        self.opcode
    }

    pub fn event(&self) -> &'a E {
        self.event
    }

    /// Number of enclosing dispatches (0 for a top-level dispatch)
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Tail-dispatch the same event to another opcode
    pub fn dispatch(&self, opcode: u32) -> DispatchOutcome {
        self.table.dispatch_at(opcode, self.event, self.depth + 1)
    }

    /// Tail-dispatch a different event
    pub fn dispatch_with(&self, opcode: u32, event: &E) -> DispatchOutcome {
        self.table.dispatch_at(opcode, event, self.depth + 1)
    }
}

/// Setup-phase builder for a [`DispatchTable`]
pub struct DispatchTableBuilder<E> {
    slots: Vec<Option<HandlerRef<E>>>,
    fallback: HandlerRef<E>,
}

impl<E> DispatchTableBuilder<E> {
    /// Create a builder with `slots` opcode slots (`0..slots`)
    ///
    /// # Panics
    ///
    /// Panics if slots is 0.
    pub fn new(slots: usize, fallback: HandlerRef<E>) -> Self {
        assert!(slots > 0, "Dispatch table must have > 0 slots");

        Self {
            slots: (0..slots).map(|_| None).collect(),
            fallback,
        }
    }

    /// Install a handler for an opcode that has none yet
    pub fn register(&mut self, opcode: u32, handler: HandlerRef<E>) -> Result<()> {
        let slot = self.slot_mut(opcode)?;
        if slot.is_some() {
            return Err(ProbeError::DuplicateOpcode { opcode });
        }
        *slot = Some(handler);
        Ok(())
    }

    /// Install or replace a handler, returning the previous one
    pub fn replace(
        &mut self,
        opcode: u32,
        handler: HandlerRef<E>,
    ) -> Result<Option<HandlerRef<E>>> {
        let slot = self.slot_mut(opcode)?;
        Ok(slot.replace(handler))
    }

    pub fn set_fallback(&mut self, fallback: HandlerRef<E>) {
        self.fallback = fallback;
    }

    pub fn is_registered(&self, opcode: u32) -> bool {
        matches!(self.slots.get(opcode as usize), Some(Some(_)))
    }

    /// Freeze the table
    pub fn build(self) -> DispatchTable<E> {
        DispatchTable {
            slots: self.slots.into_boxed_slice(),
            fallback: self.fallback,
            handled: GlobalCounter::new(),
            fallbacks: GlobalCounter::new(),
        }
    }

    fn slot_mut(&mut self, opcode: u32) -> Result<&mut Option<HandlerRef<E>>> {
        let slots = self.slots.len();
        self.slots
            .get_mut(opcode as usize)
            .ok_or(ProbeError::OpcodeOutOfRange { opcode, slots })
    }
}

/// Immutable opcode → handler table with a fallback
pub struct DispatchTable<E> {
    slots: Box<[Option<HandlerRef<E>>]>,
    fallback: HandlerRef<E>,
    handled: GlobalCounter,
    fallbacks: GlobalCounter,
}

impl<E> DispatchTable<E> {
    /// Run the handler registered for `opcode`, or the fallback
    pub fn dispatch(&self, opcode: u32, event: &E) -> DispatchOutcome {
        self.dispatch_at(opcode, event, 0)
    }

    fn dispatch_at(&self, opcode: u32, event: &E, depth: usize) -> DispatchOutcome {
        if depth >= MAX_TAIL_CALL_DEPTH {
            tracing::warn!(opcode, depth, "tail call depth exhausted");
            return DispatchOutcome::DepthExceeded;
        }

        let call = Invocation {
            table: self,
            opcode,
            event,
            depth,
        };

        match self.lookup(opcode) {
            Some(target) => {
                self.handled.increment();
                DispatchOutcome::Handled(target.handle(&call))
            }
            None => {
                self.fallbacks.increment();
                DispatchOutcome::Fallback(self.fallback.handle(&call))
            }
        }
    }

    fn lookup(&self, opcode: u32) -> Option<&HandlerRef<E>> {
        self.slots.get(opcode as usize).and_then(Option::as_ref)
    }

    pub fn is_registered(&self, opcode: u32) -> bool {
        self.lookup(opcode).is_some()
    }

    /// Number of opcode slots
    pub fn slots(&self) -> usize {
        self.slots.len()
    }

    /// Number of opcodes with a handler
    pub fn registered(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            handled: self.handled.get(),
            fallbacks: self.fallbacks.get(),
        }
    }
}

impl<E> fmt::Debug for DispatchTable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("slots", &self.slots())
            .field("registered", &self.registered())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Dispatch statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    /// Dispatches that found a registered handler
    pub handled: u64,
    /// Dispatches that ran the fallback
    pub fallbacks: u64,
}
