//! probecore - event instrumentation core
//!
//! Three mechanisms distilled from small kernel probes, usable outside any
//! kernel hosting environment:
//!
//! - [`counter_table`]: lock-free keyed counting (per-user event counts)
//! - [`dispatch`]: opcode-indexed tail dispatch with a fallback handler
//! - [`ring`]: bounded, non-blocking event transport to a consumer
//!
//! [`probe::ProbeCore`] ties them together per event. Attaching to hook
//! points and reading the ring from another process are left to the host.
//!
//! # Example
//!
//! ```
//! use probecore::prelude::*;
//!
//! let mut setup = ProbeSetup::initialize(ProbeConfig::default()).unwrap();
//! probecore::programs::install_syscall_programs(&mut setup).unwrap();
//! let core = setup.activate();
//!
//! let task = TaskIdentity::from_helper_values(1234 << 32, 501, "bash");
//! core.handle_event(&EventContext::for_principal(task)).unwrap();
//!
//! assert_eq!(core.read_counter(501), Some(1));
//! let records = core.drain_events(16);
//! assert_eq!(records[0].to_string(), "1234 501 bash Hello World");
//! ```

pub mod config;
pub mod context;
pub mod counter_table;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod probe;
pub mod programs;
pub mod record;
pub mod ring;

pub mod prelude {
    pub use crate::config::{Behavior, ProbeConfig};
    pub use crate::context::{EventContext, KeySource, TaskIdentity};
    pub use crate::dispatch::{handler, DispatchOutcome, Invocation, Verdict};
    pub use crate::error::{ConfigError, ProbeError};
    pub use crate::probe::{ProbeCore, ProbeSetup, ProbeState, ProbeStats};
    pub use crate::record::EventRecord;
    pub use crate::ring::{EventRing, OverflowPolicy, SubmitResult};
}
