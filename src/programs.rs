//! Stock syscall-entry programs for the dispatch table
//!
//! A root handler dispatches every syscall entry by syscall number. The exec
//! handler reports new programs, one timer handler serves all five POSIX
//! timer syscalls, and a no-op handler silences opcodes that fire too often
//! to be worth tracing. Anything else falls through to the probe core's
//! "Another syscall" trace line.

use crate::context::EventContext;
use crate::dispatch::{handler, Invocation, Verdict};
use crate::error::{ProbeError, Result};
use crate::probe::{EventHandlerRef, ProbeSetup};

/// x86_64 `execve`
pub const EXECVE: u32 = 59;
/// x86_64 `timer_create`
pub const TIMER_CREATE: u32 = 222;
/// x86_64 `timer_delete`
pub const TIMER_DELETE: u32 = 226;

/// `timer_create` through `timer_delete`
pub const TIMER_OPCODES: std::ops::RangeInclusive<u32> = TIMER_CREATE..=TIMER_DELETE;

/// Syscalls frequent enough to drown the trace output
pub const IGNORED_OPCODES: [u32; 23] = [
    21, 22, 25, 29, 56, 57, 63, 64, 66, 72, 73, 79, 98, 101, 115, 131, 134, 135, 139, 172, 233,
    280, 291,
];

/// Trace line for a timer opcode
pub fn timer_operation(opcode: u32) -> &'static str {
    match opcode {
        TIMER_CREATE => "Creating a timer",
        TIMER_DELETE => "Deleting a timer",
        _ => "Some other timer operation",
    }
}

pub fn hello_exec() -> EventHandlerRef {
    handler(|call: &Invocation<'_, EventContext>| {
        let task = &call.event().task;
        tracing::trace!(pid = task.tgid, uid = task.uid, "Executing a program");
        Verdict::Unit
    })
}

pub fn hello_timer() -> EventHandlerRef {
    handler(|call: &Invocation<'_, EventContext>| {
        tracing::trace!(opcode = call.opcode(), "{}", timer_operation(call.opcode()));
        Verdict::Unit
    })
}

pub fn ignore_opcode() -> EventHandlerRef {
    handler(|_| Verdict::Unit)
}

/// Every opcode [`install_syscall_programs`] registers
pub fn syscall_program_opcodes() -> impl Iterator<Item = u32> {
    std::iter::once(EXECVE)
        .chain(TIMER_OPCODES)
        .chain(IGNORED_OPCODES)
}

/// Register the exec, timer and ignore programs on `setup`
///
/// All opcodes are checked first: if any is already taken or outside the
/// dispatch table, nothing is registered and `setup` is left unchanged.
pub fn install_syscall_programs(setup: &mut ProbeSetup) -> Result<()> {
    let slots = setup.config().dispatch_slots;
    for opcode in syscall_program_opcodes() {
        if opcode as usize >= slots {
            return Err(ProbeError::OpcodeOutOfRange { opcode, slots });
        }
        if setup.is_registered(opcode) {
            return Err(ProbeError::DuplicateOpcode { opcode });
        }
    }

    setup.register_handler(EXECVE, hello_exec())?;

    let timer = hello_timer();
    for opcode in TIMER_OPCODES {
        setup.register_handler(opcode, timer.clone())?;
    }

    let ignore = ignore_opcode();
    for opcode in IGNORED_OPCODES {
        setup.register_handler(opcode, ignore.clone())?;
    }

    Ok(())
}
