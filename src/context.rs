//! Event contexts delivered by the hook layer

use crate::counter_table::Key;
use crate::record::CommandName;
use serde::{Deserialize, Serialize};

/// Identity of the task that triggered an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskIdentity {
    pub uid: u32,
    pub gid: u32,
    /// Thread id
    pub pid: u32,
    /// Thread group id (what user space calls the process id)
    pub tgid: u32,
    pub command: CommandName,
}

impl TaskIdentity {
    /// Build an identity from the packed 64-bit helper values
    ///
    /// `pid_tgid` carries the thread group id in the upper 32 bits and the
    /// thread id in the lower 32; `uid_gid` carries the gid in the upper 32
    /// bits and the uid in the lower 32.
    pub fn from_helper_values(pid_tgid: u64, uid_gid: u64, command: &str) -> Self {
        Self {
            uid: (uid_gid & 0xFFFF_FFFF) as u32,
            gid: (uid_gid >> 32) as u32,
            pid: (pid_tgid & 0xFFFF_FFFF) as u32,
            tgid: (pid_tgid >> 32) as u32,
            command: CommandName::new(command),
        }
    }

    pub fn pid_tgid(&self) -> u64 {
        (u64::from(self.tgid) << 32) | u64::from(self.pid)
    }

    pub fn uid_gid(&self) -> u64 {
        (u64::from(self.gid) << 32) | u64::from(self.uid)
    }

    /// Identity of the calling process
    pub fn current() -> Self {
        let pid = nix::unistd::getpid().as_raw() as u32;

        Self {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            pid,
            tgid: pid,
            command: CommandName::new(&current_command()),
        }
    }
}

fn current_command() -> String {
    if let Ok(comm) = std::fs::read_to_string("/proc/self/comm") {
        return comm.trim_end().to_string();
    }

    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_default()
}

/// How the probe core derives a counter key from an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// The triggering task's uid
    #[default]
    Principal,
    /// The event's opcode (e.g. syscall number)
    Opcode,
    /// One process-wide counter shared by every event (packet hooks)
    Global,
    /// No key: nothing is counted
    None,
}

/// Opaque event handed to [`ProbeCore::handle_event`](crate::probe::ProbeCore::handle_event)
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub task: TaskIdentity,
    /// Dispatch opcode, if the event carries one
    pub opcode: Option<u32>,
    pub key_source: KeySource,
    /// Raw event bytes (e.g. packet data)
    pub payload: Vec<u8>,
}

impl EventContext {
    /// Event keyed by the triggering task's uid
    pub fn for_principal(task: TaskIdentity) -> Self {
        Self {
            task,
            opcode: None,
            key_source: KeySource::Principal,
            payload: Vec::new(),
        }
    }

    /// Syscall-entry event keyed and dispatched by syscall number
    pub fn for_syscall(task: TaskIdentity, opcode: u32) -> Self {
        Self {
            task,
            opcode: Some(opcode),
            key_source: KeySource::Opcode,
            payload: Vec::new(),
        }
    }

    /// Packet event counted on the global counter
    pub fn for_packet(payload: Vec<u8>) -> Self {
        Self {
            task: TaskIdentity::default(),
            opcode: None,
            key_source: KeySource::Global,
            payload,
        }
    }

    pub fn with_key_source(mut self, key_source: KeySource) -> Self {
        self.key_source = key_source;
        self
    }

    pub fn with_opcode(mut self, opcode: u32) -> Self {
        self.opcode = Some(opcode);
        self
    }

    /// Key for the counter table, per `key_source`
    ///
    /// `Global` and `None` have no per-key entry.
    pub fn derive_key(&self) -> Option<Key> {
        match self.key_source {
            KeySource::Principal => Some(Key::from(self.task.uid)),
            KeySource::Opcode => self.opcode.map(Key::from),
            KeySource::Global | KeySource::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_values_unpack() {
        let pid_tgid = (4321u64 << 32) | 4325;
        let uid_gid = (100u64 << 32) | 501;
        let task = TaskIdentity::from_helper_values(pid_tgid, uid_gid, "bash");

        assert_eq!(task.tgid, 4321);
        assert_eq!(task.pid, 4325);
        assert_eq!(task.uid, 501);
        assert_eq!(task.gid, 100);
        assert_eq!(task.pid_tgid(), pid_tgid);
        assert_eq!(task.uid_gid(), uid_gid);
    }

    #[test]
    fn test_current_task_matches_process() {
        let task = TaskIdentity::current();
        assert_eq!(task.tgid, std::process::id());
    }

    #[test]
    fn test_derive_key_per_source() {
        let task = TaskIdentity::from_helper_values(0, 501, "sh");

        assert_eq!(EventContext::for_principal(task).derive_key(), Some(501));
        assert_eq!(EventContext::for_syscall(task, 59).derive_key(), Some(59));
        assert_eq!(EventContext::for_packet(vec![0xff]).derive_key(), None);
        assert_eq!(
            EventContext::for_principal(task)
                .with_key_source(KeySource::Opcode)
                .derive_key(),
            None
        );
    }
}
