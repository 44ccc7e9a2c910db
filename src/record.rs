//! Fixed-layout event records carried by the event ring
//!
//! An [`EventRecord`] has a fixed little-endian wire layout:
//!
//! ```text
//! offset  size  field
//! 0       4     principal (uid)
//! 4       4     pid (thread group id)
//! 8       16    command, NUL terminated
//! 24      12    message, NUL padded (all 12 bytes usable)
//! ```

use crate::error::{ProbeError, Result};
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;

/// NUL-padded byte string in a fixed `N`-byte field
///
/// With `NUL` set the last byte is always a terminator, as in a task's
/// `comm`; otherwise a string may fill all `N` bytes. Longer input is
/// truncated on a character boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedStr<const N: usize, const NUL: bool> {
    bytes: [u8; N],
}

impl<const N: usize, const NUL: bool> FixedStr<N, NUL> {
    /// Longest string that fits; terminated strings keep one byte for NUL
    pub const MAX_LEN: usize = if NUL { N - 1 } else { N };

    pub fn new(value: &str) -> Self {
        let mut end = value.len().min(Self::MAX_LEN);
        while !value.is_char_boundary(end) {
            end -= 1;
        }

        let mut bytes = [0u8; N];
        bytes[..end].copy_from_slice(&value.as_bytes()[..end]);
        Self { bytes }
    }

    /// Wrap raw bytes read off the wire
    pub fn from_raw(bytes: [u8; N]) -> Self {
        Self { bytes }
    }

    /// Bytes up to the first NUL
    pub fn as_bytes(&self) -> &[u8] {
        let end = self.bytes.iter().position(|&b| b == 0).unwrap_or(N);
        &self.bytes[..end]
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    pub fn raw(&self) -> &[u8; N] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes[0] == 0
    }
}

impl<const N: usize, const NUL: bool> Default for FixedStr<N, NUL> {
    fn default() -> Self {
        Self { bytes: [0u8; N] }
    }
}

impl<const N: usize, const NUL: bool> fmt::Debug for FixedStr<N, NUL> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

impl<const N: usize, const NUL: bool> fmt::Display for FixedStr<N, NUL> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl<const N: usize, const NUL: bool> Serialize for FixedStr<N, NUL> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_lossy())
    }
}

/// Task command name (16 bytes, like `TASK_COMM_LEN`, always NUL terminated)
pub type CommandName = FixedStr<16, true>;

/// Short record message, filling the whole 12-byte field when needed
pub type Message = FixedStr<12, false>;

/// Anything that can travel through an [`EventRing`](crate::ring::EventRing)
///
/// The ring rejects records whose encoded length exceeds its configured
/// maximum record size.
pub trait Record: Send {
    fn encoded_len(&self) -> usize;
}

/// Structured event emitted by the probe core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EventRecord {
    /// User id of the task that triggered the event
    pub principal: u32,
    /// Process (thread group) id
    pub pid: u32,
    pub command: CommandName,
    pub message: Message,
}

impl EventRecord {
    /// Size of the wire encoding in bytes
    pub const ENCODED_LEN: usize = 4 + 4 + 16 + 12;

    pub fn new(principal: u32, pid: u32, command: &str, message: &str) -> Self {
        Self {
            principal,
            pid,
            command: CommandName::new(command),
            message: Message::new(message),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..4].copy_from_slice(&self.principal.to_le_bytes());
        out[4..8].copy_from_slice(&self.pid.to_le_bytes());
        out[8..24].copy_from_slice(self.command.raw());
        out[24..36].copy_from_slice(self.message.raw());
        out
    }

    /// Decode a record from the start of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; Self::ENCODED_LEN] = bytes
            .get(..Self::ENCODED_LEN)
            .and_then(|head| head.try_into().ok())
            .ok_or(ProbeError::MalformedRecord {
                len: bytes.len(),
                expected: Self::ENCODED_LEN,
            })?;

        let mut principal = [0u8; 4];
        let mut pid = [0u8; 4];
        let mut command = [0u8; 16];
        let mut message = [0u8; 12];
        principal.copy_from_slice(&bytes[0..4]);
        pid.copy_from_slice(&bytes[4..8]);
        command.copy_from_slice(&bytes[8..24]);
        message.copy_from_slice(&bytes[24..36]);

        Ok(Self {
            principal: u32::from_le_bytes(principal),
            pid: u32::from_le_bytes(pid),
            command: CommandName::from_raw(command),
            message: Message::from_raw(message),
        })
    }
}

impl Record for EventRecord {
    fn encoded_len(&self) -> usize {
        Self::ENCODED_LEN
    }
}

/// Variable-length raw records
impl Record for Vec<u8> {
    fn encoded_len(&self) -> usize {
        self.len()
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.pid, self.principal, self.command, self.message
        )
    }
}
