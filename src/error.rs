//! Error types for the instrumentation core

use thiserror::Error;

/// Errors raised while building or validating a probe configuration.
///
/// These are fatal to startup: they surface from `ProbeSetup::initialize`
/// before any event is handled.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("counter_capacity must be > 0")]
    ZeroCounterCapacity,

    #[error("dispatch_slots must be > 0")]
    ZeroDispatchSlots,

    #[error("ring_capacity must be > 0")]
    ZeroRingCapacity,

    #[error("{field} of {value} exceeds the limit of {max}")]
    CapacityTooLarge {
        field: &'static str,
        value: usize,
        max: usize,
    },

    #[error("max_record_size must be >= {required} bytes, got {configured}")]
    RecordSizeTooSmall { configured: usize, required: usize },

    #[error("default message is {len} bytes, limit is {max}")]
    DefaultMessageTooLong { len: usize, max: usize },

    #[error("message for principal {principal} is {len} bytes, limit is {max}")]
    MessageTooLong {
        principal: u32,
        len: usize,
        max: usize,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the counter table, dispatch table, event ring and probe core
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("counter table full ({capacity} keys), cannot insert key {key}")]
    CapacityExceeded { key: u64, capacity: usize },

    #[error("opcode {opcode} already has a registered handler")]
    DuplicateOpcode { opcode: u32 },

    #[error("opcode {opcode} outside dispatch table of {slots} slots")]
    OpcodeOutOfRange { opcode: u32, slots: usize },

    #[error("record of {size} bytes exceeds ring limit of {max} bytes")]
    RecordTooLarge { size: usize, max: usize },

    #[error("malformed record: {len} bytes, expected {expected}")]
    MalformedRecord { len: usize, expected: usize },

    #[error("probe core is not ready (torn down)")]
    NotReady,
}

pub type Result<T> = std::result::Result<T, ProbeError>;
