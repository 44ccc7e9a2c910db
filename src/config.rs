// Probe core configuration
//
// Capacities, overflow policy and per-event behavior, loadable from TOML.
// Every capacity is fixed at initialization; nothing here changes while
// events are being handled.

use crate::dispatch::Verdict;
use crate::error::ConfigError;
use crate::record::{EventRecord, Message};
use crate::ring::OverflowPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound for `counter_capacity` and `ring_capacity`
pub const MAX_CAPACITY: usize = 1 << 20;

/// Upper bound for `dispatch_slots`
pub const MAX_DISPATCH_SLOTS: usize = 1 << 16;

/// Which mechanisms `handle_event` exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Behavior {
    /// Increment the keyed counter table
    pub count: bool,
    /// Dispatch events carrying an opcode
    pub dispatch: bool,
    /// Submit an event record to the ring
    pub emit: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            count: true,
            dispatch: true,
            emit: true,
        }
    }
}

/// Message emitted for one principal instead of the default message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageOverride {
    pub principal: u32,
    pub message: String,
}

/// Configuration for [`ProbeSetup::initialize`](crate::probe::ProbeSetup::initialize)
///
/// # Example
/// ```
/// use probecore::config::ProbeConfig;
///
/// let config = ProbeConfig::from_toml_str(r#"
///     counter_capacity = 2
///     ring_capacity = 4
///     overflow_policy = "drop_newest"
///
///     [[messages]]
///     principal = 0
///     message = "Hey root!"
/// "#).unwrap();
///
/// assert_eq!(config.counter_capacity, 2);
/// assert_eq!(config.dispatch_slots, 300);
/// assert_eq!(config.message_for(0), "Hey root!");
/// assert_eq!(config.message_for(1000), "Hello World");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Maximum distinct keys in the counter table
    ///
    /// Default: 10240, the kernel's default hash map size
    pub counter_capacity: usize,

    /// Opcode slots in the dispatch table (`0..dispatch_slots`)
    ///
    /// Default: 300, enough for every x86_64 syscall number in use
    pub dispatch_slots: usize,

    /// Records the event ring holds before overflowing
    pub ring_capacity: usize,

    pub overflow_policy: OverflowPolicy,

    /// Largest encoded record the ring accepts
    pub max_record_size: usize,

    /// Verdict returned when no dispatch handler decided
    pub default_verdict: Verdict,

    /// Message written into emitted records
    pub default_message: String,

    pub behavior: Behavior,

    /// Per-principal message overrides
    pub messages: Vec<MessageOverride>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            counter_capacity: 10240,
            dispatch_slots: 300,
            ring_capacity: 8192,
            overflow_policy: OverflowPolicy::DropNewest,
            max_record_size: EventRecord::ENCODED_LEN,
            default_verdict: Verdict::Unit,
            default_message: "Hello World".to_string(),
            behavior: Behavior::default(),
            messages: Vec::new(),
        }
    }
}

impl ProbeConfig {
    /// Packet-hook preset: verdict `Continue`, no records
    ///
    /// Counting stays on; packet contexts feed the global counter
    /// ([`ProbeCore::read_global_counter`](crate::probe::ProbeCore::read_global_counter)).
    pub fn packet() -> Self {
        Self {
            behavior: Behavior {
                count: true,
                dispatch: false,
                emit: false,
            },
            default_verdict: Verdict::Continue,
            ..Self::default()
        }
    }

    /// Trace preset: every mechanism enabled, verdict `Unit`
    pub fn trace() -> Self {
        Self::default()
    }

    pub fn with_counter_capacity(mut self, capacity: usize) -> Self {
        self.counter_capacity = capacity;
        self
    }

    pub fn with_dispatch_slots(mut self, slots: usize) -> Self {
        self.dispatch_slots = slots;
        self
    }

    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_message(mut self, principal: u32, message: impl Into<String>) -> Self {
        let message = message.into();
        match self.messages.iter_mut().find(|o| o.principal == principal) {
            Some(existing) => existing.message = message,
            None => self.messages.push(MessageOverride { principal, message }),
        }
        self
    }

    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Message for records emitted on behalf of `principal`
    pub fn message_for(&self, principal: u32) -> &str {
        self.messages
            .iter()
            .find(|o| o.principal == principal)
            .map_or(self.default_message.as_str(), |o| o.message.as_str())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.counter_capacity == 0 {
            return Err(ConfigError::ZeroCounterCapacity);
        }

        if self.dispatch_slots == 0 {
            return Err(ConfigError::ZeroDispatchSlots);
        }

        if self.ring_capacity == 0 {
            return Err(ConfigError::ZeroRingCapacity);
        }

        for (field, value, max) in [
            ("counter_capacity", self.counter_capacity, MAX_CAPACITY),
            ("dispatch_slots", self.dispatch_slots, MAX_DISPATCH_SLOTS),
            ("ring_capacity", self.ring_capacity, MAX_CAPACITY),
        ] {
            if value > max {
                return Err(ConfigError::CapacityTooLarge { field, value, max });
            }
        }

        if self.max_record_size < EventRecord::ENCODED_LEN {
            return Err(ConfigError::RecordSizeTooSmall {
                configured: self.max_record_size,
                required: EventRecord::ENCODED_LEN,
            });
        }

        if self.default_message.len() > Message::MAX_LEN {
            return Err(ConfigError::DefaultMessageTooLong {
                len: self.default_message.len(),
                max: Message::MAX_LEN,
            });
        }

        for o in &self.messages {
            if o.message.len() > Message::MAX_LEN {
                return Err(ConfigError::MessageTooLong {
                    principal: o.principal,
                    len: o.message.len(),
                    max: Message::MAX_LEN,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProbeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.counter_capacity, 10240);
        assert_eq!(config.dispatch_slots, 300);
        assert_eq!(config.ring_capacity, 8192);
        assert_eq!(config.overflow_policy, OverflowPolicy::DropNewest);
    }

    #[test]
    fn test_zero_capacities_rejected() {
        assert!(matches!(
            ProbeConfig::default().with_counter_capacity(0).validate(),
            Err(ConfigError::ZeroCounterCapacity)
        ));
        assert!(matches!(
            ProbeConfig::default().with_dispatch_slots(0).validate(),
            Err(ConfigError::ZeroDispatchSlots)
        ));
        assert!(matches!(
            ProbeConfig::default().with_ring_capacity(0).validate(),
            Err(ConfigError::ZeroRingCapacity)
        ));
    }

    #[test]
    fn test_huge_capacities_rejected() {
        let config = ProbeConfig::default().with_counter_capacity(usize::MAX / 2);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CapacityTooLarge {
                field: "counter_capacity",
                max: MAX_CAPACITY,
                ..
            })
        ));

        let config = ProbeConfig::default().with_dispatch_slots(MAX_DISPATCH_SLOTS + 1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CapacityTooLarge { field: "dispatch_slots", .. })
        ));

        let config = ProbeConfig::default().with_ring_capacity(MAX_CAPACITY + 1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CapacityTooLarge { field: "ring_capacity", .. })
        ));

        let at_limit = ProbeConfig::default()
            .with_counter_capacity(MAX_CAPACITY)
            .with_ring_capacity(MAX_CAPACITY);
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_small_record_size_rejected() {
        let config = ProbeConfig {
            max_record_size: 8,
            ..ProbeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RecordSizeTooSmall {
                configured: 8,
                required: 36
            })
        ));
    }

    #[test]
    fn test_long_message_rejected() {
        let config = ProbeConfig::default().with_message(501, "Hi user 501, welcome!");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MessageTooLong { principal: 501, .. })
        ));
    }

    #[test]
    fn test_message_filling_whole_field_accepted() {
        let config = ProbeConfig::default()
            .with_message(0, "Hey root!")
            .with_message(501, "Hi user 501!");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_message_overrides() {
        let config = ProbeConfig::default()
            .with_message(0, "Hey root!")
            .with_message(501, "Hi user 501")
            .with_message(0, "Root again");

        assert_eq!(config.messages.len(), 2);
        assert_eq!(config.message_for(0), "Root again");
        assert_eq!(config.message_for(501), "Hi user 501");
        assert_eq!(config.message_for(7), "Hello World");
    }

    #[test]
    fn test_packet_preset() {
        let config = ProbeConfig::packet();
        assert_eq!(config.default_verdict, Verdict::Continue);
        assert!(config.behavior.count);
        assert!(!config.behavior.emit);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ProbeConfig::default()
            .with_overflow_policy(OverflowPolicy::OverwriteOldest)
            .with_message(0, "Hey root!");
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("overflow_policy = \"overwrite_oldest\""));
        assert_eq!(ProbeConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml_reports_parse_error() {
        let err = ProbeConfig::from_toml_str("ring_capacity = \"lots\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
