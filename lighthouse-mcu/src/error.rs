//! Error types for the Lighthouse device logic
//!
//! One closed enum per subsystem. [`AttError`] is the only one that ever
//! reaches a peer, and [`AttError::code`] is the only place it becomes an
//! ATT status byte.

use lighthouse_proto::att;
use thiserror::Error;

use crate::storage::ValueKind;

/// Protocol status returned to a peer for a failed attribute access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AttError {
    /// Payload length does not match the attribute's contract
    #[error("invalid attribute value length")]
    InvalidLength,

    /// Payload decoded, but the value is outside the valid range
    #[error("attribute value out of range")]
    InvalidValue,

    /// Read (or descriptor read) against an attribute that does not allow it
    #[error("read not permitted")]
    ReadNotPermitted,

    /// Write against a read-only attribute
    #[error("write not permitted")]
    WriteNotPermitted,

    /// Attribute requires an encrypted link
    #[error("insufficient encryption")]
    InsufficientEncryption,

    /// Outgoing buffer could not grow
    #[error("insufficient resources")]
    InsufficientResources,

    /// Unexpected operation or internal failure
    #[error("unlikely error")]
    Unlikely,
}

impl AttError {
    /// ATT status byte sent on the wire
    pub fn code(self) -> u8 {
        match self {
            AttError::InvalidLength => att::INVALID_ATTR_VALUE_LEN,
            AttError::InvalidValue => att::UNLIKELY,
            AttError::ReadNotPermitted => att::READ_NOT_PERMITTED,
            AttError::WriteNotPermitted => att::WRITE_NOT_PERMITTED,
            AttError::InsufficientEncryption => att::INSUFFICIENT_ENC,
            AttError::InsufficientResources => att::INSUFFICIENT_RES,
            AttError::Unlikely => att::UNLIKELY,
        }
    }
}

/// Signals from the flash key-value backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlashError {
    /// Partition is full or was written by an incompatible layout
    #[error("flash partition has no free pages")]
    NoFreePages,

    /// Partition was written by a newer storage version
    #[error("flash partition contains a newer storage version")]
    NewVersionFound,

    /// Key exists with a different value type
    #[error("stored value type does not match")]
    TypeMismatch,

    /// Any other backend failure, with the backend's error code
    #[error("flash backend error {0}")]
    Code(i32),
}

impl FlashError {
    /// True if the only way forward is to erase the partition
    pub fn needs_erase(&self) -> bool {
        matches!(self, FlashError::NoFreePages | FlashError::NewVersionFound)
    }
}

/// Errors from the settings store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("settings store is not initialized")]
    NotInitialized,

    #[error("setting {0} not found")]
    NotFound(String),

    #[error("setting {key} is not stored as {expected:?}")]
    TypeMismatch { key: String, expected: ValueKind },

    #[error("value type {0:?} is not supported by the backing store")]
    Unsupported(ValueKind),

    #[error("settings lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Flash(#[from] FlashError),
}

/// Errors from start/stop effects (beacon, outdoor lamp)
#[derive(Debug, Error)]
pub enum SwitchError {
    /// The hardware resource was never created
    #[error("not initialized")]
    NotInitialized,

    #[error("alarm error: {0}")]
    Alarm(String),

    #[error("pixel strip error: {0}")]
    Strip(String),

    #[error("dimmer error: {0}")]
    Dimmer(String),

    #[error("failed to spawn task: {0}")]
    Task(#[from] std::io::Error),
}

/// A radio stack command failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("radio stack call `{op}` failed (rc={code})")]
pub struct RadioError {
    pub op: &'static str,
    pub code: i32,
}

impl RadioError {
    pub fn new(op: &'static str, code: i32) -> Self {
        Self { op, code }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn att_codes_match_wire_values() {
        assert_eq!(AttError::InvalidLength.code(), 0x0D);
        assert_eq!(AttError::ReadNotPermitted.code(), 0x02);
        assert_eq!(AttError::InsufficientResources.code(), 0x11);
        assert_eq!(AttError::InvalidValue.code(), AttError::Unlikely.code());
    }

    #[test]
    fn only_layout_signals_trigger_erase() {
        assert!(FlashError::NoFreePages.needs_erase());
        assert!(FlashError::NewVersionFound.needs_erase());
        assert!(!FlashError::TypeMismatch.needs_erase());
        assert!(!FlashError::Code(-1).needs_erase());
    }
}
