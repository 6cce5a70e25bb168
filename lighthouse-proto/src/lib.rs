//! Lighthouse protocol constants
//!
//! Everything a peer can observe on the air lives here: attribute UUIDs,
//! ATT status codes, descriptor payloads and advertising payload constants.
//! Both the device logic (`lighthouse-mcu`) and the firmware use these, so
//! the two can never disagree about what is on the wire.

pub mod att;
pub mod ble;
pub mod keys;

/// A GATT attribute identifier.
///
/// SIG-assigned attributes use the 16-bit short form; vendor services
/// (the UART bridge) use the full 128-bit form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uuid {
    Short(u16),
    Long(u128),
}

impl Uuid {
    pub const fn short(value: u16) -> Self {
        Uuid::Short(value)
    }

    pub const fn long(value: u128) -> Self {
        Uuid::Long(value)
    }

}

impl std::fmt::Display for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Uuid::Short(v) => write!(f, "0x{:04X}", v),
            Uuid::Long(v) => {
                let b = v.to_be_bytes();
                write!(
                    f,
                    "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                    b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
                )
            }
        }
    }
}

/// Presentation Format descriptor (0x2904) payload for a boolean value.
///
/// 7 bytes: format, exponent, unit (2), namespace, description (2).
pub const PRESENTATION_BOOL: [u8; 7] = [
    0x01,       // format = boolean
    0x00,       // exponent
    0x00, 0x00, // unit = none
    0x01,       // namespace = Bluetooth SIG
    0x00, 0x00, // description
];

/// Valid Range descriptor (0x2906) payload for a boolean: min 0, max 1
pub const VALID_RANGE_BOOL: [u8; 2] = [0x00, 0x01];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_uuid_display() {
        assert_eq!(Uuid::short(0xBEA0).to_string(), "0xBEA0");
    }

    #[test]
    fn long_uuid_display_matches_nordic_uart() {
        assert_eq!(
            ble::UART_SERVICE_UUID.to_string(),
            "6e400001-b5a3-f393-e0a9-e50e24dcca9e"
        );
    }
}
