//! GATT service layout and advertising constants for the Lighthouse
//!
//! The table itself is assembled in `lighthouse-mcu`; these are the
//! identifiers it is assembled from.

use crate::Uuid;

/// Device Information service
pub const DEVICE_SERVICE_UUID: Uuid = Uuid::short(0x180A);
pub const MANUFACTURER_UUID: Uuid = Uuid::short(0x2A29);
pub const HARDWARE_REVISION_UUID: Uuid = Uuid::short(0x2A27);
pub const FIRMWARE_REVISION_UUID: Uuid = Uuid::short(0x2A26);
pub const DEVICE_NAME_UUID: Uuid = Uuid::short(0x2A00);

/// Light service
pub const LIGHT_SERVICE_UUID: Uuid = Uuid::short(0xA000);
/// Beacon (blinking warning light) enable, bool, encrypted read/write
pub const BEACON_UUID: Uuid = Uuid::short(0xBEA0);
/// Outdoor lamp enable, bool, encrypted read/write
pub const OUTDOOR_UUID: Uuid = Uuid::short(0xF037);
/// Capability document, bulk read + notify
pub const CAPABILITY_UUID: Uuid = Uuid::short(0x1979);

/// Settings service (no characteristics yet)
pub const SETTINGS_SERVICE_UUID: Uuid = Uuid::short(0xA999);

/// Nordic UART compatible service: 6E400001-B5A3-F393-E0A9-E50E24DCCA9E
pub const UART_SERVICE_UUID: Uuid = Uuid::long(0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E);
/// RX: client writes to us
pub const UART_RX_UUID: Uuid = Uuid::long(0x6E400002_B5A3_F393_E0A9_E50E24DCCA9E);
/// TX: we notify the client
pub const UART_TX_UUID: Uuid = Uuid::long(0x6E400003_B5A3_F393_E0A9_E50E24DCCA9E);

/// Descriptor UUIDs
pub mod descriptors {
    use crate::Uuid;

    pub const USER_DESCRIPTION: Uuid = Uuid::short(0x2901);
    pub const PRESENTATION_FORMAT: Uuid = Uuid::short(0x2904);
    pub const VALID_RANGE: Uuid = Uuid::short(0x2906);
}

/// Advertising payload constants
pub mod adv {
    /// LE General Discoverable, BR/EDR not supported
    pub const FLAGS: u8 = 0x02 | 0x04;

    /// Vendor-specific data tag carried in every advertisement
    pub const MANUFACTURER_DATA: [u8; 6] = [0xDE, 0xC0, 0x05, 0x10, 0x20, 0x25];

    /// Services listed (complete list of 16-bit UUIDs)
    pub const SERVICES: [u16; 3] = [0x180A, 0xA000, 0xA999];
}

/// Security-manager passkey actions raised by the stack
pub mod passkey {
    pub const DISPLAY: u8 = 3;
    pub const NUMERIC_COMPARISON: u8 = 4;
}
