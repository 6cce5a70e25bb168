//! ATT protocol status codes (Bluetooth Core, Vol 3, Part F, 3.4.1.1)

pub const READ_NOT_PERMITTED: u8 = 0x02;
pub const WRITE_NOT_PERMITTED: u8 = 0x03;
pub const INVALID_ATTR_VALUE_LEN: u8 = 0x0D;
pub const UNLIKELY: u8 = 0x0E;
pub const INSUFFICIENT_ENC: u8 = 0x0F;
pub const INSUFFICIENT_RES: u8 = 0x11;

/// Default ATT MTU before any exchange
pub const DEFAULT_MTU: u16 = 23;

/// Notification PDU overhead: 1 byte opcode + 2 bytes attribute handle
pub const NOTIFY_OVERHEAD: u16 = 3;

/// HCI reason: remote user terminated connection
pub const REASON_REMOTE_USER_TERMINATED: u8 = 0x13;
