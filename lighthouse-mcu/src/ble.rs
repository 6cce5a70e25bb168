//! BLE stack types and traits
//!
//! The radio stack (connection establishment, encryption, advertising
//! framing) is external. It delivers [`GapEvent`]s to the core and the core
//! drives it through [`RadioStack`].

use lighthouse_proto::Uuid;

use crate::error::RadioError;

/// Opaque connection handle assigned by the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnHandle(pub u16);

impl std::fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity address of a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub kind: u8,
    pub val: [u8; 6],
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let a = &self.val;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )
    }
}

/// Snapshot of a connection as the stack sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnDesc {
    pub handle: ConnHandle,
    pub peer: PeerAddress,
    pub interval: u16,
    pub latency: u16,
    pub supervision_timeout: u16,
    pub encrypted: bool,
    pub authenticated: bool,
    pub bonded: bool,
}

/// Requested connection parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnParams {
    pub interval_min: u16,
    pub interval_max: u16,
    pub latency: u16,
    pub supervision_timeout: u16,
}

/// Advertising payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingData {
    pub flags: u8,
    /// 16-bit service UUIDs
    pub services: Vec<u16>,
    pub services_complete: bool,
    pub manufacturer_data: Vec<u8>,
}

/// Scan response payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResponse {
    pub name: String,
    /// Let the controller fill in the TX power level
    pub tx_power_auto: bool,
}

/// Events delivered by the stack's event-processing context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapEvent {
    /// Host and controller are in sync; our identity address is known
    Sync { address: [u8; 6] },
    /// Host stack was reset
    Reset { reason: i32 },
    /// Connection established (`status == 0`) or attempt failed
    Connect { conn: ConnHandle, status: i32 },
    Disconnect { conn: ConnHandle, reason: i32 },
    /// Advertising period ended
    AdvComplete,
    /// Security manager needs a passkey action for `conn`
    PasskeyAction { conn: ConnHandle, action: u8 },
    /// Encryption state changed, `status == 0` on success
    EncChange { conn: ConnHandle, status: i32 },
    /// Peer tries to pair although a bond already exists
    RepeatPairing { conn: ConnHandle },
}

/// What the stack should do after an event was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapReply {
    Done,
    /// Old bond was removed, pairing should start over
    RetryPairing,
}

/// Trait for BLE stack implementations
///
/// MCU-specific crates implement this trait using their BLE stack.
#[cfg_attr(test, mockall::automock)]
pub trait RadioStack {
    /// Look up an active connection
    fn conn_desc(&self, conn: ConnHandle) -> Option<ConnDesc>;

    fn update_conn_params(&mut self, conn: ConnHandle, params: &ConnParams) -> Result<(), RadioError>;

    fn set_advertising_data(&mut self, data: &AdvertisingData) -> Result<(), RadioError>;

    fn set_scan_response(&mut self, rsp: &ScanResponse) -> Result<(), RadioError>;

    /// Start undirected connectable, general discoverable advertising
    fn start_advertising(&mut self) -> Result<(), RadioError>;

    /// Terminate a connection with HCI `reason`
    fn terminate(&mut self, conn: ConnHandle, reason: u8) -> Result<(), RadioError>;

    /// Remove every stored bond for `peer`
    fn delete_bond(&mut self, peer: &PeerAddress) -> Result<(), RadioError>;

    /// Hand the passkey to the security manager for display
    fn inject_passkey(&mut self, conn: ConnHandle, passkey: u32) -> Result<(), RadioError>;

    /// Send a notification for characteristic `chr`
    fn notify(&mut self, conn: ConnHandle, chr: Uuid, data: &[u8]) -> Result<(), RadioError>;

    /// Negotiated ATT MTU, 0 if unknown
    fn att_mtu(&self, conn: ConnHandle) -> u16;
}
