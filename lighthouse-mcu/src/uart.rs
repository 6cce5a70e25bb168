//! Nordic UART compatible bridge
//!
//! RX carries text from the peer, which is only logged. TX is notify-only
//! and carries text to every tracked session.

use lighthouse_proto::ble;
use log::*;

use crate::ble::RadioStack;
use crate::error::AttError;
use crate::gatt::AccessOp;
use crate::session::SessionRegistry;

/// RX characteristic access
pub fn on_rx(op: AccessOp, payload: &[u8]) -> Result<(), AttError> {
    match op {
        AccessOp::WriteChr => {
            info!("Received data: {}", String::from_utf8_lossy(payload));
            Ok(())
        }
        _ => Err(AttError::Unlikely),
    }
}

/// Send `text` on TX to every tracked session. Returns how many sessions
/// it reached; nothing is sent while nobody is connected.
pub fn send<R: RadioStack + ?Sized>(radio: &mut R, sessions: &SessionRegistry, text: &str) -> usize {
    if !sessions.is_any_connected() {
        return 0;
    }

    let mut reached = 0;
    for conn in sessions.handles() {
        match radio.notify(conn, ble::UART_TX_UUID, text.as_bytes()) {
            Ok(()) => {
                debug!("Sent data to {}: {}", conn, text);
                reached += 1;
            }
            Err(e) => error!("Error sending data to {}: {}", conn, e),
        }
    }
    reached
}
