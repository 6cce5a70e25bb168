//! Pairing and link security
//!
//! Per-connection state: `Unauthenticated -> Pairing -> Encrypted`, or back
//! to `Unauthenticated` with the bond removed when encryption fails. Every
//! reaction runs synchronously inside the stack callback and nothing is
//! retried here; once a bond is cleared, retrying is up to the stack.

use std::collections::BTreeMap;

use lighthouse_proto::att::REASON_REMOTE_USER_TERMINATED;
use lighthouse_proto::ble::passkey;
use log::*;

use crate::ble::{ConnHandle, GapReply, RadioStack};
use crate::error::RadioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityState {
    #[default]
    Unauthenticated,
    /// Passkey handed to the stack for display
    Pairing,
    Encrypted,
}

pub struct SecurityManager {
    passkey: u32,
    states: BTreeMap<ConnHandle, SecurityState>,
}

impl SecurityManager {
    /// `passkey` is fixed configuration, never derived or persisted
    pub fn new(passkey: u32) -> Self {
        Self {
            passkey,
            states: BTreeMap::new(),
        }
    }

    pub fn state(&self, conn: ConnHandle) -> SecurityState {
        self.states.get(&conn).copied().unwrap_or_default()
    }

    pub fn is_encrypted(&self, conn: ConnHandle) -> bool {
        self.state(conn) == SecurityState::Encrypted
    }

    pub fn on_connect(&mut self, conn: ConnHandle) {
        self.states.insert(conn, SecurityState::Unauthenticated);
    }

    /// Drop all state for a closed connection
    pub fn forget(&mut self, conn: ConnHandle) {
        self.states.remove(&conn);
    }

    pub fn on_passkey_action<R: RadioStack + ?Sized>(
        &mut self,
        radio: &mut R,
        conn: ConnHandle,
        action: u8,
    ) -> Result<(), RadioError> {
        if action != passkey::DISPLAY {
            // only display-only IO capability is configured
            debug!("Ignoring passkey action {} on connection {}", action, conn);
            return Ok(());
        }

        info!("Displaying passkey {:06} for connection {}", self.passkey, conn);
        self.states.insert(conn, SecurityState::Pairing);
        radio.inject_passkey(conn, self.passkey).inspect_err(|e| {
            error!("Failed to inject passkey for connection {}: {}", conn, e);
        })
    }

    pub fn on_enc_change<R: RadioStack + ?Sized>(
        &mut self,
        radio: &mut R,
        conn: ConnHandle,
        status: i32,
    ) -> Result<(), RadioError> {
        if status == 0 {
            info!("Connection {} encrypted", conn);
            self.states.insert(conn, SecurityState::Encrypted);
            return Ok(());
        }

        warn!("Encryption failed on connection {} (status={})", conn, status);
        self.states.insert(conn, SecurityState::Unauthenticated);

        match radio.conn_desc(conn) {
            Some(desc) => {
                info!("Deleting bond for {}", desc.peer);
                if let Err(e) = radio.delete_bond(&desc.peer) {
                    error!("Failed to delete bond for {}: {}", desc.peer, e);
                }
            }
            None => warn!("No descriptor for connection {}, bond kept", conn),
        }

        radio.terminate(conn, REASON_REMOTE_USER_TERMINATED)
    }

    /// A bonded peer wants to pair again: forget the old bond and let the
    /// stack start over.
    pub fn on_repeat_pairing<R: RadioStack + ?Sized>(&mut self, radio: &mut R, conn: ConnHandle) -> GapReply {
        match radio.conn_desc(conn) {
            Some(desc) => {
                info!("Repeat pairing from {}, deleting old bond", desc.peer);
                if let Err(e) = radio.delete_bond(&desc.peer) {
                    error!("Failed to delete bond for {}: {}", desc.peer, e);
                }
            }
            None => warn!("Repeat pairing on unknown connection {}", conn),
        }
        self.states.insert(conn, SecurityState::Unauthenticated);
        GapReply::RetryPairing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::{ConnDesc, MockRadioStack, PeerAddress};
    use mockall::predicate::*;

    const CONN: ConnHandle = ConnHandle(7);
    const PEER: PeerAddress = PeerAddress {
        kind: 1,
        val: [1, 2, 3, 4, 5, 6],
    };

    fn desc() -> ConnDesc {
        ConnDesc {
            handle: CONN,
            peer: PEER,
            interval: 24,
            latency: 0,
            supervision_timeout: 400,
            encrypted: false,
            authenticated: false,
            bonded: true,
        }
    }

    #[test]
    fn display_action_injects_configured_passkey() {
        let mut radio = MockRadioStack::new();
        radio
            .expect_inject_passkey()
            .with(eq(CONN), eq(123456))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut security = SecurityManager::new(123456);
        security.on_passkey_action(&mut radio, CONN, passkey::DISPLAY).unwrap();
        assert_eq!(security.state(CONN), SecurityState::Pairing);
    }

    #[test]
    fn other_passkey_actions_are_ignored() {
        let mut radio = MockRadioStack::new();
        radio.expect_inject_passkey().never();

        let mut security = SecurityManager::new(1);
        security.on_passkey_action(&mut radio, CONN, passkey::NUMERIC_COMPARISON).unwrap();
        assert_eq!(security.state(CONN), SecurityState::Unauthenticated);
    }

    #[test]
    fn successful_encryption_touches_nothing() {
        let mut radio = MockRadioStack::new();
        radio.expect_delete_bond().never();
        radio.expect_terminate().never();

        let mut security = SecurityManager::new(1);
        security.on_enc_change(&mut radio, CONN, 0).unwrap();
        assert!(security.is_encrypted(CONN));
    }

    #[test]
    fn failed_encryption_removes_bond_and_terminates() {
        let mut radio = MockRadioStack::new();
        let mut seq = mockall::Sequence::new();
        radio.expect_conn_desc().with(eq(CONN)).returning(|_| Some(desc()));
        radio
            .expect_delete_bond()
            .with(eq(PEER))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        radio
            .expect_terminate()
            .with(eq(CONN), eq(0x13))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let mut security = SecurityManager::new(1);
        security.set_state(CONN, SecurityState::Pairing);
        security.on_enc_change(&mut radio, CONN, 5).unwrap();
        assert_eq!(security.state(CONN), SecurityState::Unauthenticated);
    }

    #[test]
    fn failed_encryption_then_repeat_pairing_starts_over() {
        let mut radio = MockRadioStack::new();
        radio.expect_conn_desc().returning(|_| Some(desc()));
        radio.expect_delete_bond().times(2).returning(|_| Ok(()));
        radio.expect_terminate().times(1).returning(|_, _| Ok(()));

        let mut security = SecurityManager::new(1);
        security.on_enc_change(&mut radio, CONN, 13).unwrap();
        assert_eq!(security.on_repeat_pairing(&mut radio, CONN), GapReply::RetryPairing);
    }

    #[test]
    fn terminate_failure_is_returned() {
        let mut radio = MockRadioStack::new();
        radio.expect_conn_desc().returning(|_| None);
        radio.expect_delete_bond().never();
        radio
            .expect_terminate()
            .returning(|_, _| Err(RadioError::new("terminate", 2)));

        let mut security = SecurityManager::new(1);
        assert_eq!(
            security.on_enc_change(&mut radio, CONN, 5),
            Err(RadioError::new("terminate", 2))
        );
    }

    #[test]
    fn forget_resets_state() {
        let mut security = SecurityManager::new(1);
        security.set_state(CONN, SecurityState::Encrypted);
        security.forget(CONN);
        assert_eq!(security.state(CONN), SecurityState::Unauthenticated);
    }

    impl SecurityManager {
        fn set_state(&mut self, conn: ConnHandle, state: SecurityState) {
            self.states.insert(conn, state);
        }
    }
}
