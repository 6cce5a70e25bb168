//! Remote control core
//!
//! Owns everything the BLE stack's event context touches: the session
//! registry, security state, advertiser, attribute table and the lights.
//! The stack delivers events and attribute accesses here one at a time, so
//! none of these need their own locks. Only [`Settings`] is shared with
//! other contexts and carries its own mutex.

use std::sync::Arc;

use lighthouse_proto::keys;
use lighthouse_proto::Uuid;
use log::*;

use crate::advertising::Advertiser;
use crate::ble::{ConnDesc, ConnHandle, ConnParams, GapEvent, GapReply, RadioStack};
use crate::capability::CapabilityDocument;
use crate::config::Config;
use crate::device::DeviceInfo;
use crate::error::{AttError, RadioError, SettingsError};
use crate::gatt::{AccessContext, AccessOp, AttributeTable, ResponseBuffer};
use crate::light::Lights;
use crate::security::SecurityManager;
use crate::session::{ConnectOutcome, SessionRegistry};
use crate::settings::Settings;
use crate::storage::{FileStore, Value, ValueKind};
use crate::uart;

/// Slave latency requested right after a connection is established
pub const PREFERRED_LATENCY: u16 = 3;

pub struct RemoteControl<R> {
    radio: R,
    product_name: String,
    sessions: SessionRegistry,
    security: SecurityManager,
    advertiser: Advertiser,
    table: AttributeTable,
    settings: Arc<Settings>,
    lights: Lights,
    files: Box<dyn FileStore>,
    info: DeviceInfo,
    capabilities: CapabilityDocument,
}

impl<R: RadioStack> RemoteControl<R> {
    pub fn new(
        config: &Config,
        radio: R,
        settings: Arc<Settings>,
        lights: Lights,
        files: Box<dyn FileStore>,
    ) -> Self {
        Self {
            radio,
            product_name: config.product_name.clone(),
            sessions: SessionRegistry::new(config.max_connections),
            security: SecurityManager::new(config.passkey),
            advertiser: Advertiser::new(&config.product_name),
            table: AttributeTable::assemble(),
            settings,
            lights,
            files,
            info: DeviceInfo::from_config(config),
            capabilities: CapabilityDocument::from_config(&config.capabilities),
        }
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn security(&self) -> &SecurityManager {
        &self.security
    }

    pub fn lights(&self) -> &Lights {
        &self.lights
    }

    pub fn table(&self) -> &AttributeTable {
        &self.table
    }

    pub fn device_name(&self) -> &str {
        self.advertiser.name()
    }

    pub fn handle_event(&mut self, event: GapEvent) -> Result<GapReply, RadioError> {
        match event {
            GapEvent::Sync { address } => {
                let name = self.advertiser.resolve_name(&self.product_name, &address).to_string();
                if let Err(e) = self.settings.save(keys::DEVICE_NAME, &Value::Str(name)) {
                    error!("Failed to persist device name: {}", e);
                }
                self.advertise()?;
            }

            GapEvent::Reset { reason } => {
                info!("BLE stack reset, reason: {}", reason);
            }

            GapEvent::Connect { conn, status } => {
                info!(
                    "Connection {}; status={}",
                    if status == 0 { "established" } else { "failed" },
                    status
                );
                if status != 0 {
                    self.sessions.on_connect(conn, false);
                    self.advertise()?;
                    return Ok(GapReply::Done);
                }

                if let ConnectOutcome::CapacityExceeded = self.sessions.on_connect(conn, true) {
                    warn!("Connection {} accepted but not tracked", conn);
                }
                self.security.on_connect(conn);
                self.update_params(conn)?;
            }

            GapEvent::Disconnect { conn, reason } => {
                info!("Disconnected {}; reason={}", conn, reason);
                self.sessions.on_disconnect(conn);
                self.security.forget(conn);
                self.advertise()?;
            }

            GapEvent::AdvComplete => {
                info!("Advertising complete");
                self.advertise()?;
            }

            GapEvent::PasskeyAction { conn, action } => {
                info!("Passkey action required: {}", action);
                self.security.on_passkey_action(&mut self.radio, conn, action)?;
            }

            GapEvent::EncChange { conn, status } => {
                info!("Encryption change on {}; status={}", conn, status);
                self.security.on_enc_change(&mut self.radio, conn, status)?;
            }

            GapEvent::RepeatPairing { conn } => {
                return Ok(self.security.on_repeat_pairing(&mut self.radio, conn));
            }
        }
        Ok(GapReply::Done)
    }

    /// Route an attribute access arriving on `conn`
    pub fn access(
        &mut self,
        conn: ConnHandle,
        chr: Uuid,
        dsc: Option<Uuid>,
        op: AccessOp,
        payload: &[u8],
        out: &mut ResponseBuffer,
    ) -> Result<(), AttError> {
        let encrypted = self.security.is_encrypted(conn)
            || self.radio.conn_desc(conn).is_some_and(|d| d.encrypted);

        let mut ctx = AccessContext {
            encrypted,
            settings: &self.settings,
            lights: &mut self.lights,
            files: self.files.as_mut(),
            info: &self.info,
            capabilities: &self.capabilities,
        };
        self.table.dispatch(chr, dsc, op, payload, out, &mut ctx)
    }

    /// Push the capability document to `conn`
    pub fn notify_capabilities(&mut self, conn: ConnHandle) -> usize {
        self.capabilities.notify(self.files.as_mut(), &mut self.radio, conn)
    }

    /// Send text on the UART TX characteristic to every tracked session
    pub fn send_uart(&mut self, text: &str) -> usize {
        uart::send(&mut self.radio, &self.sessions, text)
    }

    pub fn advertise(&mut self) -> Result<(), RadioError> {
        self.advertiser.start(&mut self.radio)
    }

    fn update_params(&mut self, conn: ConnHandle) -> Result<(), RadioError> {
        let Some(desc) = self.radio.conn_desc(conn) else {
            warn!("No descriptor for connection {}", conn);
            return Ok(());
        };
        log_conn_desc(&desc);

        let params = ConnParams {
            interval_min: desc.interval,
            interval_max: desc.interval,
            latency: PREFERRED_LATENCY,
            supervision_timeout: desc.supervision_timeout,
        };
        self.radio.update_conn_params(conn, &params).inspect_err(|e| {
            error!("Failed to update connection parameters: {}", e);
        })
    }
}

fn log_conn_desc(desc: &ConnDesc) {
    info!(
        "Connection {}: peer={} (type {}), interval={}, latency={}, supervision_timeout={}, \
         encrypted={}, authenticated={}, bonded={}",
        desc.handle,
        desc.peer,
        desc.peer.kind,
        desc.interval,
        desc.latency,
        desc.supervision_timeout,
        desc.encrypted,
        desc.authenticated,
        desc.bonded
    );
}

/// Increment the persisted boot counter, returning the new value
pub fn bump_boot_count(settings: &Settings) -> Result<i32, SettingsError> {
    let count = match settings.load(ValueKind::I32, keys::BOOT_COUNT) {
        Ok(Value::I32(n)) => n,
        Ok(_) | Err(SettingsError::NotFound(_)) => 0,
        Err(e) => return Err(e),
    };
    let next = count.wrapping_add(1);
    settings.save(keys::BOOT_COUNT, &Value::I32(next))?;
    info!("Boot #{}", next);
    Ok(next)
}
