//! NimBLE binding
//!
//! [`NimbleRadio`] drives the stack for the event core. [`serve`] builds
//! the GATT server from the attribute table and forwards every stack
//! callback into the shared [`RemoteControl`].

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};

use esp32_nimble::enums::{AuthReq, SecurityIOCap};
use esp32_nimble::utilities::mutex::Mutex as NimbleMutex;
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{
    BLEAdvertising, BLECharacteristic, BLEDevice, BLEError, DescriptorProperties, NimbleProperties,
};
use esp_idf_svc::sys;
use lighthouse_mcu::ble::{
    AdvertisingData, ConnDesc, ConnHandle, ConnParams, GapEvent, PeerAddress, RadioStack, ScanResponse,
};
use lighthouse_mcu::gatt::{Access, AccessOp, Characteristic, ResponseBuffer};
use lighthouse_mcu::{Config, RadioError, RemoteControl};
use lighthouse_proto::{ble, Uuid};
use log::*;

/// Largest attribute value we hand back in one read
const MAX_READ: usize = 512;

pub type SharedRemote = Arc<Mutex<RemoteControl<NimbleRadio>>>;

fn nimble_uuid(uuid: Uuid) -> BleUuid {
    match uuid {
        Uuid::Short(v) => BleUuid::from_uuid16(v),
        Uuid::Long(v) => BleUuid::from_uuid128(v.to_le_bytes()),
    }
}

fn nimble_error(op: &'static str, e: BLEError) -> RadioError {
    RadioError::new(op, e.code() as i32)
}

fn check(op: &'static str, rc: i32) -> Result<(), RadioError> {
    if rc == 0 {
        Ok(())
    } else {
        Err(RadioError::new(op, rc))
    }
}

fn properties(access: Access) -> NimbleProperties {
    [
        (Access::READ, NimbleProperties::READ),
        (Access::WRITE, NimbleProperties::WRITE),
        (Access::WRITE_NO_RSP, NimbleProperties::WRITE_NO_RSP),
        (Access::NOTIFY, NimbleProperties::NOTIFY),
        (Access::READ_ENC, NimbleProperties::READ_ENC),
        (Access::WRITE_ENC, NimbleProperties::WRITE_ENC),
    ]
    .into_iter()
    .filter(|(a, _)| access.contains(*a))
    .fold(NimbleProperties::empty(), |acc, (_, p)| acc | p)
}

pub struct NimbleRadio {
    advertising: &'static NimbleMutex<BLEAdvertising>,
    characteristics: HashMap<Uuid, Arc<NimbleMutex<BLECharacteristic>>>,
}

impl NimbleRadio {
    pub fn new(advertising: &'static NimbleMutex<BLEAdvertising>) -> Self {
        Self {
            advertising,
            characteristics: HashMap::new(),
        }
    }

    fn register(&mut self, uuid: Uuid, chr: Arc<NimbleMutex<BLECharacteristic>>) {
        self.characteristics.insert(uuid, chr);
    }
}

impl RadioStack for NimbleRadio {
    fn conn_desc(&self, conn: ConnHandle) -> Option<ConnDesc> {
        // SAFETY: plain C struct, filled in by the stack
        let mut desc: sys::ble_gap_conn_desc = unsafe { std::mem::zeroed() };
        if unsafe { sys::ble_gap_conn_find(conn.0, &mut desc) } != 0 {
            return None;
        }
        Some(ConnDesc {
            handle: ConnHandle(desc.conn_handle),
            peer: PeerAddress {
                kind: desc.peer_id_addr.type_,
                val: desc.peer_id_addr.val,
            },
            interval: desc.conn_itvl,
            latency: desc.conn_latency,
            supervision_timeout: desc.supervision_timeout,
            encrypted: desc.sec_state.encrypted() != 0,
            authenticated: desc.sec_state.authenticated() != 0,
            bonded: desc.sec_state.bonded() != 0,
        })
    }

    fn update_conn_params(&mut self, conn: ConnHandle, params: &ConnParams) -> Result<(), RadioError> {
        let params = sys::ble_gap_upd_params {
            itvl_min: params.interval_min,
            itvl_max: params.interval_max,
            latency: params.latency,
            supervision_timeout: params.supervision_timeout,
            min_ce_len: 0,
            max_ce_len: 0,
        };
        check("update_conn_params", unsafe { sys::ble_gap_update_params(conn.0, &params) })
    }

    fn set_advertising_data(&mut self, data: &AdvertisingData) -> Result<(), RadioError> {
        let uuids: Vec<sys::ble_uuid16_t> = data
            .services
            .iter()
            .map(|&value| sys::ble_uuid16_t {
                u: sys::ble_uuid_t {
                    type_: sys::BLE_UUID_TYPE_16 as u8,
                },
                value,
            })
            .collect();

        // SAFETY: plain C struct; every pointer outlives the call, which copies
        let mut fields: sys::ble_hs_adv_fields = unsafe { std::mem::zeroed() };
        fields.flags = data.flags;
        fields.uuids16 = uuids.as_ptr();
        fields.num_uuids16 = uuids.len() as u8;
        fields.set_uuids16_is_complete(u32::from(data.services_complete));
        fields.mfg_data = data.manufacturer_data.as_ptr();
        fields.mfg_data_len = data.manufacturer_data.len() as u8;
        check("adv_set_fields", unsafe { sys::ble_gap_adv_set_fields(&fields) })
    }

    fn set_scan_response(&mut self, rsp: &ScanResponse) -> Result<(), RadioError> {
        // SAFETY: as above
        let mut fields: sys::ble_hs_adv_fields = unsafe { std::mem::zeroed() };
        fields.name = rsp.name.as_ptr();
        fields.name_len = rsp.name.len() as u8;
        fields.set_name_is_complete(1);
        if rsp.tx_power_auto {
            fields.set_tx_pwr_lvl_is_present(1);
            fields.tx_pwr_lvl = sys::BLE_HS_ADV_TX_PWR_LVL_AUTO as i8;
        }
        check("adv_rsp_set_fields", unsafe { sys::ble_gap_adv_rsp_set_fields(&fields) })
    }

    // Payloads are already in the controller; esp32-nimble only starts
    // advertising with its own GAP event handler.
    fn start_advertising(&mut self) -> Result<(), RadioError> {
        self.advertising
            .lock()
            .scan_response(true)
            .start()
            .map_err(|e| nimble_error("start_advertising", e))
    }

    fn terminate(&mut self, conn: ConnHandle, reason: u8) -> Result<(), RadioError> {
        check("terminate", unsafe { sys::ble_gap_terminate(conn.0, reason) })
    }

    fn delete_bond(&mut self, peer: &PeerAddress) -> Result<(), RadioError> {
        let addr = sys::ble_addr_t {
            type_: peer.kind,
            val: peer.val,
        };
        check("delete_bond", unsafe { sys::ble_store_util_delete_peer(&addr) })
    }

    fn inject_passkey(&mut self, conn: ConnHandle, passkey: u32) -> Result<(), RadioError> {
        let rc = unsafe {
            let mut io: sys::ble_sm_io = std::mem::zeroed();
            io.action = sys::BLE_SM_IOACT_DISP as u8;
            io.__bindgen_anon_1.passkey = passkey;
            sys::ble_sm_inject_io(conn.0, &mut io)
        };
        check("inject_passkey", rc)
    }

    fn notify(&mut self, conn: ConnHandle, chr: Uuid, data: &[u8]) -> Result<(), RadioError> {
        let Some(characteristic) = self.characteristics.get(&chr) else {
            return Err(RadioError::new("notify", sys::BLE_HS_ENOENT as i32));
        };
        characteristic
            .lock()
            .notify_with(data, conn.0)
            .map_err(|e| nimble_error("notify", e))
    }

    fn att_mtu(&self, conn: ConnHandle) -> u16 {
        unsafe { sys::ble_att_mtu(conn.0) }
    }
}

fn lock(remote: &SharedRemote) -> std::sync::MutexGuard<'_, RemoteControl<NimbleRadio>> {
    remote.lock().unwrap_or_else(PoisonError::into_inner)
}

fn dispatch(
    remote: &SharedRemote,
    conn: u16,
    chr: Uuid,
    dsc: Option<Uuid>,
    op: AccessOp,
    payload: &[u8],
) -> Result<Vec<u8>, u8> {
    let mut out = ResponseBuffer::new(MAX_READ);
    match lock(remote).access(ConnHandle(conn), chr, dsc, op, payload, &mut out) {
        Ok(()) => Ok(out.into_vec()),
        Err(e) => {
            debug!("Access to {} on {} rejected: {}", chr, conn, e);
            Err(e.code())
        }
    }
}

fn add_characteristic(
    service: &Arc<NimbleMutex<esp32_nimble::BLEService>>,
    def: &Characteristic,
    remote: &SharedRemote,
    subscriptions: &Sender<ConnHandle>,
) -> Arc<NimbleMutex<BLECharacteristic>> {
    let uuid = def.uuid;
    let chr = service
        .lock()
        .create_characteristic(nimble_uuid(uuid), properties(def.access));

    if def.is_readable() {
        let remote = remote.clone();
        chr.lock().on_read(move |value, desc| {
            // on_read cannot fail the request; a rejected read answers empty
            match dispatch(&remote, desc.conn_handle(), uuid, None, AccessOp::ReadChr, &[]) {
                Ok(data) => value.set_value(&data),
                Err(code) => {
                    warn!("Read of {} on {} rejected (att 0x{:02X})", uuid, desc.conn_handle(), code);
                    value.set_value(&[]);
                }
            }
        });
    }

    if def.is_writable() {
        let remote = remote.clone();
        chr.lock().on_write(move |args| {
            let conn = args.desc().conn_handle();
            let payload = args.recv_data().to_vec();
            if let Err(code) = dispatch(&remote, conn, uuid, None, AccessOp::WriteChr, &payload) {
                args.reject_with_error_code(code);
            }
        });
    }

    if uuid == ble::CAPABILITY_UUID {
        let subscriptions = subscriptions.clone();
        chr.lock().on_subscribe(move |_chr, desc, sub| {
            if !sub.is_empty() {
                let _ = subscriptions.send(ConnHandle(desc.conn_handle()));
            }
        });
    }

    // Descriptor values are static: read them once through the dispatcher
    for dsc in &def.descriptors {
        let mut out = ResponseBuffer::new(MAX_READ);
        if dsc.access(AccessOp::ReadDsc, &mut out).is_ok() {
            chr.lock()
                .create_descriptor(nimble_uuid(dsc.uuid), DescriptorProperties::READ)
                .lock()
                .set_value(out.as_slice());
        }
    }

    chr
}

/// Register every service of the attribute table, hook stack callbacks
/// into `remote` and start advertising. Capability subscriptions are
/// reported on `subscriptions`.
///
/// Only connect, disconnect and authentication-complete reach `remote`.
/// esp32-nimble answers the rest of the GAP events itself: it displays
/// the passkey set below on a passkey action, deletes the old bond and
/// retries on repeat pairing, and has no hook for advertising complete
/// or host reset. Advertising runs without a time limit, so it never
/// completes on its own.
pub fn serve(
    config: &Config,
    device: &'static mut BLEDevice,
    remote: &SharedRemote,
    subscriptions: Sender<ConnHandle>,
) -> anyhow::Result<()> {
    device
        .security()
        .set_auth(AuthReq::Bond | AuthReq::Mitm | AuthReq::Sc)
        .set_passkey(config.passkey)
        .set_io_cap(SecurityIOCap::DisplayOnly);

    let server = device.get_server();
    server.advertise_on_disconnect(false);

    let table = lock(remote).table().clone();
    for def in table.services() {
        let service = server.create_service(nimble_uuid(def.uuid));
        for chr in &def.characteristics {
            let handle = add_characteristic(&service, chr, remote, &subscriptions);
            lock(remote).radio_mut().register(chr.uuid, handle);
        }
    }

    let on_connect = remote.clone();
    server.on_connect(move |_server, desc| {
        let event = GapEvent::Connect {
            conn: ConnHandle(desc.conn_handle()),
            status: 0,
        };
        if let Err(e) = lock(&on_connect).handle_event(event) {
            error!("Connect handling failed: {}", e);
        }
    });

    let on_disconnect = remote.clone();
    server.on_disconnect(move |desc, reason| {
        let event = GapEvent::Disconnect {
            conn: ConnHandle(desc.conn_handle()),
            reason: reason.err().map_or(0, |e| e.code() as i32),
        };
        if let Err(e) = lock(&on_disconnect).handle_event(event) {
            error!("Disconnect handling failed: {}", e);
        }
    });

    let on_auth = remote.clone();
    server.on_authentication_complete(move |desc, result| {
        let event = GapEvent::EncChange {
            conn: ConnHandle(desc.conn_handle()),
            status: result.err().map_or(0, |e| e.code() as i32),
        };
        if let Err(e) = lock(&on_auth).handle_event(event) {
            error!("Encryption change handling failed: {}", e);
        }
    });

    let address = device
        .get_addr()
        .map_err(|e| anyhow::anyhow!("failed to read BLE address: {:?}", e))?
        .as_le_bytes();
    let name = {
        let mut remote = lock(remote);
        remote.handle_event(GapEvent::Sync { address })?;
        remote.device_name().to_string()
    };
    BLEDevice::set_device_name(&name).map_err(|e| anyhow::anyhow!("failed to set device name: {:?}", e))?;
    info!("BLE ready, advertising as '{}'", name);
    Ok(())
}
