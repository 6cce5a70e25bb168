//! GATT attribute table and access dispatch
//!
//! The table is assembled once at startup and never changes. Each
//! characteristic maps to a small [`Handler`] variant; handler state lives
//! in the settings store and the lights, never in the table.
//!
//! ```text
//! Device Information (0x180A)
//!   0x2A29 Manufacturer       read
//!   0x2A27 Hardware Revision  read
//!   0x2A26 Firmware Revision  read
//!   0x2A00 Device Name        read
//! Light (0xA000)
//!   0xBEA0 Beacon             read/write, encrypted, 3 descriptors
//!   0xF037 Outdoor            read/write, encrypted, 3 descriptors
//!   0x1979 Capabilities       read/notify, 1 descriptor
//! Nordic UART (6E400001-...)
//!   RX                        write/write-no-rsp
//!   TX                        notify
//! Settings (0xA999)           empty
//! ```

use std::ops::BitOr;

use lighthouse_proto::ble::{self, descriptors};
use lighthouse_proto::{Uuid, PRESENTATION_BOOL, VALID_RANGE_BOOL};
use log::*;
use thiserror::Error;

use crate::capability::CapabilityDocument;
use crate::device::{DeviceInfo, Field};
use crate::error::AttError;
use crate::light::{LightKind, Lights};
use crate::settings::Settings;
use crate::storage::FileStore;
use crate::uart;

/// Access rights of a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Access(u8);

impl Access {
    pub const READ: Access = Access(0x01);
    pub const WRITE: Access = Access(0x02);
    pub const WRITE_NO_RSP: Access = Access(0x04);
    pub const NOTIFY: Access = Access(0x08);
    pub const READ_ENC: Access = Access(0x10);
    pub const WRITE_ENC: Access = Access(0x20);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Access) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Access) -> Access {
        Access(self.0 | other.0)
    }
}

impl BitOr for Access {
    type Output = Access;

    fn bitor(self, rhs: Access) -> Access {
        self.union(rhs)
    }
}

/// Attribute operation requested by a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOp {
    ReadChr,
    WriteChr,
    ReadDsc,
    WriteDsc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("response buffer full")]
pub struct BufferFull;

/// Outgoing payload of a read, bounded like the stack's buffer chain
#[derive(Debug, Clone)]
pub struct ResponseBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl ResponseBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            capacity,
        }
    }

    /// Append all of `bytes`, or nothing if they do not fit
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), BufferFull> {
        if bytes.len() > self.remaining() {
            return Err(BufferFull);
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// What a characteristic access is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Identity(Field),
    Light(LightKind),
    Capabilities,
    UartRx,
    UartTx,
}

/// A static, read-only descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub uuid: Uuid,
    pub value: &'static [u8],
}

impl Descriptor {
    pub const fn new(uuid: Uuid, value: &'static [u8]) -> Self {
        Self { uuid, value }
    }

    pub fn access(&self, op: AccessOp, out: &mut ResponseBuffer) -> Result<(), AttError> {
        if op != AccessOp::ReadDsc {
            return Err(AttError::ReadNotPermitted);
        }
        out.append(self.value).map_err(|_| AttError::InsufficientResources)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub access: Access,
    pub handler: Handler,
    pub descriptors: Vec<Descriptor>,
}

impl Characteristic {
    pub fn new(uuid: Uuid, access: Access, handler: Handler) -> Self {
        Self {
            uuid,
            access,
            handler,
            descriptors: Vec::new(),
        }
    }

    pub fn with_descriptor(mut self, uuid: Uuid, value: &'static [u8]) -> Self {
        self.descriptors.push(Descriptor::new(uuid, value));
        self
    }

    /// Name, boolean presentation format and 0..1 valid range
    fn with_bool_descriptors(self, name: &'static str) -> Self {
        self.with_descriptor(descriptors::USER_DESCRIPTION, name.as_bytes())
            .with_descriptor(descriptors::PRESENTATION_FORMAT, &PRESENTATION_BOOL)
            .with_descriptor(descriptors::VALID_RANGE, &VALID_RANGE_BOOL)
    }

    pub fn descriptor(&self, uuid: Uuid) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.uuid == uuid)
    }

    pub fn is_readable(&self) -> bool {
        self.access.contains(Access::READ)
    }

    pub fn is_writable(&self) -> bool {
        self.access.contains(Access::WRITE) || self.access.contains(Access::WRITE_NO_RSP)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub uuid: Uuid,
    pub characteristics: Vec<Characteristic>,
}

/// Everything a handler may touch during one access
pub struct AccessContext<'a> {
    /// Whether the link the access arrived on is encrypted
    pub encrypted: bool,
    pub settings: &'a Settings,
    pub lights: &'a mut Lights,
    pub files: &'a mut dyn FileStore,
    pub info: &'a DeviceInfo,
    pub capabilities: &'a CapabilityDocument,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeTable {
    services: Vec<Service>,
}

impl AttributeTable {
    pub fn assemble() -> Self {
        let rw_enc = Access::READ | Access::WRITE | Access::READ_ENC | Access::WRITE_ENC;

        let device = Service {
            uuid: ble::DEVICE_SERVICE_UUID,
            characteristics: vec![
                Characteristic::new(ble::MANUFACTURER_UUID, Access::READ, Handler::Identity(Field::Manufacturer)),
                Characteristic::new(
                    ble::HARDWARE_REVISION_UUID,
                    Access::READ,
                    Handler::Identity(Field::HardwareRevision),
                ),
                Characteristic::new(
                    ble::FIRMWARE_REVISION_UUID,
                    Access::READ,
                    Handler::Identity(Field::FirmwareRevision),
                ),
                Characteristic::new(ble::DEVICE_NAME_UUID, Access::READ, Handler::Identity(Field::DeviceName)),
            ],
        };

        let light = Service {
            uuid: ble::LIGHT_SERVICE_UUID,
            characteristics: vec![
                Characteristic::new(ble::BEACON_UUID, rw_enc, Handler::Light(LightKind::Beacon))
                    .with_bool_descriptors("Beacon"),
                Characteristic::new(ble::OUTDOOR_UUID, rw_enc, Handler::Light(LightKind::Outdoor))
                    .with_bool_descriptors("Outdoor light"),
                Characteristic::new(ble::CAPABILITY_UUID, Access::READ | Access::NOTIFY, Handler::Capabilities)
                    .with_descriptor(descriptors::USER_DESCRIPTION, b"Capabilities of the device"),
            ],
        };

        let uart = Service {
            uuid: ble::UART_SERVICE_UUID,
            characteristics: vec![
                Characteristic::new(ble::UART_RX_UUID, Access::WRITE | Access::WRITE_NO_RSP, Handler::UartRx),
                Characteristic::new(ble::UART_TX_UUID, Access::NOTIFY, Handler::UartTx),
            ],
        };

        let settings = Service {
            uuid: ble::SETTINGS_SERVICE_UUID,
            characteristics: Vec::new(),
        };

        Self {
            services: vec![device, light, uart, settings],
        }
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.uuid == uuid)
    }

    /// Route one attribute access. `dsc` names a descriptor of `chr`, or
    /// `None` for the characteristic value itself.
    pub fn dispatch(
        &self,
        chr: Uuid,
        dsc: Option<Uuid>,
        op: AccessOp,
        payload: &[u8],
        out: &mut ResponseBuffer,
        ctx: &mut AccessContext<'_>,
    ) -> Result<(), AttError> {
        let Some(characteristic) = self.characteristic(chr) else {
            warn!("Access to unknown characteristic {}", chr);
            return Err(AttError::Unlikely);
        };

        if let Some(dsc) = dsc {
            let Some(descriptor) = characteristic.descriptor(dsc) else {
                warn!("Access to unknown descriptor {} of {}", dsc, chr);
                return Err(AttError::Unlikely);
            };
            return descriptor.access(op, out);
        }

        match op {
            AccessOp::ReadChr => {
                if !characteristic.is_readable() {
                    return Err(AttError::ReadNotPermitted);
                }
                if characteristic.access.contains(Access::READ_ENC) && !ctx.encrypted {
                    return Err(AttError::InsufficientEncryption);
                }
            }
            AccessOp::WriteChr => {
                if !characteristic.is_writable() {
                    return Err(AttError::WriteNotPermitted);
                }
                if characteristic.access.contains(Access::WRITE_ENC) && !ctx.encrypted {
                    return Err(AttError::InsufficientEncryption);
                }
            }
            AccessOp::ReadDsc | AccessOp::WriteDsc => {
                debug!("{:?} on {} without a descriptor", op, chr);
                return Err(AttError::Unlikely);
            }
        }

        let result = match characteristic.handler {
            Handler::Identity(field) => ctx.info.access(field, op, out, ctx.settings),
            Handler::Light(kind) => ctx.lights.get_mut(kind).access(op, payload, out, ctx.settings),
            Handler::Capabilities => match op {
                AccessOp::ReadChr => ctx.capabilities.read_into(ctx.files, out),
                _ => Err(AttError::WriteNotPermitted),
            },
            Handler::UartRx => uart::on_rx(op, payload),
            Handler::UartTx => Err(AttError::Unlikely),
        };

        if let Err(e) = result {
            debug!("{:?} on {} rejected: {}", op, chr, e);
        }
        result
    }
}
