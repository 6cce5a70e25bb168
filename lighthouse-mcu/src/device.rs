//! Device Information service

use lighthouse_proto::keys;
use log::*;

use crate::config::Config;
use crate::error::AttError;
use crate::gatt::{AccessOp, ResponseBuffer};
use crate::settings::Settings;
use crate::storage::{Value, ValueKind};

const UNDEFINED: &str = "undefined";

/// Identity strings exposed read-only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Manufacturer,
    HardwareRevision,
    FirmwareRevision,
    DeviceName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub hardware_revision: String,
    pub firmware_revision: String,
    pub product_name: String,
}

impl DeviceInfo {
    pub fn from_config(config: &Config) -> Self {
        Self {
            manufacturer: config.manufacturer.clone(),
            hardware_revision: config.hardware_revision.clone(),
            firmware_revision: env!("CARGO_PKG_VERSION").to_string(),
            product_name: config.product_name.clone(),
        }
    }

    /// Current value of `field`. The device name is the one persisted at
    /// stack sync, or the product name before the first sync.
    pub fn value(&self, field: Field, settings: &Settings) -> String {
        let value = match field {
            Field::Manufacturer => self.manufacturer.clone(),
            Field::HardwareRevision => self.hardware_revision.clone(),
            Field::FirmwareRevision => self.firmware_revision.clone(),
            Field::DeviceName => match settings.load(ValueKind::Str, keys::DEVICE_NAME) {
                Ok(Value::Str(name)) => name,
                _ => self.product_name.clone(),
            },
        };

        if value.is_empty() {
            UNDEFINED.to_string()
        } else {
            value
        }
    }

    pub fn access(
        &self,
        field: Field,
        op: AccessOp,
        out: &mut ResponseBuffer,
        settings: &Settings,
    ) -> Result<(), AttError> {
        if op != AccessOp::ReadChr {
            debug!("Rejected {:?} on {:?}", op, field);
            return Err(AttError::WriteNotPermitted);
        }
        out.append(self.value(field, settings).as_bytes())
            .map_err(|_| AttError::InsufficientResources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemFlash;

    fn settings() -> Settings {
        Settings::init(&mut MemFlash::default(), keys::NAMESPACE).unwrap()
    }

    #[test]
    fn firmware_revision_is_crate_version() {
        let info = DeviceInfo::from_config(&Config::default());
        assert_eq!(info.value(Field::FirmwareRevision, &settings()), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn empty_strings_read_as_undefined() {
        let mut config = Config::default();
        config.hardware_revision = String::new();
        let info = DeviceInfo::from_config(&config);
        assert_eq!(info.value(Field::HardwareRevision, &settings()), "undefined");
    }

    #[test]
    fn device_name_prefers_persisted_name() {
        let info = DeviceInfo::from_config(&Config::default());
        let settings = settings();
        assert_eq!(info.value(Field::DeviceName, &settings), "Lighthouse");

        settings
            .save(keys::DEVICE_NAME, &Value::Str("Lighthouse 1A2B".to_string()))
            .unwrap();
        assert_eq!(info.value(Field::DeviceName, &settings), "Lighthouse 1A2B");
    }

    #[test]
    fn writes_are_not_permitted() {
        let info = DeviceInfo::from_config(&Config::default());
        let mut out = ResponseBuffer::new(64);
        assert_eq!(
            info.access(Field::Manufacturer, AccessOp::WriteChr, &mut out, &settings()),
            Err(AttError::WriteNotPermitted)
        );
    }

    #[test]
    fn oversized_value_is_insufficient_resources() {
        let info = DeviceInfo::from_config(&Config::default());
        let mut out = ResponseBuffer::new(4);
        assert_eq!(
            info.access(Field::Manufacturer, AccessOp::ReadChr, &mut out, &settings()),
            Err(AttError::InsufficientResources)
        );
    }
}
