//! Advertising payload assembly
//!
//! Advertising is (re)started at sync, after every disconnect, after a
//! failed connect and whenever an advertising period completes. It is never
//! stopped while sessions are open; the stack decides connectability.

use lighthouse_proto::ble::adv;
use log::*;

use crate::ble::{AdvertisingData, RadioStack, ScanResponse};
use crate::error::RadioError;

/// Name advertised in the scan response: `"<product> ABCD"`, where `ABCD`
/// are the last two bytes of the identity address in hex.
pub fn device_name(product: &str, address: &[u8; 6]) -> String {
    format!("{} {:02X}{:02X}", product, address[4], address[5])
}

pub struct Advertiser {
    name: String,
}

impl Advertiser {
    /// Until the stack syncs, the bare product name is advertised
    pub fn new(product: &str) -> Self {
        Self {
            name: product.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Derive the per-device name once the identity address is known
    pub fn resolve_name(&mut self, product: &str, address: &[u8; 6]) -> &str {
        self.name = device_name(product, address);
        info!("Device name set to {}", self.name);
        &self.name
    }

    pub fn advertising_data(&self) -> AdvertisingData {
        AdvertisingData {
            flags: adv::FLAGS,
            services: adv::SERVICES.to_vec(),
            services_complete: true,
            manufacturer_data: adv::MANUFACTURER_DATA.to_vec(),
        }
    }

    pub fn scan_response(&self) -> ScanResponse {
        ScanResponse {
            name: self.name.clone(),
            tx_power_auto: true,
        }
    }

    pub fn start<R: RadioStack + ?Sized>(&self, radio: &mut R) -> Result<(), RadioError> {
        radio.set_advertising_data(&self.advertising_data()).inspect_err(|e| {
            error!("Failed to set advertising data: {}", e);
        })?;
        radio.set_scan_response(&self.scan_response()).inspect_err(|e| {
            error!("Failed to set scan response data: {}", e);
        })?;
        radio.start_advertising().inspect_err(|e| {
            error!("Advertising failed to start: {}", e);
        })?;
        debug!("Advertising as {}", self.name);
        Ok(())
    }
}
