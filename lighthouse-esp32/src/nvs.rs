//! Settings backend on the default NVS partition

use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_svc::sys::{self, EspError};
use lighthouse_mcu::error::FlashError;
use lighthouse_mcu::storage::{Flash, Namespace, Value, ValueKind};
use log::*;

/// Longest string setting we read back
const MAX_STR_LEN: usize = 64;

fn flash_error(e: EspError) -> FlashError {
    match e.code() as u32 {
        sys::ESP_ERR_NVS_NO_FREE_PAGES => FlashError::NoFreePages,
        sys::ESP_ERR_NVS_NEW_VERSION_FOUND => FlashError::NewVersionFound,
        sys::ESP_ERR_NVS_TYPE_MISMATCH => FlashError::TypeMismatch,
        _ => FlashError::Code(e.code()),
    }
}

/// The default NVS partition
#[derive(Default)]
pub struct NvsFlash {
    partition: Option<EspDefaultNvsPartition>,
}

impl NvsFlash {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Flash for NvsFlash {
    type Namespace = NvsNamespace;

    fn init(&mut self) -> Result<(), FlashError> {
        sys::esp!(unsafe { sys::nvs_flash_init() }).map_err(flash_error)
    }

    fn erase(&mut self) -> Result<(), FlashError> {
        self.partition = None;
        sys::esp!(unsafe { sys::nvs_flash_erase() }).map_err(flash_error)
    }

    fn open(&mut self, namespace: &str) -> Result<NvsNamespace, FlashError> {
        let partition = match &self.partition {
            Some(p) => p.clone(),
            None => {
                let p = EspDefaultNvsPartition::take().map_err(flash_error)?;
                self.partition = Some(p.clone());
                p
            }
        };
        let nvs = EspNvs::new(partition, namespace, true).map_err(flash_error)?;
        Ok(NvsNamespace { nvs })
    }
}

pub struct NvsNamespace {
    nvs: EspNvs<NvsDefault>,
}

impl Namespace for NvsNamespace {
    fn get(&self, kind: ValueKind, key: &str) -> Result<Option<Value>, FlashError> {
        let value = match kind {
            ValueKind::I8 => self.nvs.get_i8(key).map_err(flash_error)?.map(Value::I8),
            ValueKind::I32 => self.nvs.get_i32(key).map_err(flash_error)?.map(Value::I32),
            ValueKind::Str => {
                let mut buf = [0u8; MAX_STR_LEN];
                self.nvs
                    .get_str(key, &mut buf)
                    .map_err(flash_error)?
                    .map(|s| Value::Str(s.to_string()))
            }
        };
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &Value) -> Result<(), FlashError> {
        match value {
            Value::I8(v) => self.nvs.set_i8(key, *v),
            Value::I32(v) => self.nvs.set_i32(key, *v),
            Value::Str(s) => self.nvs.set_str(key, s),
        }
        .inspect_err(|e| debug!("NVS write of {} failed: {}", key, e))
        .map_err(flash_error)
    }

    // EspNvs commits inside every set
    fn commit(&mut self) -> Result<(), FlashError> {
        Ok(())
    }
}
