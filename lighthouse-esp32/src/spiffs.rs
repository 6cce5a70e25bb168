//! Capability document storage on the SPIFFS partition

use std::fs::File;
use std::io;

use esp_idf_svc::sys;
use lighthouse_mcu::storage::{FileStore, ReadSeek};
use log::*;

const BASE_PATH: &std::ffi::CStr = c"/storage";
const PARTITION_LABEL: &std::ffi::CStr = c"storage";

#[derive(Default)]
pub struct Spiffs {
    mounted: bool,
}

impl Spiffs {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileStore for Spiffs {
    fn mount(&mut self) -> io::Result<()> {
        if self.mounted {
            return Ok(());
        }
        let conf = sys::esp_vfs_spiffs_conf_t {
            base_path: BASE_PATH.as_ptr(),
            partition_label: PARTITION_LABEL.as_ptr(),
            max_files: 5,
            format_if_mount_failed: false,
        };
        sys::esp!(unsafe { sys::esp_vfs_spiffs_register(&conf) })
            .map_err(|e| io::Error::other(format!("spiffs mount: {}", e)))?;

        let (mut total, mut used) = (0usize, 0usize);
        if unsafe { sys::esp_spiffs_info(PARTITION_LABEL.as_ptr(), &mut total, &mut used) } == sys::ESP_OK {
            debug!("SPIFFS mounted: {} of {} bytes used", used, total);
        }
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        if let Err(e) = sys::esp!(unsafe { sys::esp_vfs_spiffs_unregister(PARTITION_LABEL.as_ptr()) }) {
            warn!("Failed to unmount SPIFFS: {}", e);
        }
        self.mounted = false;
    }

    fn open(&mut self, path: &str) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(File::open(path)?))
    }
}
