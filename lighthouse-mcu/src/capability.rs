//! Capability document
//!
//! A JSON file on the storage partition describing what this fixture can
//! do. It is served in bulk through the capability characteristic, or
//! pushed as a series of notifications.

use std::io::{self, Seek, SeekFrom};
use std::ops::ControlFlow;

use lighthouse_proto::{att, ble};
use log::*;

use crate::ble::{ConnHandle, RadioStack};
use crate::config::CapabilityConfig;
use crate::error::AttError;
use crate::gatt::ResponseBuffer;
use crate::storage::{FileStore, ReadSeek};

const ERR_STORAGE_INIT: &[u8] = b"Error: Storage init failed";
const ERR_READ: &[u8] = b"Error: Failed to read capability data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDocument {
    path: String,
    chunk: usize,
}

impl CapabilityDocument {
    pub fn new(path: impl Into<String>, chunk: usize) -> Self {
        Self {
            path: path.into(),
            chunk: chunk.max(1),
        }
    }

    pub fn from_config(config: &CapabilityConfig) -> Self {
        Self::new(config.path.clone(), config.chunk_size)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Stream the document into a read response.
    ///
    /// Always succeeds from the peer's point of view: a full buffer
    /// truncates, a failure before anything was appended yields an error
    /// text instead of an empty payload.
    pub fn read_into(&self, files: &mut dyn FileStore, out: &mut ResponseBuffer) -> Result<(), AttError> {
        if let Err(e) = files.mount() {
            error!("Failed to mount storage: {}", e);
            let _ = out.append(ERR_STORAGE_INIT);
            return Ok(());
        }

        info!("Reading capabilities from {}", self.path);
        let mut appended = 0;
        let result = self.open(files).and_then(|(mut file, size)| {
            for_each_chunk(&mut *file, size, self.chunk, |chunk| {
                if out.append(chunk).is_ok() {
                    appended += chunk.len();
                    return ControlFlow::Continue(());
                }
                let fit = out.remaining();
                if out.append(&chunk[..fit]).is_ok() {
                    appended += fit;
                }
                warn!("Response buffer full after {} bytes of {}", appended, size);
                ControlFlow::Break(())
            })
        });

        if let Err(e) = result {
            error!("Error reading {}: {}", self.path, e);
            if appended == 0 {
                let _ = out.append(ERR_READ);
            }
        } else {
            debug!("Appended {} bytes of {}", appended, self.path);
        }

        files.unmount();
        Ok(())
    }

    /// Push the document to `conn` as notifications sized to the link's
    /// MTU. Stops at the first failed notification. Returns the number of
    /// notifications sent.
    pub fn notify<R: RadioStack + ?Sized>(
        &self,
        files: &mut dyn FileStore,
        radio: &mut R,
        conn: ConnHandle,
    ) -> usize {
        if let Err(e) = files.mount() {
            error!("Notify: failed to mount storage: {}", e);
            return 0;
        }

        let mut mtu = radio.att_mtu(conn);
        if mtu == 0 {
            warn!("Notify: MTU unknown for {}, using {}", conn, att::DEFAULT_MTU);
            mtu = att::DEFAULT_MTU;
        }
        let payload = if mtu > att::NOTIFY_OVERHEAD {
            mtu - att::NOTIFY_OVERHEAD
        } else {
            att::DEFAULT_MTU - att::NOTIFY_OVERHEAD
        };
        let chunk = usize::from(payload).min(self.chunk);

        info!(
            "Notify: sending {} to connection {} (chunk size {}, MTU {})",
            self.path, conn, chunk, mtu
        );

        let mut sent = 0;
        let result = self.open(files).and_then(|(mut file, size)| {
            for_each_chunk(&mut *file, size, chunk, |data| {
                match radio.notify(conn, ble::CAPABILITY_UUID, data) {
                    Ok(()) => {
                        sent += 1;
                        ControlFlow::Continue(())
                    }
                    Err(e) => {
                        error!("Notify: error sending notification: {}, stopping", e);
                        ControlFlow::Break(())
                    }
                }
            })
        });
        if let Err(e) = result {
            error!("Notify: error reading {}: {}", self.path, e);
        }

        files.unmount();
        sent
    }

    fn open(&self, files: &mut dyn FileStore) -> io::Result<(Box<dyn ReadSeek>, u64)> {
        let mut file = files.open(&self.path)?;
        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        Ok((file, size))
    }
}

/// Read `size` bytes in `chunk`-sized pieces, one read per piece
fn for_each_chunk(
    file: &mut dyn ReadSeek,
    size: u64,
    chunk: usize,
    mut f: impl FnMut(&[u8]) -> ControlFlow<()>,
) -> io::Result<()> {
    let mut buf = vec![0; chunk];
    let mut remaining = size;
    while remaining > 0 {
        let want = usize::try_from(remaining).map_or(chunk, |r| r.min(chunk));
        file.read_exact(&mut buf[..want])?;
        remaining -= want as u64;
        if f(&buf[..want]).is_break() {
            break;
        }
    }
    Ok(())
}
