//! Settings store
//!
//! Named, typed values in one flash namespace. Every save and load holds a
//! single namespace-wide lock for its whole duration, so a GATT write
//! handler and startup code can never interleave partial updates. A save
//! commits before the lock is released.

use std::sync::Mutex;

use log::*;

use crate::error::{FlashError, SettingsError};
use crate::storage::{Flash, Namespace, Value, ValueKind};

pub struct Settings {
    namespace: Mutex<Option<Box<dyn Namespace>>>,
}

impl Settings {
    /// Initialize the flash partition and open `namespace`.
    ///
    /// A partition that reports a layout mismatch is erased and
    /// re-initialized; that is the only destructive path.
    pub fn init<F: Flash>(flash: &mut F, namespace: &str) -> Result<Self, SettingsError> {
        match flash.init() {
            Ok(()) => {}
            Err(e) if e.needs_erase() => {
                warn!("Flash partition unusable ({}), erasing all settings", e);
                flash.erase()?;
                flash.init()?;
            }
            Err(e) => {
                error!("Failed to initialize flash: {}", e);
                return Err(e.into());
            }
        }

        let ns = flash.open(namespace)?;
        info!("Settings namespace '{}' opened", namespace);

        Ok(Self {
            namespace: Mutex::new(Some(Box::new(ns))),
        })
    }

    /// Save `value` under `key` and commit
    pub fn save(&self, key: &str, value: &Value) -> Result<(), SettingsError> {
        let mut guard = self.namespace.lock().map_err(|_| SettingsError::Poisoned)?;
        let ns = guard.as_mut().ok_or(SettingsError::NotInitialized)?;

        if !ns.supports(value.kind()) {
            error!("Unsupported value type {:?} for key {}", value.kind(), key);
            return Err(SettingsError::Unsupported(value.kind()));
        }

        if let Err(e) = ns.set(key, value) {
            error!("Error saving key {}: {}", key, e);
            return Err(map_flash(e, key, value.kind()));
        }
        ns.commit()?;
        debug!("Saved {} = {:?}", key, value);
        Ok(())
    }

    /// Load `key` as `kind`
    pub fn load(&self, kind: ValueKind, key: &str) -> Result<Value, SettingsError> {
        let guard = self.namespace.lock().map_err(|_| SettingsError::Poisoned)?;
        let ns = guard.as_ref().ok_or(SettingsError::NotInitialized)?;

        if !ns.supports(kind) {
            error!("Unsupported value type {:?} for key {}", kind, key);
            return Err(SettingsError::Unsupported(kind));
        }

        match ns.get(kind, key) {
            Ok(Some(value)) if value.kind() == kind => Ok(value),
            Ok(Some(_)) => Err(SettingsError::TypeMismatch {
                key: key.to_string(),
                expected: kind,
            }),
            Ok(None) => Err(SettingsError::NotFound(key.to_string())),
            Err(e) => {
                error!("Error loading key {}: {}", key, e);
                Err(map_flash(e, key, kind))
            }
        }
    }

    /// Load an on/off flag stored as i8 0/1
    pub fn load_flag(&self, key: &str) -> Result<bool, SettingsError> {
        match self.load(ValueKind::I8, key)? {
            Value::I8(v) => Ok(v != 0),
            _ => Err(SettingsError::TypeMismatch {
                key: key.to_string(),
                expected: ValueKind::I8,
            }),
        }
    }

    /// Save an on/off flag as i8 0/1
    pub fn save_flag(&self, key: &str, on: bool) -> Result<(), SettingsError> {
        self.save(key, &Value::I8(i8::from(on)))
    }

    /// Close the namespace. Later saves and loads fail with
    /// [`SettingsError::NotInitialized`].
    pub fn deinit(&self) {
        match self.namespace.lock() {
            Ok(mut guard) => {
                if guard.take().is_some() {
                    info!("Settings namespace closed");
                }
            }
            Err(_) => error!("Settings lock poisoned during deinit"),
        }
    }
}

fn map_flash(e: FlashError, key: &str, kind: ValueKind) -> SettingsError {
    match e {
        FlashError::TypeMismatch => SettingsError::TypeMismatch {
            key: key.to_string(),
            expected: kind,
        },
        other => SettingsError::Flash(other),
    }
}
