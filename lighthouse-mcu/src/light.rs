//! Boolean light characteristics
//!
//! Each light is an on/off effect ([`Switch`]) gated by a persisted i8
//! flag. Writes are validated first; a rejected write touches neither the
//! effect nor storage. An accepted write runs the effect, then persists.

use lighthouse_proto::keys;
use log::*;

use crate::error::{AttError, SettingsError, SwitchError};
use crate::gatt::{AccessOp, ResponseBuffer};
use crate::settings::Settings;

/// An effect that can be started and stopped
pub trait Switch: Send {
    fn start(&mut self) -> Result<(), SwitchError>;
    fn stop(&mut self) -> Result<(), SwitchError>;
    fn is_running(&self) -> bool;
}

/// Stand-in for an effect whose hardware failed to come up. The light
/// stays addressable over the radio but every switch attempt fails.
pub struct Unavailable;

impl Switch for Unavailable {
    fn start(&mut self) -> Result<(), SwitchError> {
        Err(SwitchError::NotInitialized)
    }

    fn stop(&mut self) -> Result<(), SwitchError> {
        Err(SwitchError::NotInitialized)
    }

    fn is_running(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    /// Blinking warning light on the pixel strip
    Beacon,
    /// Flickering outdoor lamp on the PWM channels
    Outdoor,
}

impl LightKind {
    /// Settings key of the enable flag
    pub fn key(self) -> &'static str {
        match self {
            LightKind::Beacon => keys::BEACON_ENABLED,
            LightKind::Outdoor => keys::OUTDOOR_ENABLED,
        }
    }
}

pub struct Light {
    kind: LightKind,
    enabled: bool,
    switch: Box<dyn Switch>,
}

impl Light {
    pub fn new(kind: LightKind, switch: Box<dyn Switch>) -> Self {
        Self {
            kind,
            enabled: false,
            switch,
        }
    }

    pub fn kind(&self) -> LightKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Apply the persisted flag at startup. A missing flag means `default`.
    pub fn reconcile(&mut self, settings: &Settings, default: bool) -> Result<bool, SwitchError> {
        let key = self.kind.key();
        let wanted = match settings.load_flag(key) {
            Ok(v) => v,
            Err(SettingsError::NotFound(_)) => {
                debug!("{} not stored yet, defaulting to {}", key, default);
                default
            }
            Err(e) => {
                warn!("Failed to load {}: {}, defaulting to {}", key, e, default);
                default
            }
        };

        if wanted {
            self.switch.start()?;
        } else if self.switch.is_running() {
            self.switch.stop()?;
        }
        self.enabled = wanted;
        info!("{:?} {}", self.kind, if wanted { "enabled" } else { "disabled" });
        Ok(wanted)
    }

    pub fn access(
        &mut self,
        op: AccessOp,
        payload: &[u8],
        out: &mut ResponseBuffer,
        settings: &Settings,
    ) -> Result<(), AttError> {
        match op {
            AccessOp::ReadChr => self.read(out),
            AccessOp::WriteChr => self.write(payload, settings),
            other => {
                debug!("Unexpected {:?} on {:?}", other, self.kind);
                Err(AttError::Unlikely)
            }
        }
    }

    pub fn read(&self, out: &mut ResponseBuffer) -> Result<(), AttError> {
        out.append(&[u8::from(self.enabled)])
            .map_err(|_| AttError::InsufficientResources)
    }

    pub fn write(&mut self, payload: &[u8], settings: &Settings) -> Result<(), AttError> {
        let on = match payload {
            [0] => false,
            [1] => true,
            [v] => {
                debug!("Rejected {:?} write: value {} out of range", self.kind, v);
                return Err(AttError::InvalidValue);
            }
            _ => {
                debug!("Rejected {:?} write: {} bytes", self.kind, payload.len());
                return Err(AttError::InvalidLength);
            }
        };

        if on == self.enabled {
            return Ok(());
        }

        let result = if on { self.switch.start() } else { self.switch.stop() };
        if let Err(e) = result {
            error!("Failed to switch {:?} {}: {}", self.kind, if on { "on" } else { "off" }, e);
            return Err(AttError::Unlikely);
        }
        self.enabled = on;

        settings.save_flag(self.kind.key(), on).map_err(|e| {
            error!("Failed to persist {}: {}", self.kind.key(), e);
            AttError::Unlikely
        })
    }
}

/// Both lights of the fixture
pub struct Lights {
    pub beacon: Light,
    pub outdoor: Light,
}

impl Lights {
    pub fn new(beacon: Box<dyn Switch>, outdoor: Box<dyn Switch>) -> Self {
        Self {
            beacon: Light::new(LightKind::Beacon, beacon),
            outdoor: Light::new(LightKind::Outdoor, outdoor),
        }
    }

    pub fn get_mut(&mut self, kind: LightKind) -> &mut Light {
        match kind {
            LightKind::Beacon => &mut self.beacon,
            LightKind::Outdoor => &mut self.outdoor,
        }
    }

    /// Start whatever the persisted flags say should run. Both lights
    /// default to on. A light that fails to start does not keep the other
    /// from starting.
    pub fn reconcile(&mut self, settings: &Settings) {
        for light in [&mut self.beacon, &mut self.outdoor] {
            if let Err(e) = light.reconcile(settings, true) {
                error!("Failed to start {:?}: {}", light.kind(), e);
            }
        }
    }
}
