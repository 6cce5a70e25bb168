//! Lighthouse MCU Library
//!
//! Device logic for the Lighthouse lighting fixture, written against traits so
//! it runs the same on the ESP32 and in host tests.
//!
//! This crate provides:
//! - Session registry for the fixed pool of BLE connections
//! - GATT attribute table, dispatcher and characteristic handlers
//! - Pairing / security reactions (passkey display, bond removal)
//! - Advertising payload assembly
//! - Mutex-guarded settings store over a flash key-value backend
//! - Beacon blink engine (alarm interrupt -> doorbell -> paint task)
//! - Outdoor lamp flicker simulation
//!
//! # MCU implementations
//! - ESP32: see `lighthouse-esp32`
//!
//! Hardware is reached only through [`ble::RadioStack`], [`storage::Flash`],
//! [`storage::FileStore`], [`blink::Alarm`], [`blink::PixelStrip`] and
//! [`outdoor::Dimmer`].

pub mod advertising;
pub mod ble;
pub mod blink;
pub mod capability;
pub mod config;
pub mod device;
pub mod error;
pub mod gatt;
pub mod light;
pub mod outdoor;
pub mod remote;
pub mod security;
pub mod session;
pub mod settings;
pub mod storage;
pub mod uart;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{AttError, FlashError, RadioError, SettingsError, SwitchError};
pub use remote::RemoteControl;
pub use settings::Settings;
