//! Device configuration
//!
//! Build-time values for the fixture. Every field has a default, so a
//! partial JSON document only overrides what it names.

use serde::Deserialize;

/// An RGB colour for the pixel strip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StripConfig {
    /// Data-in GPIO of the pixel strip
    pub pin: i32,
    pub pixels: usize,
    /// Colour of the odd pixels at power-up
    pub idle_color: Rgb,
}

impl Default for StripConfig {
    fn default() -> Self {
        Self {
            pin: 10,
            pixels: 64,
            idle_color: Rgb::new(10, 10, 10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    /// Alarm period; the light changes phase once per period
    pub period_ms: u64,
    pub color: Rgb,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            period_ms: 2000,
            color: Rgb::new(0, 200, 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OutdoorConfig {
    pub left_pin: i32,
    pub right_pin: i32,
    pub frequency_hz: u32,
}

impl Default for OutdoorConfig {
    fn default() -> Self {
        Self {
            left_pin: 4,
            right_pin: 5,
            frequency_hz: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    /// File streamed by the capability characteristic
    pub path: String,
    /// Maximum bytes per read from the file system
    pub chunk_size: usize,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            path: "/storage/capability.json".to_string(),
            chunk_size: 200,
        }
    }
}

/// Lighthouse configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prefix of the advertised name, "<product> ABCD"
    pub product_name: String,
    pub manufacturer: String,
    pub hardware_revision: String,
    /// Passkey displayed during pairing. Fixed, never persisted.
    pub passkey: u32,
    /// Size of the session pool; should match the stack's connection limit
    pub max_connections: usize,
    pub strip: StripConfig,
    pub beacon: BeaconConfig,
    pub outdoor: OutdoorConfig,
    pub capabilities: CapabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            product_name: "Lighthouse".to_string(),
            manufacturer: "Lighthouse Works".to_string(),
            hardware_revision: "rev1".to_string(),
            passkey: 424242,
            max_connections: 3,
            strip: StripConfig::default(),
            beacon: BeaconConfig::default(),
            outdoor: OutdoorConfig::default(),
            capabilities: CapabilityConfig::default(),
        }
    }
}

impl Config {
    /// Parse a JSON override document
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}
