//! Settings keys in the persistent namespace
//!
//! Flash key names are limited to 15 characters.

/// Namespace the Lighthouse stores everything under
pub const NAMESPACE: &str = "lighthouse";

/// i8, 0 or 1
pub const BEACON_ENABLED: &str = "BEACON_ENABLED";

/// i8, 0 or 1
pub const OUTDOOR_ENABLED: &str = "OUTDOOR_ENABLED";

/// string, advertised name derived at stack sync
pub const DEVICE_NAME: &str = "DEVICE_NAME";

/// i32, incremented once per boot
pub const BOOT_COUNT: &str = "BOOT_COUNT";
