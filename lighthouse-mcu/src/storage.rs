//! Persistent Storage Abstraction Traits
//!
//! Traits for the two non-volatile stores the fixture uses: the flash
//! key-value store behind the settings, and the file system holding the
//! capability document.

use std::io::{self, Read, Seek};

use crate::error::FlashError;

/// Type of a stored setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Str,
    I8,
    I32,
}

/// A typed setting value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    I8(i8),
    I32(i32),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Str(_) => ValueKind::Str,
            Value::I8(_) => ValueKind::I8,
            Value::I32(_) => ValueKind::I32,
        }
    }
}

/// Trait for the flash partition holding key-value namespaces
///
/// MCU-specific crates implement this trait using their storage backend
/// (NVS for ESP32).
pub trait Flash {
    type Namespace: Namespace + 'static;

    /// Initialize the partition. [`FlashError::NoFreePages`] and
    /// [`FlashError::NewVersionFound`] mean the partition must be erased.
    fn init(&mut self) -> Result<(), FlashError>;

    /// Erase the whole partition
    fn erase(&mut self) -> Result<(), FlashError>;

    /// Open (or create) a namespace for reading and writing
    fn open(&mut self, namespace: &str) -> Result<Self::Namespace, FlashError>;
}

/// An open key-value namespace
pub trait Namespace: Send {
    /// Whether this backend can store values of `kind`
    fn supports(&self, kind: ValueKind) -> bool {
        let _ = kind;
        true
    }

    /// Read `key` as `kind`. `Ok(None)` if the key was never written.
    fn get(&self, kind: ValueKind, key: &str) -> Result<Option<Value>, FlashError>;

    /// Write `value` under `key`. Not durable until [`Namespace::commit`].
    fn set(&mut self, key: &str, value: &Value) -> Result<(), FlashError>;

    /// Flush pending writes
    fn commit(&mut self) -> Result<(), FlashError>;
}

/// A readable, seekable file
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Trait for the file system partition
pub trait FileStore: Send {
    /// Mount the partition
    fn mount(&mut self) -> io::Result<()>;

    /// Unmount the partition, closing anything still open
    fn unmount(&mut self);

    /// Open a file for reading
    fn open(&mut self, path: &str) -> io::Result<Box<dyn ReadSeek>>;
}
