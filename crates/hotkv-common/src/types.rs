//! Core type definitions for HotKV
//!
//! This module defines the fundamental types used throughout the engine:
//! keys, merge-semantic tags, values and transaction identifiers.

use bytes::Bytes;
use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Length of every key in bytes
pub const KEY_LEN: usize = 16;

/// Fixed-size 16-byte key
///
/// The first byte selects the shard in the partitioned backend, so
/// constructors place the most varying byte of the identifier there.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, From, Into)]
pub struct Key([u8; KEY_LEN]);

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Bytes only, no length prefix
        state.write(&self.0);
    }
}

impl Key {
    /// Create a key from raw bytes
    #[must_use]
    pub const fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a key from a numeric identifier
    ///
    /// The identifier is stored little-endian starting at byte 0, so
    /// consecutive ids land on consecutive shards.
    #[must_use]
    pub fn from_u64(id: u64) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        bytes[..8].copy_from_slice(&id.to_le_bytes());
        Self(bytes)
    }

    /// Create a key from a type prefix and a numeric identifier
    ///
    /// Layout: id (8 bytes, little-endian) followed by the prefix,
    /// truncated to the remaining 8 bytes.
    #[must_use]
    pub fn from_parts(prefix: &str, id: u64) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        bytes[..8].copy_from_slice(&id.to_le_bytes());
        let prefix = prefix.as_bytes();
        let n = prefix.len().min(KEY_LEN - 8);
        bytes[8..8 + n].copy_from_slice(&prefix[..n]);
        Self(bytes)
    }

    /// Create a key from a string, truncating or zero-padding to 16 bytes
    #[must_use]
    pub fn from_str_bytes(s: &str) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        let src = s.as_bytes();
        let n = src.len().min(KEY_LEN);
        bytes[..n].copy_from_slice(&src[..n]);
        Self(bytes)
    }

    /// Shard selector byte for the partitioned backend
    #[inline]
    #[must_use]
    pub const fn selector(&self) -> u8 {
        self.0[0]
    }

    /// Get as bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Transaction identifier, also used as a record version
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into,
)]
#[display("{_0}")]
pub struct Tid(u64);

impl Tid {
    /// Create a transaction id
    #[must_use]
    pub const fn new(tid: u64) -> Self {
        Self(tid)
    }

    /// Get the raw value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Merge-semantic tag attached to a key at creation time
///
/// Selects how concurrent writes to the key combine. Fixed for the
/// lifetime of the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum KeyType {
    /// Accumulate a signed delta into the scalar field
    #[display("SUM")]
    Sum,
    /// Keep the running maximum of the scalar field
    #[display("MAX")]
    Max,
    /// Last write wins on the generic value field
    #[display("WRITE")]
    Write,
    /// Ordered append of list entries
    #[display("LIST")]
    List,
    /// Overwrite gated by a strictly higher priority
    #[display("OOWRITE")]
    OoWrite,
}

impl KeyType {
    /// All tags, in declaration order
    pub const ALL: [Self; 5] = [Self::Sum, Self::Max, Self::Write, Self::List, Self::OoWrite];

    /// True if the tag operates on the scalar field
    #[must_use]
    pub const fn is_scalar(self) -> bool {
        matches!(self, Self::Sum | Self::Max)
    }
}

/// One element of a LIST record
///
/// Lists are ordered by `order`, highest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Sort key within the list
    pub order: i32,
    /// Key of the row this entry refers to
    pub key: Key,
    /// Auxiliary value carried with the entry
    pub top: i32,
}

impl Entry {
    /// Create a list entry
    #[must_use]
    pub const fn new(order: i32, key: Key, top: i32) -> Self {
        Self { order, key, top }
    }
}

/// Incoming value for an OOWRITE key: a payload and its priority
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overwrite {
    /// Priority compared against the stored priority
    pub priority: i32,
    /// Payload kept when the priority wins
    pub value: Box<Value>,
}

impl Overwrite {
    /// Create a prioritized overwrite
    #[must_use]
    pub fn new(priority: i32, value: Value) -> Self {
        Self {
            priority,
            value: Box::new(value),
        }
    }
}

/// Value carried into and stored by records
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// 32-bit signed scalar
    Int(i32),
    /// Opaque byte payload
    Bytes(Bytes),
    /// UTF-8 string payload
    Str(String),
    /// Single list entry (LIST keys)
    Entry(Entry),
    /// Prioritized payload (OOWRITE keys)
    Overwrite(Overwrite),
}

impl Value {
    /// Short name of the variant, used in diagnostics
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Bytes(_) => "bytes",
            Self::Str(_) => "str",
            Self::Entry(_) => "entry",
            Self::Overwrite(_) => "overwrite",
        }
    }

    /// Get the scalar if this is an `Int`
    #[must_use]
    pub const fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Self::Bytes(v)
    }
}

impl From<Entry> for Value {
    fn from(v: Entry) -> Self {
        Self::Entry(v)
    }
}

impl From<Overwrite> for Value {
    fn from(v: Overwrite) -> Self {
        Self::Overwrite(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_selector_is_first_byte() {
        let key = Key::from_u64(0x1234);
        assert_eq!(key.selector(), 0x34);
        assert_eq!(Key::from_u64(256).selector(), 0);
    }

    #[test]
    fn test_key_from_parts() {
        let a = Key::from_parts("user", 7);
        let b = Key::from_parts("item", 7);
        assert_ne!(a, b);
        assert_eq!(a.selector(), b.selector());
        assert_eq!(&a.as_bytes()[8..12], b"user");
    }

    #[test]
    fn test_key_from_str_truncates() {
        let key = Key::from_str_bytes("a-very-long-key-name-indeed");
        assert_eq!(key.as_bytes(), b"a-very-long-key-");

        let short = Key::from_str_bytes("ab");
        assert_eq!(&short.as_bytes()[..3], &[b'a', b'b', 0]);
    }

    #[test]
    fn test_key_display_hex() {
        let key = Key::new([0xab; KEY_LEN]);
        assert_eq!(key.to_string(), "ab".repeat(KEY_LEN));
    }

    #[test]
    fn test_key_type_display() {
        assert_eq!(KeyType::OoWrite.to_string(), "OOWRITE");
        assert!(KeyType::Sum.is_scalar());
        assert!(!KeyType::List.is_scalar());
    }

    #[test]
    fn test_value_kind() {
        assert_eq!(Value::from(3).kind(), "int");
        assert_eq!(Value::from("x").as_int(), None);
        assert_eq!(Value::Int(9).as_int(), Some(9));
    }
}
