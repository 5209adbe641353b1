//! HotKV Common - Shared types and utilities
//!
//! This crate provides the key and value types, error definitions,
//! key hashing and configuration shared by all HotKV components.

pub mod checksum;
pub mod config;
pub mod error;
pub mod types;

pub use checksum::{KeyHashBuilder, KeyHasher, key_hash};
pub use config::{BackendKind, Config, ReadLocking, StoreConfig, TrackerConfig};
pub use error::{Error, Result};
pub use types::*;
