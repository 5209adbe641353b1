//! Storage backend abstraction
//!
//! A store is built over exactly one backend for its whole lifetime:
//! either [`PartitionedStore`](crate::PartitionedStore) or
//! [`FlatStore`](crate::FlatStore).

use crate::record::{LockMode, Record};
use hotkv_common::{BackendKind, Key, KeyType, Result, Value};
use std::sync::Arc;

/// Key to record mapping shared by all worker threads
///
/// Keys are never removed, and each key maps to at most one record for
/// the backend's lifetime unless [`create`](Self::create) is used to
/// replace it.
pub trait RecordBackend: Send + Sync {
    /// Which backend this is
    fn kind(&self) -> BackendKind;

    /// Look up the record for `key`
    ///
    /// Returns `Error::KeyNotFound` if the key was never created.
    fn get(&self, key: &Key) -> Result<Arc<Record>>;

    /// Publish a new record for `key`, replacing any existing one
    ///
    /// Only for initialization paths where the caller knows the key is new.
    fn create(&self, key: Key, value: Option<Value>, key_type: KeyType) -> Arc<Record>;

    /// Return the resident record for `key`, creating it if needed
    ///
    /// Concurrent callers all receive the same record.
    fn create_if_absent(&self, key: Key, value: Option<Value>, key_type: KeyType) -> Arc<Record>;

    /// Create a record already held under `mode` and publish it
    ///
    /// The lock is taken before the record becomes visible. Returns
    /// `Error::DuplicateKey` if the key already exists; the unpublished
    /// record is then dropped.
    fn create_with_lock(&self, key: Key, key_type: KeyType, mode: LockMode) -> Result<Arc<Record>>;

    /// Number of resident keys
    fn len(&self) -> usize;

    /// True if no key was created yet
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-shard access counts, for backends that have shards
    fn shard_accesses(&self) -> Option<Vec<u64>> {
        None
    }

    /// Zero the per-shard access counts
    fn reset_shard_accesses(&self) {}
}

/// Build a record and take `mode` on it before anyone else can see it
pub(crate) fn new_locked_record(key: Key, key_type: KeyType, mode: LockMode) -> Arc<Record> {
    let record = Arc::new(Record::new(key, None, key_type));
    record.acquire(mode);
    record
}
