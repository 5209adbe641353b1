//! Record store
//!
//! [`Store`] is what transaction logic talks to. It owns one storage
//! backend, chosen at construction, the hot-key index, and a handle to
//! the candidate tracker.

use crate::backend::RecordBackend;
use crate::candidates::Candidates;
use crate::flat::FlatStore;
use crate::hot::HotKeys;
use crate::merge;
use crate::record::{LockMode, Record};
use crate::shard::PartitionedStore;
use hotkv_common::{BackendKind, Entry, Error, Key, KeyType, ReadLocking, Result, StoreConfig, Value};
use std::sync::Arc;
use tracing::info;

/// In-memory record store
pub struct Store {
    backend: Box<dyn RecordBackend>,
    hot: Arc<HotKeys>,
    candidates: Arc<Candidates>,
    config: StoreConfig,
}

impl Store {
    /// Create a store over the configured backend
    ///
    /// Returns `Error::Configuration` if the config asks for externally
    /// synchronized reads; use [`Store::new_externally_synchronized`].
    pub fn new(config: StoreConfig, candidates: Arc<Candidates>) -> Result<Self> {
        if config.read_locking == ReadLocking::External {
            return Err(Error::configuration(
                "external read locking requires Store::new_externally_synchronized",
            ));
        }
        let backend: Box<dyn RecordBackend> = match config.backend {
            BackendKind::Partitioned => Box::new(PartitionedStore::new(config.track_shard_access)),
            BackendKind::Flat => Box::new(FlatStore::new()),
        };
        Ok(Self::with_backend(backend, config, candidates))
    }

    /// Create a partitioned store whose lookups take no shard lock
    ///
    /// # Safety
    ///
    /// The caller must guarantee that no key is created while any lookup
    /// runs, for the whole lifetime of the store. See
    /// [`PartitionedStore::new_externally_synchronized`].
    #[allow(unsafe_code)]
    pub unsafe fn new_externally_synchronized(
        mut config: StoreConfig,
        candidates: Arc<Candidates>,
    ) -> Result<Self> {
        if config.backend != BackendKind::Partitioned {
            return Err(Error::configuration(
                "external read locking requires the partitioned backend",
            ));
        }
        config.read_locking = ReadLocking::External;
        // SAFETY: forwarded from this function's contract
        let backend = unsafe { PartitionedStore::new_externally_synchronized(config.track_shard_access) };
        Ok(Self::with_backend(Box::new(backend), config, candidates))
    }

    fn with_backend(
        backend: Box<dyn RecordBackend>,
        config: StoreConfig,
        candidates: Arc<Candidates>,
    ) -> Self {
        info!(
            "Created record store (backend: {:?}, reads: {:?}, shard tracking: {})",
            config.backend, config.read_locking, config.track_shard_access
        );
        Self {
            backend,
            hot: Arc::new(HotKeys::new()),
            candidates,
            config,
        }
    }

    /// Store configuration
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Backend in use
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    // Records

    /// Look up the record for `key`
    pub fn get(&self, key: &Key) -> Result<Arc<Record>> {
        self.backend.get(key)
    }

    /// Publish a fresh record for `key`, replacing any existing one
    pub fn create(&self, key: Key, value: Option<Value>, key_type: KeyType) -> Arc<Record> {
        self.backend.create(key, value, key_type)
    }

    /// Return the resident record for `key`, creating it if needed
    pub fn create_if_absent(&self, key: Key, value: Option<Value>, key_type: KeyType) -> Arc<Record> {
        self.backend.create_if_absent(key, value, key_type)
    }

    /// Create `key` already locked in `mode`
    ///
    /// Returns `Error::DuplicateKey` if the key exists; fall back to
    /// [`get`](Self::get) in that case.
    pub fn create_with_lock(&self, key: Key, key_type: KeyType, mode: LockMode) -> Result<Arc<Record>> {
        self.backend.create_with_lock(key, key_type, mode)
    }

    /// Create `key` holding its exclusive lock
    pub fn create_locked(&self, key: Key, key_type: KeyType) -> Result<Arc<Record>> {
        self.create_with_lock(key, key_type, LockMode::Exclusive)
    }

    /// Create `key` holding the exclusive side of its split lock
    pub fn create_split_locked(&self, key: Key, key_type: KeyType) -> Result<Arc<Record>> {
        self.create_with_lock(key, key_type, LockMode::Split)
    }

    /// Create `key` holding the shared side of its split lock
    pub fn create_split_read_locked(&self, key: Key, key_type: KeyType) -> Result<Arc<Record>> {
        self.create_with_lock(key, key_type, LockMode::SplitShared)
    }

    /// Number of resident keys
    pub fn len(&self) -> usize {
        self.backend.len()
    }

    /// True if no key was created yet
    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }

    // Merges

    /// Fold `value` into `record` by `key_type`
    ///
    /// # Panics
    ///
    /// Panics if `key_type` is not the record's tag, or if the value kind
    /// does not match it.
    pub fn apply_merge(&self, record: &Record, value: Option<Value>, key_type: KeyType) {
        check_tag(record, key_type);
        merge::apply(&mut record.state(), value, key_type, self.config.max_list_len);
    }

    /// Apply a SUM or MAX update
    ///
    /// # Panics
    ///
    /// Panics if `key_type` is not the record's tag.
    pub fn merge_int(&self, record: &Record, v: i32, key_type: KeyType) {
        check_tag(record, key_type);
        merge::merge_int(&mut record.state(), v, key_type);
    }

    /// Insert a list entry
    ///
    /// # Panics
    ///
    /// Panics if the record is not a LIST.
    pub fn merge_list(&self, record: &Record, entry: Entry) {
        check_tag(record, KeyType::List);
        merge::merge_list(&mut record.state(), entry, self.config.max_list_len);
    }

    /// Apply a prioritized overwrite
    ///
    /// # Panics
    ///
    /// Panics if the record is not an OOWRITE.
    pub fn merge_overwrite(&self, record: &Record, priority: i32, value: Value) {
        check_tag(record, KeyType::OoWrite);
        merge::merge_overwrite(&mut record.state(), priority, value);
    }

    // Hot keys

    /// True if `key` should use the hot-key protocol
    #[inline]
    pub fn is_hot(&self, key: &Key) -> bool {
        self.hot.is_hot(key)
    }

    /// Shared hot-key index, mutated by the candidate tracker
    pub const fn hot_keys(&self) -> &Arc<HotKeys> {
        &self.hot
    }

    /// Candidate tracker handle
    pub const fn candidates(&self) -> &Arc<Candidates> {
        &self.candidates
    }

    // Instrumentation

    /// Per-shard access counts (empty for the flat backend)
    pub fn shard_accesses(&self) -> Vec<u64> {
        self.backend.shard_accesses().unwrap_or_default()
    }

    /// Zero the per-shard access counts
    pub fn reset_shard_accesses(&self) {
        self.backend.reset_shard_accesses();
    }
}

/// A record keeps the tag it was created with
fn check_tag(record: &Record, key_type: KeyType) {
    assert!(
        record.key_type() == key_type,
        "{key_type} merge on {} record {}",
        record.key_type(),
        record.key()
    );
}
