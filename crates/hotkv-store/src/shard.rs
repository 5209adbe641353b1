//! Partitioned backend
//!
//! The keyspace is split into [`SHARDS`] shards selected by the first key
//! byte. Each shard owns its own reader/writer lock, so operations on keys
//! with different selector bytes never touch the same lock.
//!
//! ```text
//!  key[0] ──► shards[key[0]]
//!             ┌───────────────────────────── 128-byte aligned ─┐
//!             │ RwLock<HashMap<Key, Arc<Record>>> │ accesses   │
//!             └────────────────────────────────────────────────┘
//! ```
//!
//! Shards are aligned to 128 bytes (two cache lines, covering adjacent-line
//! prefetch) so neighbors in the array never share a line.

use crate::backend::{RecordBackend, new_locked_record};
use crate::record::{LockMode, Record};
use hotkv_common::{BackendKind, Error, Key, KeyHashBuilder, KeyType, ReadLocking, Result, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

/// Number of shards in the partitioned backend
pub const SHARDS: usize = 256;

type Rows = HashMap<Key, Arc<Record>, KeyHashBuilder>;

/// One independently locked slice of the keyspace
#[repr(align(128))]
pub struct Shard {
    rows: RwLock<Rows>,
    accesses: AtomicU64,
}

const _: () = assert!(std::mem::align_of::<Shard>() == 128);

impl Shard {
    fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::with_hasher(KeyHashBuilder)),
            accesses: AtomicU64::new(0),
        }
    }

    /// Number of keys in this shard
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Check if the shard is empty
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// True while a writer holds this shard
    pub fn is_write_locked(&self) -> bool {
        self.rows.is_locked_exclusive()
    }

    /// Accesses counted since the last reset
    pub fn accesses(&self) -> u64 {
        self.accesses.load(Ordering::Relaxed)
    }
}

/// Array of [`SHARDS`] shards addressed by the key's selector byte
pub struct PartitionedStore {
    shards: Box<[Shard]>,
    read_locking: ReadLocking,
    track_access: bool,
}

impl PartitionedStore {
    /// Create a partitioned store whose lookups take shared shard locks
    pub fn new(track_access: bool) -> Self {
        Self::build(ReadLocking::Shared, track_access)
    }

    /// Create a partitioned store whose lookups take no lock
    ///
    /// # Safety
    ///
    /// The caller must guarantee that no thread creates a key while any
    /// other thread looks one up. Lookups read shard maps directly, so a
    /// concurrent insert is a data race. [`create_if_absent`] is refused in
    /// this mode because lazy creation cannot uphold that guarantee.
    ///
    /// [`create_if_absent`]: RecordBackend::create_if_absent
    pub unsafe fn new_externally_synchronized(track_access: bool) -> Self {
        Self::build(ReadLocking::External, track_access)
    }

    fn build(read_locking: ReadLocking, track_access: bool) -> Self {
        let shards = (0..SHARDS).map(|_| Shard::new()).collect();
        Self {
            shards,
            read_locking,
            track_access,
        }
    }

    /// Shard that owns `key`
    #[inline]
    pub fn shard_for(&self, key: &Key) -> &Shard {
        let shard = &self.shards[usize::from(key.selector())];
        if self.track_access {
            shard.accesses.fetch_add(1, Ordering::Relaxed);
        }
        shard
    }

    /// Shard at `index`
    pub fn shard(&self, index: u8) -> &Shard {
        &self.shards[usize::from(index)]
    }

    /// Lookup policy this store was built with
    pub const fn read_locking(&self) -> ReadLocking {
        self.read_locking
    }

    fn get_locked(&self, key: &Key) -> Result<Arc<Record>> {
        let rows = self.shard_for(key).rows.read();
        rows.get(key).cloned().ok_or(Error::KeyNotFound(*key))
    }

    #[allow(unsafe_code)]
    fn get_unlocked(&self, key: &Key) -> Result<Arc<Record>> {
        let shard = self.shard_for(key);
        // SAFETY: only reachable from a store built with
        // `new_externally_synchronized`, whose caller guarantees no writer
        // runs concurrently with this read.
        let rows = unsafe { &*shard.rows.data_ptr() };
        rows.get(key).cloned().ok_or(Error::KeyNotFound(*key))
    }
}

impl RecordBackend for PartitionedStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Partitioned
    }

    fn get(&self, key: &Key) -> Result<Arc<Record>> {
        match self.read_locking {
            ReadLocking::Shared => self.get_locked(key),
            ReadLocking::External => self.get_unlocked(key),
        }
    }

    fn create(&self, key: Key, value: Option<Value>, key_type: KeyType) -> Arc<Record> {
        let record = Arc::new(Record::new(key, value, key_type));
        self.shard_for(&key).rows.write().insert(key, Arc::clone(&record));
        record
    }

    fn create_if_absent(&self, key: Key, value: Option<Value>, key_type: KeyType) -> Arc<Record> {
        if self.read_locking == ReadLocking::External {
            error!("lazy creation of {key} without shard read locks; keys must be preallocated");
            panic!("create_if_absent({key}) on an externally synchronized store");
        }
        let shard = self.shard_for(&key);
        if let Some(record) = shard.rows.read().get(&key).cloned() {
            return record;
        }

        let mut rows = shard.rows.write();
        Arc::clone(
            rows.entry(key)
                .or_insert_with(|| Arc::new(Record::new(key, value, key_type))),
        )
    }

    fn create_with_lock(&self, key: Key, key_type: KeyType, mode: LockMode) -> Result<Arc<Record>> {
        let record = new_locked_record(key, key_type, mode);

        let mut rows = self.shard_for(&key).rows.write();
        if rows.contains_key(&key) {
            drop(rows);
            debug!("key already exists {key}");
            return Err(Error::DuplicateKey(key));
        }
        rows.insert(key, Arc::clone(&record));
        Ok(record)
    }

    fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    fn shard_accesses(&self) -> Option<Vec<u64>> {
        Some(self.shards.iter().map(Shard::accesses).collect())
    }

    fn reset_shard_accesses(&self) {
        for shard in &self.shards {
            shard.accesses.store(0, Ordering::Relaxed);
        }
    }
}
