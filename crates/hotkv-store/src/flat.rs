//! Flat backend
//!
//! One concurrent hash map spans the whole keyspace. Keys are hashed with
//! CRC32C over their 16 bytes. There are no shard locks to take for
//! lookups, and creation goes through a put-if-missing primitive.

use crate::backend::{RecordBackend, new_locked_record};
use crate::record::{LockMode, Record};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hotkv_common::{BackendKind, Error, Key, KeyHashBuilder, KeyType, Result, Value};
use std::sync::Arc;
use tracing::{debug, error};

/// Single concurrent map from key to record
pub struct FlatStore {
    map: DashMap<Key, Arc<Record>, KeyHashBuilder>,
}

impl FlatStore {
    /// Create an empty flat store
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(KeyHashBuilder),
        }
    }

    /// Insert `record` unless `key` is present; true if it was inserted
    fn put_if_missing(&self, key: Key, record: &Arc<Record>) -> bool {
        match self.map.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(record));
                true
            }
        }
    }

    fn lookup(&self, key: &Key) -> Option<Arc<Record>> {
        self.map.get(key).map(|r| Arc::clone(r.value()))
    }
}

impl Default for FlatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordBackend for FlatStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Flat
    }

    fn get(&self, key: &Key) -> Result<Arc<Record>> {
        self.lookup(key).ok_or(Error::KeyNotFound(*key))
    }

    fn create(&self, key: Key, value: Option<Value>, key_type: KeyType) -> Arc<Record> {
        let record = Arc::new(Record::new(key, value, key_type));
        self.map.insert(key, Arc::clone(&record));
        record
    }

    fn create_if_absent(&self, key: Key, value: Option<Value>, key_type: KeyType) -> Arc<Record> {
        if let Some(record) = self.lookup(&key) {
            return record;
        }

        let record = Arc::new(Record::new(key, value, key_type));
        if self.put_if_missing(key, &record) {
            return record;
        }
        // Lost the race: the winner must be visible now
        match self.lookup(&key) {
            Some(winner) => winner,
            None => {
                error!("cannot put new key {key}, but lookup says it isn't there");
                panic!("flat store lost key {key} after a failed put-if-missing");
            }
        }
    }

    fn create_with_lock(&self, key: Key, key_type: KeyType, mode: LockMode) -> Result<Arc<Record>> {
        let record = new_locked_record(key, key_type, mode);
        if self.put_if_missing(key, &record) {
            Ok(record)
        } else {
            debug!("key already exists {key}");
            Err(Error::DuplicateKey(key))
        }
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_get_missing_key() {
        let store = FlatStore::new();
        assert!(store.get(&Key::from_u64(1)).unwrap_err().is_not_found());
        assert!(store.is_empty());
        assert_eq!(store.shard_accesses(), None);
    }

    #[test]
    fn test_create_and_get() {
        let store = FlatStore::new();
        let created = store.create(Key::from_u64(1), Some(Value::from("v")), KeyType::Write);
        let found = store.get(&Key::from_u64(1)).unwrap();
        assert!(Arc::ptr_eq(&created, &found));
        assert_eq!(found.value(), Some(Value::from("v")));
    }

    #[test]
    fn test_create_last_writer_wins() {
        let store = FlatStore::new();
        store.create(Key::from_u64(1), Some(Value::Int(1)), KeyType::Sum);
        let second = store.create(Key::from_u64(1), Some(Value::Int(2)), KeyType::Sum);
        assert!(Arc::ptr_eq(&second, &store.get(&Key::from_u64(1)).unwrap()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_create_if_absent_keeps_resident() {
        let store = FlatStore::new();
        let first = store.create_if_absent(Key::from_u64(1), Some(Value::Int(1)), KeyType::Max);
        let second = store.create_if_absent(Key::from_u64(1), Some(Value::Int(5)), KeyType::Max);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.int_value(), 1);
    }

    #[test]
    fn test_create_with_lock_modes() {
        let store = FlatStore::new();
        let a = store
            .create_with_lock(Key::from_u64(1), KeyType::Sum, LockMode::Exclusive)
            .unwrap();
        let b = store
            .create_with_lock(Key::from_u64(2), KeyType::Sum, LockMode::Split)
            .unwrap();
        let c = store
            .create_with_lock(Key::from_u64(3), KeyType::Sum, LockMode::SplitShared)
            .unwrap();
        assert!(a.is_locked());
        assert!(b.is_split_locked());
        assert!(c.is_split_read_locked());

        let err = store
            .create_with_lock(Key::from_u64(1), KeyType::Sum, LockMode::Exclusive)
            .unwrap_err();
        assert_eq!(err, Error::DuplicateKey(Key::from_u64(1)));
    }

    #[test]
    fn test_concurrent_first_access() {
        let store = FlatStore::new();
        let barrier = Barrier::new(8);
        let key = Key::from_parts("hot", 1);

        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let (store, barrier) = (&store, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        if i % 2 == 0 {
                            store.create_with_lock(key, KeyType::Write, LockMode::Exclusive)
                        } else {
                            Ok(store.create_if_absent(key, None, KeyType::Write))
                        }
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let resident = store.get(&key).unwrap();
        assert_eq!(store.len(), 1);
        for result in &results {
            match result {
                Ok(record) => assert!(Arc::ptr_eq(record, &resident)),
                Err(e) => assert!(e.is_duplicate()),
            }
        }
    }
}
