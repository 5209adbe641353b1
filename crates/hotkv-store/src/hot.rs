//! Hot-key index
//!
//! Keys flagged as contended use the split (hot-key) protocol instead of
//! the ordinary exclusive lock. The common case is an empty index, so a
//! separate flag answers "no hot keys at all" without probing the map.

use hotkv_common::{Key, KeyHashBuilder};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Hot-key membership map
pub type HotMap = HashMap<Key, bool, KeyHashBuilder>;

/// Set of keys currently flagged hot
///
/// Mutated by the candidate tracker, read by every worker. The emptiness
/// flag is recomputed under the write lock after every mutation.
#[derive(Debug)]
pub struct HotKeys {
    keys: RwLock<HotMap>,
    any: AtomicBool,
}

impl HotKeys {
    /// Create an empty index
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::with_hasher(KeyHashBuilder)),
            any: AtomicBool::new(false),
        }
    }

    /// True if `key` is flagged hot
    #[inline]
    pub fn is_hot(&self, key: &Key) -> bool {
        if !self.any.load(Ordering::Acquire) {
            return false;
        }
        self.keys.read().get(key).copied().unwrap_or(false)
    }

    /// True if at least one key is flagged hot
    #[inline]
    pub fn any(&self) -> bool {
        self.any.load(Ordering::Acquire)
    }

    /// Flag `key` as hot
    pub fn mark_hot(&self, key: Key) {
        self.update(|map| {
            map.insert(key, true);
        });
    }

    /// Remove `key` from the index; true if it was hot
    pub fn remove(&self, key: &Key) -> bool {
        self.update(|map| map.remove(key).unwrap_or(false))
    }

    /// Drop every key
    pub fn clear(&self) {
        self.update(HashMap::clear);
    }

    /// Mutate the underlying map and refresh the emptiness flag
    pub fn update<R>(&self, f: impl FnOnce(&mut HotMap) -> R) -> R {
        let mut keys = self.keys.write();
        let result = f(&mut keys);
        self.any.store(keys.values().any(|&hot| hot), Ordering::Release);
        result
    }

    /// Keys currently flagged hot
    pub fn snapshot(&self) -> Vec<Key> {
        self.keys
            .read()
            .iter()
            .filter_map(|(k, &hot)| hot.then_some(*k))
            .collect()
    }

    /// Number of keys flagged hot
    pub fn len(&self) -> usize {
        self.keys.read().values().filter(|&&hot| hot).count()
    }

    /// True if no key is flagged hot
    pub fn is_empty(&self) -> bool {
        !self.any()
    }
}

impl Default for HotKeys {
    fn default() -> Self {
        Self::new()
    }
}
