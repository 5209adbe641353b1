//! Hot-key candidate tracker
//!
//! Workers report reads, writes and lock conflicts per key. Periodically
//! the tracker promotes the most conflicted keys into [`HotKeys`] and
//! demotes hot keys whose conflict ratio has fallen below the threshold.
//! The store only holds a handle to the tracker; nothing in the store
//! calls into it.

use crate::hot::HotKeys;
use hotkv_common::{Key, KeyHashBuilder, TrackerConfig};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use tracing::info;

/// Access counters for one key
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyStats {
    pub reads: u64,
    pub writes: u64,
    pub conflicts: u64,
}

impl KeyStats {
    /// Total recorded accesses
    pub const fn samples(&self) -> u64 {
        self.reads + self.writes
    }

    /// Fraction of accesses that hit a lock conflict (0.0 to 1.0)
    pub fn conflict_ratio(&self) -> f64 {
        let samples = self.samples();
        if samples == 0 {
            0.0
        } else {
            (self.conflicts as f64 / samples as f64).min(1.0)
        }
    }
}

/// Heap entry ordered by conflict ratio
struct Candidate {
    ratio: f64,
    key: Key,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ratio
            .total_cmp(&other.ratio)
            .then_with(|| other.key.cmp(&self.key))
    }
}

/// Per-key contention statistics
pub struct Candidates {
    config: TrackerConfig,
    stats: Mutex<HashMap<Key, KeyStats, KeyHashBuilder>>,
}

impl Candidates {
    /// Create an empty tracker
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(HashMap::with_hasher(KeyHashBuilder)),
        }
    }

    /// Tracker configuration
    pub const fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Count a read of `key`
    pub fn record_read(&self, key: &Key) {
        self.stats.lock().entry(*key).or_default().reads += 1;
    }

    /// Count a write of `key`
    pub fn record_write(&self, key: &Key) {
        self.stats.lock().entry(*key).or_default().writes += 1;
    }

    /// Count a lock conflict on `key`
    pub fn record_conflict(&self, key: &Key) {
        self.stats.lock().entry(*key).or_default().conflicts += 1;
    }

    /// Counters recorded for `key`
    pub fn stats(&self, key: &Key) -> Option<KeyStats> {
        self.stats.lock().get(key).copied()
    }

    /// Number of keys with recorded counters
    pub fn len(&self) -> usize {
        self.stats.lock().len()
    }

    /// True if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.stats.lock().is_empty()
    }

    /// Forget every counter
    pub fn reset(&self) {
        self.stats.lock().clear();
    }

    /// Promote the most conflicted keys into `hot`
    ///
    /// A key qualifies once it has `min_samples` accesses and a conflict
    /// ratio at or above `conflict_threshold`. Highest ratios go first until
    /// the index holds `max_hot_keys`. Promoted keys start over with fresh
    /// counters. Returns the keys promoted by this call.
    pub fn promote(&self, hot: &HotKeys) -> Vec<Key> {
        let mut stats = self.stats.lock();
        let mut heap: BinaryHeap<Candidate> = stats
            .iter()
            .filter(|(key, s)| {
                s.samples() >= self.config.min_samples
                    && s.conflict_ratio() >= self.config.conflict_threshold
                    && !hot.is_hot(key)
            })
            .map(|(key, s)| Candidate {
                ratio: s.conflict_ratio(),
                key: *key,
            })
            .collect();

        let promoted = hot.update(|map| {
            let mut promoted = Vec::new();
            let mut resident = map.values().filter(|&&h| h).count();
            while resident < self.config.max_hot_keys {
                let Some(candidate) = heap.pop() else { break };
                map.insert(candidate.key, true);
                promoted.push(candidate.key);
                resident += 1;
            }
            promoted
        });

        for key in &promoted {
            stats.remove(key);
        }
        if !promoted.is_empty() {
            info!("Promoted {} hot keys ({} hot)", promoted.len(), hot.len());
        }
        promoted
    }

    /// Demote hot keys whose conflict ratio fell below the threshold
    ///
    /// Keys without `min_samples` accesses since promotion stay hot.
    /// Returns the keys demoted by this call.
    pub fn demote(&self, hot: &HotKeys) -> Vec<Key> {
        let mut stats = self.stats.lock();
        let demoted = hot.update(|map| {
            let cold: Vec<Key> = map
                .iter()
                .filter(|&(key, &is_hot)| {
                    is_hot
                        && stats.get(key).is_some_and(|s| {
                            s.samples() >= self.config.min_samples
                                && s.conflict_ratio() < self.config.conflict_threshold
                        })
                })
                .map(|(key, _)| *key)
                .collect();
            for key in &cold {
                map.remove(key);
            }
            cold
        });

        for key in &demoted {
            stats.remove(key);
        }
        if !demoted.is_empty() {
            info!("Demoted {} hot keys ({} hot)", demoted.len(), hot.len());
        }
        demoted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_hot_keys: usize) -> TrackerConfig {
        TrackerConfig {
            conflict_threshold: 0.5,
            min_samples: 4,
            max_hot_keys,
        }
    }

    fn contend(tracker: &Candidates, key: &Key, writes: u64, conflicts: u64) {
        for _ in 0..writes {
            tracker.record_write(key);
        }
        for _ in 0..conflicts {
            tracker.record_conflict(key);
        }
    }

    #[test]
    fn test_conflict_ratio() {
        let stats = KeyStats {
            reads: 2,
            writes: 2,
            conflicts: 1,
        };
        assert_eq!(stats.samples(), 4);
        assert!((stats.conflict_ratio() - 0.25).abs() < f64::EPSILON);
        assert_eq!(KeyStats::default().conflict_ratio(), 0.0);
    }

    #[test]
    fn test_promote_respects_threshold_and_samples() {
        let tracker = Candidates::new(config(10));
        let hot = HotKeys::new();

        contend(&tracker, &Key::from_u64(1), 10, 8); // ratio 0.8
        contend(&tracker, &Key::from_u64(2), 10, 2); // ratio 0.2
        contend(&tracker, &Key::from_u64(3), 2, 2); // too few samples

        assert_eq!(tracker.promote(&hot), vec![Key::from_u64(1)]);
        assert!(hot.is_hot(&Key::from_u64(1)));
        assert!(!hot.is_hot(&Key::from_u64(2)));
        assert!(!hot.is_hot(&Key::from_u64(3)));
        assert_eq!(tracker.stats(&Key::from_u64(1)), None);
    }

    #[test]
    fn test_promote_highest_ratio_first() {
        let tracker = Candidates::new(config(2));
        let hot = HotKeys::new();

        contend(&tracker, &Key::from_u64(1), 10, 6);
        contend(&tracker, &Key::from_u64(2), 10, 9);
        contend(&tracker, &Key::from_u64(3), 10, 7);

        assert_eq!(tracker.promote(&hot), vec![Key::from_u64(2), Key::from_u64(3)]);
        assert_eq!(hot.len(), 2);

        // Index is full
        assert!(tracker.promote(&hot).is_empty());
        assert!(!hot.is_hot(&Key::from_u64(1)));
    }

    #[test]
    fn test_demote_cooled_keys() {
        let tracker = Candidates::new(config(10));
        let hot = HotKeys::new();
        hot.mark_hot(Key::from_u64(1));
        hot.mark_hot(Key::from_u64(2));

        contend(&tracker, &Key::from_u64(1), 10, 1); // cooled down
        contend(&tracker, &Key::from_u64(2), 10, 9); // still contended

        assert_eq!(tracker.demote(&hot), vec![Key::from_u64(1)]);
        assert!(!hot.is_hot(&Key::from_u64(1)));
        assert!(hot.is_hot(&Key::from_u64(2)));

        hot.remove(&Key::from_u64(2));
        assert!(tracker.demote(&hot).is_empty());
        assert!(hot.is_empty());
    }
}
