//! Records and their locks
//!
//! A [`Record`] holds the merged state of one key. It carries two
//! independent lock words:
//!
//! - a **version word** whose top bit is the exclusive lock, used by the
//!   ordinary (cold key) commit protocol; the remaining bits hold the
//!   [`Tid`] of the last writer
//! - a **split lock**, a raw `parking_lot` reader/writer lock used by the
//!   hot-key protocol: [`LockMode::Split`] is its exclusive side and
//!   [`LockMode::SplitShared`] its shared side
//!
//! Neither hands out a guard, so a lock can be acquired in one call and
//! released in a later one, possibly from a different stack frame. Waiters
//! on the split lock park; the version word spins briefly, then yields.
//! The value fields sit behind their own short-lived latch; holding a
//! protocol lock does not take it.

use hotkv_common::{Entry, Key, KeyType, Tid, Value};
use parking_lot::lock_api::RawRwLock as _;
use parking_lot::{Mutex, MutexGuard, RawRwLock};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread;

/// Exclusive-lock bit of the version word
const LOCK_BIT: u64 = 1 << 63;

/// Writer bit of the split holder count; the low bits count shared holders
const SPLIT_WRITER: u32 = 1 << 31;

/// Spins before a version-word waiter starts yielding its time slice
const SPIN_LIMIT: u32 = 64;

/// Lock mode requested when creating a record already locked
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Version-word exclusive lock
    Exclusive,
    /// Exclusive side of the split lock
    Split,
    /// Shared side of the split lock
    SplitShared,
}

/// Mutable contents of a record
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordState {
    /// Scalar field (SUM, MAX) or stored priority (OOWRITE)
    pub int_value: i32,
    /// Generic value field (WRITE, OOWRITE)
    pub value: Option<Value>,
    /// Ordered entries (LIST), highest `order` first
    pub entries: Vec<Entry>,
}

/// Merged state of one key
///
/// Shared as `Arc<Record>` and never moved in memory. Lazy creation
/// publishes one record per key; only an explicit `create` on an existing
/// key swaps in a new record, and holders of the old one keep it alive.
pub struct Record {
    key: Key,
    key_type: KeyType,
    version: AtomicU64,
    split: RawRwLock,
    // Granted split holds; the raw lock cannot tell a held writer from a
    // queued one, so unlocks are checked against this instead.
    split_holders: AtomicU32,
    state: Mutex<RecordState>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("key", &self.key)
            .field("key_type", &self.key_type)
            .field("version", &self.version())
            .field("locked", &self.is_locked())
            .field("split_locked", &self.is_split_locked())
            .field("split_read_locked", &self.is_split_read_locked())
            .finish_non_exhaustive()
    }
}

impl Record {
    /// Create an unlocked record holding `value`
    ///
    /// # Panics
    ///
    /// Panics if `value` does not fit the representation of `key_type`.
    #[must_use]
    pub fn new(key: Key, value: Option<Value>, key_type: KeyType) -> Self {
        let mut state = RecordState::default();
        match (key_type, value) {
            (_, None) => {}
            (KeyType::Sum | KeyType::Max, Some(Value::Int(v))) => state.int_value = v,
            (KeyType::Write, Some(v)) => state.value = Some(v),
            (KeyType::List, Some(Value::Entry(e))) => state.entries.push(e),
            (KeyType::OoWrite, Some(Value::Overwrite(o))) => {
                state.int_value = o.priority;
                state.value = Some(*o.value);
            }
            (key_type, Some(v)) => {
                panic!("record {key}: initial {} value for {key_type} key", v.kind())
            }
        }

        Self {
            key,
            key_type,
            version: AtomicU64::new(0),
            split: RawRwLock::INIT,
            split_holders: AtomicU32::new(0),
            state: Mutex::new(state),
        }
    }

    /// Key this record belongs to
    #[must_use]
    pub const fn key(&self) -> &Key {
        &self.key
    }

    /// Merge-semantic tag fixed at creation
    #[must_use]
    pub const fn key_type(&self) -> KeyType {
        self.key_type
    }

    // Exclusive (version word) lock

    /// Try to take the exclusive lock
    ///
    /// Returns the version observed at acquisition, or `None` if the lock
    /// is held.
    pub fn try_lock(&self) -> Option<Tid> {
        let current = self.version.load(Ordering::Relaxed);
        if current & LOCK_BIT != 0 {
            return None;
        }
        self.version
            .compare_exchange(current, current | LOCK_BIT, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(Tid::new)
    }

    /// Take the exclusive lock, waiting as long as needed
    pub fn lock(&self) -> Tid {
        let mut spins = 0;
        loop {
            if let Some(tid) = self.try_lock() {
                return tid;
            }
            backoff(&mut spins);
        }
    }

    /// Release the exclusive lock, keeping the current version
    ///
    /// # Panics
    ///
    /// Panics if the lock is not held.
    pub fn unlock(&self) {
        let prev = self.version.fetch_and(!LOCK_BIT, Ordering::Release);
        assert!(prev & LOCK_BIT != 0, "record {}: unlock while not locked", self.key);
    }

    /// Release the exclusive lock and publish `tid` as the new version
    ///
    /// # Panics
    ///
    /// Panics if the lock is not held or `tid` uses the lock bit.
    pub fn unlock_with(&self, tid: Tid) {
        assert!(tid.get() & LOCK_BIT == 0, "tid {tid} overlaps the lock bit");
        let prev = self.version.swap(tid.get(), Ordering::Release);
        assert!(prev & LOCK_BIT != 0, "record {}: unlock while not locked", self.key);
    }

    /// True while the exclusive lock is held
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.version.load(Ordering::Acquire) & LOCK_BIT != 0
    }

    /// Version published by the last `unlock_with`
    #[must_use]
    pub fn version(&self) -> Tid {
        Tid::new(self.version.load(Ordering::Acquire) & !LOCK_BIT)
    }

    // Split lock

    /// Try to take the exclusive side of the split lock
    pub fn try_split_lock(&self) -> bool {
        let acquired = self.split.try_lock_exclusive();
        if acquired {
            self.split_holders.store(SPLIT_WRITER, Ordering::Release);
        }
        acquired
    }

    /// Take the exclusive side of the split lock, parking while it is held
    pub fn split_lock(&self) {
        self.split.lock_exclusive();
        self.split_holders.store(SPLIT_WRITER, Ordering::Release);
    }

    /// Release the exclusive side of the split lock
    ///
    /// # Panics
    ///
    /// Panics if the exclusive side is not held.
    pub fn split_unlock(&self) {
        let released = self
            .split_holders
            .compare_exchange(SPLIT_WRITER, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        assert!(released, "record {}: split unlock while not split-locked", self.key);
        // SAFETY: the exclusive side was granted and the holder count showed
        // exactly one writer, which this call has just retired.
        #[allow(unsafe_code)]
        unsafe {
            self.split.unlock_exclusive();
        }
    }

    /// Try to take the shared side of the split lock
    pub fn try_split_read_lock(&self) -> bool {
        let acquired = self.split.try_lock_shared();
        if acquired {
            self.split_holders.fetch_add(1, Ordering::AcqRel);
        }
        acquired
    }

    /// Take the shared side of the split lock, parking while a writer holds it
    pub fn split_read_lock(&self) {
        self.split.lock_shared();
        self.split_holders.fetch_add(1, Ordering::AcqRel);
    }

    /// Release one shared hold of the split lock
    ///
    /// # Panics
    ///
    /// Panics if no shared hold exists.
    pub fn split_read_unlock(&self) {
        let released = self
            .split_holders
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n != 0 && n & SPLIT_WRITER == 0).then(|| n - 1)
            })
            .is_ok();
        assert!(released, "record {}: split read unlock without a reader", self.key);
        // SAFETY: a granted shared hold existed and this call retired it.
        #[allow(unsafe_code)]
        unsafe {
            self.split.unlock_shared();
        }
    }

    /// True if the exclusive side of the split lock is held
    #[must_use]
    pub fn is_split_locked(&self) -> bool {
        self.split_holders.load(Ordering::Acquire) == SPLIT_WRITER
    }

    /// True if at least one shared split hold exists
    #[must_use]
    pub fn is_split_read_locked(&self) -> bool {
        let holders = self.split_holders.load(Ordering::Acquire);
        holders != 0 && holders & SPLIT_WRITER == 0
    }

    // Mode dispatch

    /// Take the lock selected by `mode`
    pub fn acquire(&self, mode: LockMode) {
        match mode {
            LockMode::Exclusive => {
                self.lock();
            }
            LockMode::Split => self.split_lock(),
            LockMode::SplitShared => self.split_read_lock(),
        }
    }

    /// Release the lock selected by `mode`
    pub fn release(&self, mode: LockMode) {
        match mode {
            LockMode::Exclusive => self.unlock(),
            LockMode::Split => self.split_unlock(),
            LockMode::SplitShared => self.split_read_unlock(),
        }
    }

    /// True if the lock selected by `mode` is currently held by someone
    #[must_use]
    pub fn is_held(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Exclusive => self.is_locked(),
            LockMode::Split => self.is_split_locked(),
            LockMode::SplitShared => self.is_split_read_locked(),
        }
    }

    // Contents

    /// Lock the value fields for a read or a merge
    pub fn state(&self) -> MutexGuard<'_, RecordState> {
        self.state.lock()
    }

    /// Current scalar field
    #[must_use]
    pub fn int_value(&self) -> i32 {
        self.state.lock().int_value
    }

    /// Current generic value field
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        self.state.lock().value.clone()
    }

    /// Current list entries, highest order first
    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        self.state.lock().entries.clone()
    }

    /// Overwrite the scalar field
    pub fn set_int_value(&self, v: i32) {
        self.state.lock().int_value = v;
    }

    /// Overwrite the generic value field
    pub fn set_value(&self, v: Option<Value>) {
        self.state.lock().value = v;
    }
}

fn backoff(spins: &mut u32) {
    if *spins < SPIN_LIMIT {
        *spins += 1;
        std::hint::spin_loop();
    } else {
        thread::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotkv_common::Overwrite;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn test_new_record_initial_values() {
        let key = Key::from_u64(1);
        assert_eq!(Record::new(key, Some(Value::Int(7)), KeyType::Sum).int_value(), 7);
        assert_eq!(Record::new(key, None, KeyType::Max).int_value(), 0);
        assert_eq!(
            Record::new(key, Some(Value::from("x")), KeyType::Write).value(),
            Some(Value::from("x"))
        );

        let oo = Record::new(key, Some(Overwrite::new(3, Value::from("y")).into()), KeyType::OoWrite);
        assert_eq!(oo.int_value(), 3);
        assert_eq!(oo.value(), Some(Value::from("y")));
    }

    #[test]
    #[should_panic(expected = "initial str value for SUM key")]
    fn test_new_record_type_mismatch() {
        let _ = Record::new(Key::from_u64(1), Some(Value::from("x")), KeyType::Sum);
    }

    #[test]
    fn test_exclusive_lock_versions() {
        let record = Record::new(Key::from_u64(1), None, KeyType::Sum);
        assert_eq!(record.try_lock(), Some(Tid::new(0)));
        assert!(record.is_locked());
        assert_eq!(record.try_lock(), None);

        record.unlock_with(Tid::new(42));
        assert!(!record.is_locked());
        assert_eq!(record.version(), Tid::new(42));

        assert_eq!(record.lock(), Tid::new(42));
        record.unlock();
        assert_eq!(record.version(), Tid::new(42));
    }

    #[test]
    #[should_panic(expected = "unlock while not locked")]
    fn test_unlock_unlocked_panics() {
        Record::new(Key::from_u64(1), None, KeyType::Sum).unlock();
    }

    #[test]
    fn test_split_modes_exclude_each_other() {
        let record = Record::new(Key::from_u64(1), None, KeyType::Sum);

        record.split_read_lock();
        assert!(record.try_split_read_lock());
        assert!(record.is_split_read_locked());
        assert!(!record.try_split_lock());

        record.split_read_unlock();
        assert!(record.is_split_read_locked());
        record.split_read_unlock();
        assert!(!record.is_split_read_locked());

        assert!(record.try_split_lock());
        assert!(!record.try_split_read_lock());
        assert!(record.is_split_locked());
        assert!(!record.is_split_read_locked());
        record.split_unlock();
        assert!(!record.is_split_locked());
        assert!(!record.is_split_read_locked());
    }

    #[test]
    #[should_panic(expected = "split read unlock without a reader")]
    fn test_split_read_unlock_unheld_panics() {
        Record::new(Key::from_u64(1), None, KeyType::Sum).split_read_unlock();
    }

    #[test]
    #[should_panic(expected = "split unlock while not split-locked")]
    fn test_split_unlock_under_readers_panics() {
        let record = Record::new(Key::from_u64(1), None, KeyType::Sum);
        record.split_read_lock();
        record.split_unlock();
    }

    #[test]
    fn test_split_writer_parks_until_readers_leave() {
        let record = Arc::new(Record::new(Key::from_u64(1), None, KeyType::Sum));
        let acquired = Arc::new(AtomicBool::new(false));
        record.split_read_lock();
        record.split_read_lock();

        let writer = {
            let record = Arc::clone(&record);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                record.split_lock();
                acquired.store(true, Ordering::SeqCst);
                record.split_unlock();
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!acquired.load(Ordering::SeqCst));
        record.split_read_unlock();
        thread::sleep(Duration::from_millis(20));
        assert!(!acquired.load(Ordering::SeqCst));
        record.split_read_unlock();

        writer.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
        assert!(!record.is_held(LockMode::Split));
        assert!(!record.is_held(LockMode::SplitShared));
    }

    #[test]
    fn test_debug_reports_lock_state() {
        let record = Record::new(Key::from_u64(1), None, KeyType::Sum);
        record.split_read_lock();
        let shown = format!("{record:?}");
        assert!(shown.contains("split_read_locked: true"));
        assert!(shown.contains("split_locked: false"));
        record.split_read_unlock();
    }

    #[test]
    fn test_split_and_exclusive_are_independent() {
        let record = Record::new(Key::from_u64(1), None, KeyType::Sum);
        record.acquire(LockMode::Exclusive);
        record.acquire(LockMode::Split);
        assert!(record.is_held(LockMode::Exclusive));
        assert!(record.is_held(LockMode::Split));
        record.release(LockMode::Split);
        record.release(LockMode::Exclusive);
        assert!(!record.is_held(LockMode::Exclusive));
        assert!(!record.is_held(LockMode::SplitShared));
    }

    #[test]
    fn test_lock_waits_for_holder() {
        let record = Arc::new(Record::new(Key::from_u64(1), None, KeyType::Sum));
        let acquired = Arc::new(AtomicBool::new(false));
        record.lock();

        let waiter = {
            let record = Arc::clone(&record);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let tid = record.lock();
                acquired.store(true, Ordering::SeqCst);
                record.unlock();
                tid
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!acquired.load(Ordering::SeqCst));
        record.unlock_with(Tid::new(5));
        assert_eq!(waiter.join().unwrap(), Tid::new(5));
        assert!(acquired.load(Ordering::SeqCst));
    }
}
