//! Commutative merge functions
//!
//! Each function folds one incoming value into a [`RecordState`]
//! according to the key's [`KeyType`]. They take no protocol lock: the
//! caller holds whatever record lock its protocol requires.
//!
//! A value whose kind does not match the tag is a programming error and
//! panics.

use crate::record::RecordState;
use hotkv_common::{Entry, KeyType, Value};

/// Apply a scalar update (SUM or MAX)
///
/// # Panics
///
/// Panics if `key_type` is not SUM or MAX.
pub fn merge_int(state: &mut RecordState, v: i32, key_type: KeyType) {
    match key_type {
        KeyType::Sum => state.int_value = state.int_value.wrapping_add(v),
        KeyType::Max => state.int_value = state.int_value.max(v),
        other => panic!("scalar merge on {other} key"),
    }
}

/// Insert `entry` keeping entries sorted by descending `order`
///
/// Entries with an equal order keep arrival order. The list is truncated
/// to `max_len`; an entry ordered past the tail of a full list is dropped.
pub fn merge_list(state: &mut RecordState, entry: Entry, max_len: usize) {
    let pos = state.entries.partition_point(|e| e.order >= entry.order);
    if pos >= max_len {
        return;
    }
    state.entries.insert(pos, entry);
    state.entries.truncate(max_len);
}

/// Keep `value` with `priority` if it beats the stored priority
///
/// An empty record accepts any priority.
pub fn merge_overwrite(state: &mut RecordState, priority: i32, value: Value) {
    if priority > state.int_value || state.value.is_none() {
        state.int_value = priority;
        state.value = Some(value);
    }
}

/// Fold an incoming value into the record by its tag
///
/// `None` is a no-op for LIST and OOWRITE and clears the value of a WRITE
/// key.
///
/// # Panics
///
/// Panics if the value kind does not match `key_type`, or a SUM/MAX key
/// receives no value.
pub fn apply(state: &mut RecordState, value: Option<Value>, key_type: KeyType, max_list_len: usize) {
    match (key_type, value) {
        (KeyType::Sum | KeyType::Max, Some(Value::Int(v))) => merge_int(state, v, key_type),
        (KeyType::Write, v) => state.value = v,
        (KeyType::List | KeyType::OoWrite, None) => {}
        (KeyType::List, Some(Value::Entry(e))) => merge_list(state, e, max_list_len),
        (KeyType::OoWrite, Some(Value::Overwrite(o))) => merge_overwrite(state, o.priority, *o.value),
        (key_type, Some(v)) => panic!("cannot merge {} value into {key_type} key", v.kind()),
        (key_type, None) => panic!("cannot merge empty value into {key_type} key"),
    }
}
