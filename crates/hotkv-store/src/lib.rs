//! HotKV Store - Contention-aware in-memory record store
//!
//! This crate implements the storage layer of the engine:
//! - Records with an exclusive version lock and a split reader/writer lock
//! - Commutative merge functions selected by each key's tag
//! - A partitioned backend of 256 independently locked shards
//! - A flat backend over one concurrent hash map
//! - Atomic create-and-lock publication of new records
//! - The hot-key index and the candidate tracker that feeds it

pub mod backend;
pub mod candidates;
pub mod flat;
pub mod hot;
pub mod merge;
pub mod record;
pub mod shard;
pub mod store;

// Re-exports
pub use backend::RecordBackend;
pub use candidates::{Candidates, KeyStats};
pub use flat::FlatStore;
pub use hot::{HotKeys, HotMap};
pub use record::{LockMode, Record, RecordState};
pub use shard::{PartitionedStore, SHARDS, Shard};
pub use store::Store;
