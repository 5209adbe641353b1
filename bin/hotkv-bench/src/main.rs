//! HotKV Bench - contention load generator
//!
//! Drives a record store from many worker threads with a skewed SUM
//! workload. Between epochs the candidate tracker promotes contended keys
//! into the hot-key index; hot keys are then updated under the shared
//! split lock instead of the exclusive record lock.

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use hotkv_common::{BackendKind, Config, Key, KeyType, Tid, Value};
use hotkv_store::{Candidates, Record, Store};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hotkv-bench")]
#[command(about = "HotKV contention load generator")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "hotkv.toml")]
    config: String,

    /// Storage backend (partitioned or flat)
    #[arg(short, long)]
    backend: Option<String>,

    /// Number of worker threads
    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Number of preloaded keys
    #[arg(long, default_value = "10000")]
    keys: u64,

    /// Operations per worker per epoch
    #[arg(long, default_value = "20000")]
    ops: u64,

    /// Number of epochs; hot keys are re-evaluated between epochs
    #[arg(long, default_value = "5")]
    epochs: u32,

    /// Fraction of operations aimed at the contended key set
    #[arg(long, default_value = "0.3")]
    hot_share: f64,

    /// Size of the contended key set
    #[arg(long, default_value = "4")]
    hot_set: u64,

    /// Fraction of operations that create a new key on first touch
    #[arg(long, default_value = "0.01")]
    fresh_share: f64,

    /// Count per-shard accesses
    #[arg(long)]
    track_shards: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Per-worker tallies
#[derive(Debug, Default, Clone, Copy)]
struct WorkerStats {
    applied: u64,
    hot_path: u64,
    conflicts: u64,
    created: u64,
}

impl std::ops::AddAssign for WorkerStats {
    fn add_assign(&mut self, other: Self) {
        self.applied += other.applied;
        self.hot_path += other.hot_path;
        self.conflicts += other.conflicts;
        self.created += other.created;
    }
}

fn load_config(path: &str) -> Result<Config> {
    if !std::path::Path::new(path).exists() {
        return Ok(Config::default());
    }
    let config_str = std::fs::read_to_string(path).with_context(|| format!("failed to read config file {path}"))?;
    toml::from_str(&config_str).with_context(|| format!("failed to parse config file {path}"))
}

fn parse_backend(name: &str) -> Result<BackendKind> {
    match name {
        "partitioned" => Ok(BackendKind::Partitioned),
        "flat" => Ok(BackendKind::Flat),
        other => bail!("unknown backend {other:?} (expected partitioned or flat)"),
    }
}

/// Resolve a fresh key, creating it locked; falls back to lookup on a lost race
fn resolve_fresh(store: &Store, key: Key) -> Result<(Arc<Record>, bool)> {
    match store.create_locked(key, KeyType::Sum) {
        Ok(record) => Ok((record, true)),
        Err(e) if e.is_duplicate() => Ok((store.get(&key)?, false)),
        Err(e) => Err(e.into()),
    }
}

fn run_worker(store: &Store, args: &Args, fresh_ids: &AtomicU64, tids: &AtomicU64) -> Result<WorkerStats> {
    let mut rng = rand::thread_rng();
    let mut stats = WorkerStats::default();
    let candidates = store.candidates();

    for _ in 0..args.ops {
        let tid = Tid::new(tids.fetch_add(1, Ordering::Relaxed));

        if rng.gen_bool(args.fresh_share) {
            let key = Key::from_u64(fresh_ids.fetch_add(1, Ordering::Relaxed));
            let (record, created) = resolve_fresh(store, key)?;
            if created {
                // Created holding the exclusive lock
                store.merge_int(&record, 1, KeyType::Sum);
                record.unlock_with(tid);
                stats.created += 1;
                stats.applied += 1;
                continue;
            }
            apply_one(store, &record, tid, &mut stats);
            continue;
        }

        let id = if rng.gen_bool(args.hot_share) {
            rng.gen_range(0..args.hot_set)
        } else {
            rng.gen_range(0..args.keys)
        };
        let key = Key::from_u64(id);
        let record = store.get(&key)?;
        candidates.record_write(&key);
        apply_one(store, &record, tid, &mut stats);
    }
    Ok(stats)
}

fn apply_one(store: &Store, record: &Record, tid: Tid, stats: &mut WorkerStats) {
    if store.is_hot(record.key()) {
        record.split_read_lock();
        store.apply_merge(record, Some(Value::Int(1)), KeyType::Sum);
        record.split_read_unlock();
        stats.hot_path += 1;
    } else {
        if record.try_lock().is_none() {
            store.candidates().record_conflict(record.key());
            stats.conflicts += 1;
            record.lock();
        }
        store.apply_merge(record, Some(Value::Int(1)), KeyType::Sum);
        record.unlock_with(tid);
    }
    stats.applied += 1;
}

fn report_shards(store: &Store) {
    let accesses = store.shard_accesses();
    if accesses.is_empty() {
        return;
    }
    let total: u64 = accesses.iter().sum();
    let max = accesses.iter().copied().max().unwrap_or(0);
    let min = accesses.iter().copied().min().unwrap_or(0);
    info!(
        "Shard accesses: total={} min={} max={} mean={:.1}",
        total,
        min,
        max,
        total as f64 / accesses.len() as f64
    );
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load config file if it exists
    let mut config = load_config(&args.config)?;

    // Merge CLI args with config file (CLI takes precedence)
    if let Some(backend) = &args.backend {
        config.store.backend = parse_backend(backend)?;
    }
    if args.track_shards {
        config.store.track_shard_access = true;
    }
    let log_level = if args.log_level != "info" {
        args.log_level.clone()
    } else {
        config.logging.level.clone()
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if args.hot_set == 0 || args.hot_set > args.keys {
        bail!("--hot-set must be between 1 and --keys");
    }
    for (name, share) in [("--hot-share", args.hot_share), ("--fresh-share", args.fresh_share)] {
        if !(0.0..=1.0).contains(&share) {
            bail!("{name} must be within 0.0 and 1.0");
        }
    }

    info!("Starting HotKV bench");
    info!("Config file: {}", args.config);
    info!(
        "Workers: {}, keys: {}, ops/worker/epoch: {}, epochs: {}",
        args.workers, args.keys, args.ops, args.epochs
    );

    let candidates = Arc::new(Candidates::new(config.tracker.clone()));
    let store = Store::new(config.store.clone(), candidates)?;

    for id in 0..args.keys {
        store.create(Key::from_u64(id), Some(Value::Int(0)), KeyType::Sum);
    }
    info!("Preloaded {} keys", store.len());

    let fresh_ids = AtomicU64::new(args.keys);
    let tids = AtomicU64::new(1);
    let mut totals = WorkerStats::default();
    let started = Instant::now();

    for epoch in 0..args.epochs {
        let epoch_started = Instant::now();
        let results: Vec<Result<WorkerStats>> = thread::scope(|s| {
            let handles: Vec<_> = (0..args.workers)
                .map(|_| s.spawn(|| run_worker(&store, &args, &fresh_ids, &tids)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|_| Err(anyhow!("worker panicked"))))
                .collect()
        });

        let mut epoch_stats = WorkerStats::default();
        for result in results {
            epoch_stats += result?;
        }
        totals += epoch_stats;

        let promoted = store.candidates().promote(store.hot_keys());
        let demoted = store.candidates().demote(store.hot_keys());
        debug!("Epoch {} promoted {:?} demoted {:?}", epoch, promoted, demoted);
        info!(
            "Epoch {}: {} ops in {:?} ({} hot path, {} conflicts, {} created, {} hot keys)",
            epoch,
            epoch_stats.applied,
            epoch_started.elapsed(),
            epoch_stats.hot_path,
            epoch_stats.conflicts,
            epoch_stats.created,
            store.hot_keys().len()
        );
    }

    let elapsed = started.elapsed();
    info!(
        "Done: {} ops in {:?} ({:.0} ops/s)",
        totals.applied,
        elapsed,
        totals.applied as f64 / elapsed.as_secs_f64()
    );
    report_shards(&store);

    // Every operation added exactly 1 to some SUM key
    let fresh_end = fresh_ids.load(Ordering::Relaxed);
    let mut sum: i64 = 0;
    for id in 0..fresh_end {
        match store.get(&Key::from_u64(id)) {
            Ok(record) => sum += i64::from(record.int_value()),
            Err(e) if e.is_not_found() => warn!("Key {} was never created", id),
            Err(e) => return Err(e.into()),
        }
    }
    if sum != i64::try_from(totals.applied)? {
        bail!("lost updates: applied {} but store sums to {}", totals.applied, sum);
    }
    info!("Verified {} keys sum to {}", store.len(), sum);

    Ok(())
}
