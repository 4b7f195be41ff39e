use super::CacheStats;

use std::sync::atomic::{AtomicI64, Ordering};

use crossbeam_utils::{atomic::AtomicCell, CachePadded};

pub(crate) fn saturating_add(counter: &AtomicCell<u64>, value: u64) {
    let mut v0 = counter.load();
    loop {
        let v1 = v0.saturating_add(value);
        match counter.compare_exchange(v0, v1) {
            Ok(_) => break,
            Err(v2) => v0 = v2,
        }
    }
}

/// Monotonic counters and segment gauges shared by all shards of a cache.
///
/// The gauges are updated under the lock of the shard that changed, but they are
/// read without any lock, so a snapshot is only eventually consistent.
#[derive(Default)]
pub(crate) struct StatsCounter {
    sync_hit_count: CachePadded<AtomicCell<u64>>,
    async_hit_count: CachePadded<AtomicCell<u64>>,
    missed_count: CachePadded<AtomicCell<u64>>,
    sync_hit_weight: AtomicCell<u64>,
    async_hit_weight: AtomicCell<u64>,
    missed_weight: AtomicCell<u64>,
    younger_weight: AtomicI64,
    older_weight: AtomicI64,
    younger_size: AtomicI64,
    older_size: AtomicI64,
}

impl StatsCounter {
    pub(crate) fn record_sync_hit(&self, weight: i64) {
        saturating_add(&self.sync_hit_count, 1);
        saturating_add(&self.sync_hit_weight, non_negative(weight));
    }

    pub(crate) fn record_async_hit(&self) {
        saturating_add(&self.async_hit_count, 1);
    }

    pub(crate) fn record_async_hit_weight(&self, weight: i64) {
        saturating_add(&self.async_hit_weight, non_negative(weight));
    }

    pub(crate) fn record_miss(&self) {
        saturating_add(&self.missed_count, 1);
    }

    pub(crate) fn record_missed_weight(&self, weight: i64) {
        saturating_add(&self.missed_weight, non_negative(weight));
    }

    pub(crate) fn add_younger(&self, weight: i64, size: i64) {
        self.younger_weight.fetch_add(weight, Ordering::Relaxed);
        self.younger_size.fetch_add(size, Ordering::Relaxed);
    }

    pub(crate) fn add_older(&self, weight: i64, size: i64) {
        self.older_weight.fetch_add(weight, Ordering::Relaxed);
        self.older_size.fetch_add(size, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        stats
            .set_hit_counts(
                self.sync_hit_count.load(),
                self.async_hit_count.load(),
                self.missed_count.load(),
            )
            .set_hit_weights(
                self.sync_hit_weight.load(),
                self.async_hit_weight.load(),
                self.missed_weight.load(),
            )
            .set_gauges(
                self.younger_weight.load(Ordering::Relaxed),
                self.older_weight.load(Ordering::Relaxed),
                self.younger_size.load(Ordering::Relaxed),
                self.older_size.load(Ordering::Relaxed),
            );
        stats
    }
}

fn non_negative(weight: i64) -> u64 {
    weight.max(0) as u64
}
