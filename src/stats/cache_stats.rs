use std::{
    fmt::{self, Debug},
    ops::Add,
};

/// Statistics about the performance of a cache.
///
/// Cache statistics are incremented according to the following rules:
///
/// - When a lookup finds an entry whose value is already available,
///   `sync_hit_count` is incremented and the entry weight is added to
///   `sync_hit_weight`.
/// - When a lookup finds an entry whose value is still being computed by
///   somebody else, `async_hit_count` is incremented. Once the value arrives,
///   its weight (multiplied by the number of such joiners) is added to
///   `async_hit_weight`.
/// - When a lookup finds nothing, `missed_count` is incremented. The weight of
///   the value inserted afterwards is added to `missed_weight`. A later weight
///   growth of a cached value is also added to `missed_weight`, since it means a
///   part of the value was missing.
///
/// The four gauges (`younger_weight`, `older_weight`, `younger_size` and
/// `older_size`) describe the LRU segments at the time of the snapshot.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    sync_hit_count: u64,
    async_hit_count: u64,
    missed_count: u64,
    sync_hit_weight: u64,
    async_hit_weight: u64,
    missed_weight: u64,
    younger_weight: i64,
    older_weight: i64,
    younger_size: i64,
    older_size: i64,
}

impl Debug for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStats")
            .field("request_count", &self.request_count())
            .field("sync_hit_count", &self.sync_hit_count)
            .field("async_hit_count", &self.async_hit_count)
            .field("hit_rate", &self.hit_rate())
            .field("missed_count", &self.missed_count)
            .field("miss_rate", &self.miss_rate())
            .field("sync_hit_weight", &self.sync_hit_weight)
            .field("async_hit_weight", &self.async_hit_weight)
            .field("missed_weight", &self.missed_weight)
            .field("younger_weight", &self.younger_weight)
            .field("older_weight", &self.older_weight)
            .field("younger_size", &self.younger_size)
            .field("older_size", &self.older_size)
            .finish()
    }
}

impl CacheStats {
    pub(crate) fn set_hit_counts(
        &mut self,
        sync_hit_count: u64,
        async_hit_count: u64,
        missed_count: u64,
    ) -> &mut Self {
        self.sync_hit_count = sync_hit_count;
        self.async_hit_count = async_hit_count;
        self.missed_count = missed_count;
        self
    }

    pub(crate) fn set_hit_weights(
        &mut self,
        sync_hit_weight: u64,
        async_hit_weight: u64,
        missed_weight: u64,
    ) -> &mut Self {
        self.sync_hit_weight = sync_hit_weight;
        self.async_hit_weight = async_hit_weight;
        self.missed_weight = missed_weight;
        self
    }

    pub(crate) fn set_gauges(
        &mut self,
        younger_weight: i64,
        older_weight: i64,
        younger_size: i64,
        older_size: i64,
    ) -> &mut Self {
        self.younger_weight = younger_weight;
        self.older_weight = older_weight;
        self.younger_size = younger_size;
        self.older_size = older_size;
        self
    }

    pub fn request_count(&self) -> u64 {
        self.hit_count().saturating_add(self.missed_count)
    }

    /// Returns the sum of the sync and async hit counts.
    pub fn hit_count(&self) -> u64 {
        self.sync_hit_count.saturating_add(self.async_hit_count)
    }

    pub fn hit_rate(&self) -> f64 {
        let req_count = self.request_count();
        if req_count == 0 {
            1.0
        } else {
            self.hit_count() as f64 / req_count as f64
        }
    }

    pub fn miss_rate(&self) -> f64 {
        let req_count = self.request_count();
        if req_count == 0 {
            0.0
        } else {
            self.missed_count as f64 / req_count as f64
        }
    }

    pub fn sync_hit_count(&self) -> u64 {
        self.sync_hit_count
    }

    pub fn async_hit_count(&self) -> u64 {
        self.async_hit_count
    }

    pub fn missed_count(&self) -> u64 {
        self.missed_count
    }

    pub fn sync_hit_weight(&self) -> u64 {
        self.sync_hit_weight
    }

    pub fn async_hit_weight(&self) -> u64 {
        self.async_hit_weight
    }

    pub fn missed_weight(&self) -> u64 {
        self.missed_weight
    }

    pub fn younger_weight(&self) -> i64 {
        self.younger_weight
    }

    pub fn older_weight(&self) -> i64 {
        self.older_weight
    }

    pub fn younger_size(&self) -> i64 {
        self.younger_size
    }

    pub fn older_size(&self) -> i64 {
        self.older_size
    }

    /// Returns the total weight of all linked entries.
    pub fn weight(&self) -> i64 {
        self.younger_weight + self.older_weight
    }
}

/// Adds the counters of two snapshots, e.g. of two caches feeding the same
/// dashboard.
impl Add for &CacheStats {
    type Output = CacheStats;

    fn add(self, rhs: Self) -> Self::Output {
        CacheStats {
            sync_hit_count: self.sync_hit_count.saturating_add(rhs.sync_hit_count),
            async_hit_count: self.async_hit_count.saturating_add(rhs.async_hit_count),
            missed_count: self.missed_count.saturating_add(rhs.missed_count),
            sync_hit_weight: self.sync_hit_weight.saturating_add(rhs.sync_hit_weight),
            async_hit_weight: self.async_hit_weight.saturating_add(rhs.async_hit_weight),
            missed_weight: self.missed_weight.saturating_add(rhs.missed_weight),
            younger_weight: self.younger_weight + rhs.younger_weight,
            older_weight: self.older_weight + rhs.older_weight,
            younger_size: self.younger_size + rhs.younger_size,
            older_size: self.older_size + rhs.older_size,
        }
    }
}
