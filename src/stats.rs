//! Hit/miss counters and segment gauges of a cache.

mod cache_stats;
mod stats_counter;

pub use cache_stats::CacheStats;
pub(crate) use stats_counter::StatsCounter;
