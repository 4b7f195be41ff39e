use crate::common::error::ConfigError;

pub(crate) const DEFAULT_YOUNGER_SIZE_FRACTION: f64 = 0.25;
pub(crate) const DEFAULT_SHARD_COUNT: usize = 16;
pub(crate) const DEFAULT_TOUCH_BUFFER_CAPACITY: usize = 65_536;

/// Static configuration of an [`AsyncSlruCache`][cache-struct].
///
/// [cache-struct]: ./slru/struct.AsyncSlruCache.html
#[derive(Clone, Debug, PartialEq)]
pub struct SlruCacheConfig {
    /// The maximum total weight of the linked entries.
    pub capacity: i64,
    /// The share of `capacity` reserved for the younger segment. Items in the
    /// older segment may use at most `capacity * (1 - younger_size_fraction)`.
    pub younger_size_fraction: f64,
    /// The number of shards. Must be a power of two.
    pub shard_count: usize,
    /// The total number of touch buffer slots, split evenly across the shards.
    pub touch_buffer_capacity: usize,
}

impl Default for SlruCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 0,
            younger_size_fraction: DEFAULT_YOUNGER_SIZE_FRACTION,
            shard_count: DEFAULT_SHARD_COUNT,
            touch_buffer_capacity: DEFAULT_TOUCH_BUFFER_CAPACITY,
        }
    }
}

impl SlruCacheConfig {
    pub fn with_capacity(capacity: i64) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Checks the configuration without panicking.
    ///
    /// [`CacheBuilder::build`][build] performs the same checks and panics on
    /// failure.
    ///
    /// [build]: ./slru/struct.CacheBuilder.html#method.build
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity < 0 {
            return Err(ConfigError::NegativeCapacity(self.capacity));
        }
        validate_younger_size_fraction(self.younger_size_fraction)?;
        if !self.shard_count.is_power_of_two() {
            return Err(ConfigError::ShardCount(self.shard_count));
        }
        Ok(())
    }

    pub(crate) fn touch_buffer_capacity_per_shard(&self) -> usize {
        self.touch_buffer_capacity / self.shard_count
    }
}

/// Overrides applied by [`AsyncSlruCache::reconfigure`][reconfigure].
///
/// A `None` field falls back to the value of the static [`SlruCacheConfig`] the
/// cache was built with.
///
/// [reconfigure]: ./slru/struct.AsyncSlruCache.html#method.reconfigure
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlruCacheDynamicConfig {
    pub capacity: Option<i64>,
    pub younger_size_fraction: Option<f64>,
}

impl SlruCacheDynamicConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(capacity) = self.capacity {
            if capacity < 0 {
                return Err(ConfigError::NegativeCapacity(capacity));
            }
        }
        if let Some(fraction) = self.younger_size_fraction {
            validate_younger_size_fraction(fraction)?;
        }
        Ok(())
    }
}

fn validate_younger_size_fraction(fraction: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&fraction) {
        Ok(())
    } else {
        Err(ConfigError::YoungerSizeFraction(fraction))
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, SlruCacheConfig, SlruCacheDynamicConfig};

    #[test]
    fn default_config() {
        let config = SlruCacheConfig::default();
        assert_eq!(config.capacity, 0);
        assert_eq!(config.shard_count, 16);
        assert_eq!(config.touch_buffer_capacity_per_shard(), 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = SlruCacheConfig::with_capacity(-1);
        assert_eq!(config.validate(), Err(ConfigError::NegativeCapacity(-1)));

        config.capacity = 100;
        config.younger_size_fraction = 1.5;
        assert_eq!(
            config.validate(),
            Err(ConfigError::YoungerSizeFraction(1.5))
        );

        config.younger_size_fraction = 0.5;
        for shard_count in [0, 3, 6, 100] {
            config.shard_count = shard_count;
            assert_eq!(config.validate(), Err(ConfigError::ShardCount(shard_count)));
        }

        config.shard_count = 64;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn dynamic_config() {
        assert!(SlruCacheDynamicConfig::default().validate().is_ok());

        let config = SlruCacheDynamicConfig {
            capacity: Some(-5),
            younger_size_fraction: None,
        };
        assert_eq!(config.validate(), Err(ConfigError::NegativeCapacity(-5)));

        let config = SlruCacheDynamicConfig {
            capacity: Some(10),
            younger_size_fraction: Some(-0.1),
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::YoungerSizeFraction(-0.1))
        );
    }
}
