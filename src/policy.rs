/// The policy of a cache, as it is in effect at the time of the call.
#[derive(Clone, Debug, PartialEq)]
pub struct Policy {
    capacity: i64,
    younger_size_fraction: f64,
    num_shards: usize,
    touch_buffer_capacity: usize,
    supports_resurrection: bool,
}

impl Policy {
    pub(crate) fn new(
        capacity: i64,
        younger_size_fraction: f64,
        num_shards: usize,
        touch_buffer_capacity: usize,
        supports_resurrection: bool,
    ) -> Self {
        Self {
            capacity,
            younger_size_fraction,
            num_shards,
            touch_buffer_capacity,
            supports_resurrection,
        }
    }

    /// Returns the current capacity of the cache.
    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    /// Returns the current share of the capacity reserved for the younger
    /// segment.
    pub fn younger_size_fraction(&self) -> f64 {
        self.younger_size_fraction
    }

    /// Returns the number of internal shards of the cache.
    pub fn num_shards(&self) -> usize {
        self.num_shards
    }

    /// Returns the number of touch buffer slots of each shard.
    pub fn touch_buffer_capacity(&self) -> usize {
        self.touch_buffer_capacity
    }

    /// Returns `true` if evicted values that are still alive can be relinked
    /// without recomputation.
    pub fn supports_resurrection(&self) -> bool {
        self.supports_resurrection
    }
}
