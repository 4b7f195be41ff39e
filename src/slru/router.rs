use std::hash::{BuildHasher, Hash, Hasher};

/// Maps keys to shards by masking the low bits of their hashes.
pub(crate) struct ShardRouter<S> {
    build_hasher: S,
    mask: usize,
}

impl<S: BuildHasher> ShardRouter<S> {
    /// # Panics
    ///
    /// Panics if `shard_count` is not a power of two.
    pub(crate) fn new(build_hasher: S, shard_count: usize) -> Self {
        assert!(
            shard_count.is_power_of_two(),
            "shard_count must be a power of two, got {shard_count}"
        );
        Self {
            build_hasher,
            mask: shard_count - 1,
        }
    }

    #[inline]
    pub(crate) fn hash<K: Hash + ?Sized>(&self, key: &K) -> u64 {
        let mut hasher = self.build_hasher.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[inline]
    pub(crate) fn shard_index<K: Hash + ?Sized>(&self, key: &K) -> usize {
        self.hash(key) as usize & self.mask
    }

    pub(crate) fn shard_count(&self) -> usize {
        self.mask + 1
    }
}

#[cfg(test)]
mod tests {
    use super::ShardRouter;

    use std::collections::hash_map::RandomState;

    #[test]
    fn single_shard() {
        let router = ShardRouter::new(RandomState::new(), 1);
        assert_eq!(router.shard_count(), 1);
        for key in 0..100u32 {
            assert_eq!(router.shard_index(&key), 0);
        }
    }

    #[test]
    fn indexes_are_stable_and_in_range() {
        let router = ShardRouter::new(RandomState::new(), 8);
        let mut seen = [false; 8];
        for key in 0..1_000u32 {
            let index = router.shard_index(&key);
            assert!(index < 8);
            assert_eq!(index, router.shard_index(&key));
            seen[index] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    #[should_panic(expected = "shard_count must be a power of two")]
    fn rejects_non_power_of_two() {
        ShardRouter::new(RandomState::new(), 12);
    }
}
