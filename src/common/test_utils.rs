use std::sync::{
    atomic::{AtomicI64, AtomicU32, Ordering},
    Arc,
};

use crate::{AsyncCacheValue, ValueBase};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    added: AtomicU32,
    evicted: AtomicU32,
    removed: AtomicU32,
    value_dropped: AtomicU32,
}

impl Counters {
    pub(crate) fn added(&self) -> u32 {
        self.added.load(Ordering::Acquire)
    }

    pub(crate) fn evicted(&self) -> u32 {
        self.evicted.load(Ordering::Acquire)
    }

    pub(crate) fn removed(&self) -> u32 {
        self.removed.load(Ordering::Acquire)
    }

    pub(crate) fn value_dropped(&self) -> u32 {
        self.value_dropped.load(Ordering::Acquire)
    }

    pub(crate) fn incl_added(&self) {
        self.added.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn incl_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn incl_removed(&self) {
        self.removed.fetch_add(1, Ordering::AcqRel);
    }
}

/// A cacheable value with a mutable weight.
#[derive(Debug)]
pub(crate) struct Blob {
    base: ValueBase<String>,
    weight: AtomicI64,
    counters: Option<Arc<Counters>>,
}

impl Blob {
    pub(crate) fn new(key: &str) -> Arc<Self> {
        Self::with_weight(key, 1)
    }

    pub(crate) fn with_weight(key: &str, weight: i64) -> Arc<Self> {
        Arc::new(Self {
            base: ValueBase::new(key.to_string()),
            weight: AtomicI64::new(weight),
            counters: None,
        })
    }

    pub(crate) fn counted(key: &str, counters: &Arc<Counters>) -> Arc<Self> {
        Arc::new(Self {
            base: ValueBase::new(key.to_string()),
            weight: AtomicI64::new(1),
            counters: Some(Arc::clone(counters)),
        })
    }

    pub(crate) fn weight(&self) -> i64 {
        self.weight.load(Ordering::Acquire)
    }

    pub(crate) fn set_weight(&self, weight: i64) {
        self.weight.store(weight, Ordering::Release);
    }
}

impl AsyncCacheValue for Blob {
    type Key = String;

    fn value_base(&self) -> &ValueBase<String> {
        &self.base
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        if let Some(counters) = &self.counters {
            counters.value_dropped.fetch_add(1, Ordering::AcqRel);
        }
    }
}
