use std::sync::Arc;

/// The error delivered to everybody awaiting a value that was being inserted
/// into an [`AsyncSlruCache`][cache-struct], when that insertion did not
/// complete.
///
/// All awaiters of the same in-flight key receive clones of the same error, so
/// an [`Error::Insert`] carries the identical `Arc` for each of them.
///
/// [cache-struct]: ./slru/struct.AsyncSlruCache.html
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// The insert cookie was dropped, or cancelled, before a value was produced.
    #[error("cache item insertion aborted")]
    Canceled,

    /// The producer of the value failed and cancelled the insertion with this
    /// error.
    #[error(transparent)]
    Insert(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Wraps a producer failure so that it can be passed to
    /// [`InsertCookie::cancel`][cancel].
    ///
    /// [cancel]: ./slru/struct.InsertCookie.html#method.cancel
    pub fn insert<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Insert(Arc::new(error))
    }

    /// Returns `true` if the insertion was aborted rather than failed.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

impl From<Box<dyn std::error::Error + Send + Sync + 'static>> for Error {
    fn from(error: Box<dyn std::error::Error + Send + Sync + 'static>) -> Self {
        Self::Insert(Arc::from(error))
    }
}

/// The error type returned by [`SlruCacheConfig::validate`][validate].
///
/// [validate]: ./struct.SlruCacheConfig.html#method.validate
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("capacity must not be negative, got {0}")]
    NegativeCapacity(i64),

    #[error("younger_size_fraction must be within [0, 1], got {0}")]
    YoungerSizeFraction(f64),

    #[error("shard_count must be a non-zero power of two, got {0}")]
    ShardCount(usize),
}
