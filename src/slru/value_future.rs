use std::{fmt, future::IntoFuture, sync::Arc};

use async_lock::OnceCell;
use futures_util::future::{BoxFuture, FutureExt};
use triomphe::Arc as TrioArc;

use crate::Error;

type Slot<V> = TrioArc<OnceCell<Result<Arc<V>, Error>>>;

/// The producing side of a [`ValueFuture`]. Set exactly once.
pub(crate) struct ValuePromise<V> {
    slot: Slot<V>,
}

impl<V> ValuePromise<V> {
    pub(crate) fn new() -> Self {
        Self {
            slot: TrioArc::new(OnceCell::new()),
        }
    }

    pub(crate) fn to_future(&self) -> ValueFuture<V> {
        ValueFuture {
            slot: TrioArc::clone(&self.slot),
        }
    }

    /// Publishes the result and wakes up every awaiter.
    ///
    /// Must be called without holding any shard lock.
    pub(crate) fn set(&self, result: Result<Arc<V>, Error>) {
        let already_set = self.slot.set_blocking(result).is_err();
        debug_assert!(!already_set, "A value promise was set twice");
    }
}

impl<V> Clone for ValuePromise<V> {
    fn clone(&self) -> Self {
        Self {
            slot: TrioArc::clone(&self.slot),
        }
    }
}

/// A handle to a value that is either already cached or still being produced by
/// the holder of an active [`InsertCookie`][cookie].
///
/// Any number of clones may be awaited concurrently. They all resolve to the same
/// value, or to the same [`Error`].
///
/// [cookie]: ./struct.InsertCookie.html
pub struct ValueFuture<V> {
    slot: Slot<V>,
}

impl<V> Clone for ValueFuture<V> {
    fn clone(&self) -> Self {
        Self {
            slot: TrioArc::clone(&self.slot),
        }
    }
}

impl<V> fmt::Debug for ValueFuture<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueFuture")
            .field("is_ready", &self.is_ready())
            .finish()
    }
}

impl<V> ValueFuture<V> {
    pub(crate) fn ready(value: Arc<V>) -> Self {
        let promise = ValuePromise::new();
        promise.set(Ok(value));
        promise.to_future()
    }

    /// Returns `true` if the result is available.
    pub fn is_ready(&self) -> bool {
        self.slot.is_initialized()
    }

    /// Returns the result if it is available, without waiting.
    pub fn try_get(&self) -> Option<Result<Arc<V>, Error>> {
        self.slot.get().cloned()
    }

    /// Waits for the result.
    pub async fn get(&self) -> Result<Arc<V>, Error> {
        self.slot.wait().await.clone()
    }

    /// Blocks the current thread until the result is available.
    ///
    /// Do not call this from an async task; `.await` the future instead.
    pub fn wait_blocking(&self) -> Result<Arc<V>, Error> {
        self.slot.wait_blocking().clone()
    }
}

impl<V> IntoFuture for ValueFuture<V>
where
    V: Send + Sync + 'static,
{
    type Output = Result<Arc<V>, Error>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.slot.wait().await.clone() }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::{ValueFuture, ValuePromise};
    use crate::Error;

    use std::sync::Arc;

    #[tokio::test]
    async fn all_awaiters_see_the_same_result() {
        let promise = ValuePromise::<String>::new();
        let f1 = promise.to_future();
        let f2 = f1.clone();
        assert!(!f1.is_ready());
        assert!(f1.try_get().is_none());

        let waiter = tokio::spawn(async move { f2.await });

        let value = Arc::new("ready".to_string());
        promise.set(Ok(Arc::clone(&value)));

        let v1 = f1.get().await.unwrap();
        let v2 = waiter.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&v1, &value));
        assert!(Arc::ptr_eq(&v2, &value));
        assert!(f1.is_ready());
    }

    #[test]
    fn errors_are_shared() {
        let promise = ValuePromise::<u32>::new();
        let future = promise.to_future();
        promise.set(Err(Error::insert(std::io::Error::new(
            std::io::ErrorKind::Other,
            "boom",
        ))));

        let (e1, e2) = match (future.wait_blocking(), future.try_get()) {
            (Err(Error::Insert(e1)), Some(Err(Error::Insert(e2)))) => (e1, e2),
            other => panic!("unexpected result: {other:?}"),
        };
        assert!(Arc::ptr_eq(&e1, &e2));
        assert_eq!(e1.to_string(), "boom");
    }

    #[test]
    fn ready_future() {
        let future = ValueFuture::ready(Arc::new(7));
        assert!(future.is_ready());
        assert_eq!(*future.wait_blocking().unwrap(), 7);
    }
}
