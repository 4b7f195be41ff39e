use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::notification::{AddedListener, RemovalCause, RemovalListener};

/// Delivers the `on_added` and `on_removed` notifications of a cache.
///
/// Listeners are user code, so they are always called without holding any shard
/// lock. A listener that panics is disabled for the rest of the cache lifetime.
pub(crate) struct Notifier<V> {
    added: Option<Listener<AddedListener<V>>>,
    removed: Option<Listener<RemovalListener<V>>>,
    #[cfg(feature = "logging")]
    cache_name: Option<String>,
}

struct Listener<L> {
    listener: L,
    is_enabled: AtomicBool,
}

impl<L> Listener<L> {
    fn new(listener: L) -> Self {
        Self {
            listener,
            is_enabled: AtomicBool::new(true),
        }
    }
}

impl<V> Notifier<V> {
    pub(crate) fn new(
        added: Option<AddedListener<V>>,
        removed: Option<RemovalListener<V>>,
        _cache_name: Option<String>,
    ) -> Self {
        Self {
            added: added.map(Listener::new),
            removed: removed.map(Listener::new),
            #[cfg(feature = "logging")]
            cache_name: _cache_name,
        }
    }

    pub(crate) fn notify_added(&self, value: &Arc<V>) {
        if let Some(l) = &self.added {
            self.call(l, || (l.listener)(value), "on_added");
        }
    }

    pub(crate) fn notify_removed(&self, value: &Arc<V>, cause: RemovalCause) {
        if let Some(l) = &self.removed {
            self.call(l, || (l.listener)(value, cause), "on_removed");
        }
    }

    fn call<L>(&self, l: &Listener<L>, f: impl FnOnce(), _listener_name: &str) {
        use std::panic::{catch_unwind, AssertUnwindSafe};

        if !l.is_enabled.load(Ordering::Acquire) {
            return;
        }

        // Safety: It is safe to assert unwind safety here because we will not
        // call the listener again if it has been panicked.
        let result = catch_unwind(AssertUnwindSafe(f));
        if let Err(_payload) = result {
            l.is_enabled.store(false, Ordering::Release);
            #[cfg(feature = "logging")]
            log_panic(&*_payload, self.cache_name.as_deref(), _listener_name);
        }
    }
}

#[cfg(feature = "logging")]
fn log_panic(
    payload: &(dyn std::any::Any + Send + 'static),
    cache_name: Option<&str>,
    listener_name: &str,
) {
    // Try to downcast the payload into &str or String.
    //
    // NOTE: Clippy will complain if we use `if let Some(_)` here.
    // https://rust-lang.github.io/rust-clippy/master/index.html#manual_map
    let message: Option<std::borrow::Cow<'_, str>> =
        (payload.downcast_ref::<&str>().map(|s| (*s).into()))
            .or_else(|| payload.downcast_ref::<String>().map(Into::into));

    let cn = cache_name
        .map(|name| format!("[{name}] "))
        .unwrap_or_default();

    if let Some(m) = message {
        log::error!("{cn}Disabled the {listener_name} listener because it panicked at '{m}'");
    } else {
        log::error!("{cn}Disabled the {listener_name} listener because it panicked");
    }
}
