//! Once-signalable cancellation capability.
//!
//! A [`CancelSource`] owns the signal; [`CancelToken`]s are cheap observers
//! handed to promises. Registered callbacks run exactly once, on the thread
//! that signals, and can be revoked by dropping their [`Registration`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::sync::lock;

type Callback = Box<dyn FnOnce() + Send>;

struct Inner {
    signaled: AtomicBool,
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, Callback)>>,
}

/// The signaling half. Dropping the source without calling
/// [`cancel`](CancelSource::cancel) leaves all tokens unsignaled forever.
pub struct CancelSource {
    inner: Arc<Inner>,
}

/// An observer of a [`CancelSource`]. The default token can never be
/// signaled.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Option<Arc<Inner>>,
}

/// A registered cancellation callback. Dropping the registration revokes the
/// callback if it has not run yet.
pub struct Registration {
    inner: Weak<Inner>,
    id: u64,
}

impl CancelSource {
    #[must_use]
    pub fn new() -> CancelSource {
        CancelSource {
            inner: Arc::new(Inner {
                signaled: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns a token observing this source.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        CancelToken {
            inner: Some(self.inner.clone()),
        }
    }

    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.inner.signaled.load(Ordering::Acquire)
    }

    /// Signals the source and runs every registered callback. Signaling more
    /// than once is a no-op.
    pub fn cancel(&self) {
        if self.inner.signaled.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("cancellation source signaled");
        // the callbacks are drained under the lock but run outside of it, so
        // a callback may register or revoke other callbacks freely.
        let callbacks = std::mem::take(&mut *lock(&self.inner.callbacks));
        for (_, callback) in callbacks {
            callback();
        }
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        CancelSource::new()
    }
}

impl CancelToken {
    /// A token that can never be signaled.
    #[must_use]
    pub const fn none() -> CancelToken {
        CancelToken { inner: None }
    }

    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|inner| inner.signaled.load(Ordering::Acquire))
    }

    /// Whether this token is attached to a source at all.
    #[must_use]
    pub fn can_be_signaled(&self) -> bool {
        self.inner.is_some()
    }

    /// Registers a callback to run when the source signals. If the source is
    /// already signaled the callback runs inline before this returns. The
    /// returned registration revokes the callback when dropped.
    pub fn register(&self, callback: impl FnOnce() + Send + 'static) -> Registration {
        let Some(inner) = &self.inner else {
            return Registration::inert();
        };
        if inner.signaled.load(Ordering::Acquire) {
            callback();
            return Registration::inert();
        }
        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&inner.callbacks).push((id, Box::new(callback)));
        // the source may have signaled while we were pushing; drain our own
        // entry so the callback still runs exactly once.
        if inner.signaled.load(Ordering::Acquire) {
            let entry = {
                let mut callbacks = lock(&inner.callbacks);
                callbacks
                    .iter()
                    .position(|(entry, _)| *entry == id)
                    .map(|index| callbacks.remove(index))
            };
            if let Some((_, callback)) = entry {
                callback();
            }
            return Registration::inert();
        }
        Registration {
            inner: Arc::downgrade(inner),
            id,
        }
    }
}

impl Registration {
    fn inert() -> Registration {
        Registration {
            inner: Weak::new(),
            id: 0,
        }
    }

    /// Revokes the callback. Equivalent to dropping the registration.
    pub fn dispose(self) {}
}

impl Drop for Registration {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut callbacks = lock(&inner.callbacks);
        if let Some(index) = callbacks.iter().position(|(id, _)| *id == self.id) {
            callbacks.remove(index);
        }
    }
}
