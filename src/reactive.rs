//! Push-based observable values.
//!
//! DESIGN
//! ======
//! An [`Observable`] holds the current value and a list of subscriber
//! callbacks. Every `set`/`update` stores the new value and then calls each
//! subscriber synchronously, before returning. New subscribers receive the
//! current value immediately.
//!
//! No lock is held while subscribers run: the callback list is snapshotted
//! first. A subscriber that mutates the same observable from inside its
//! callback therefore triggers a nested publish instead of a deadlock.
//! Consumers should avoid doing that, but the observable does not forbid it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    value: Mutex<T>,
    subscribers: Mutex<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
}

/// Shared handle to an observable value. Clones observe the same value.
pub struct Observable<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Default + Clone + Send + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = self.inner.value.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Observable").field("value", &*value).finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> Observable<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: Mutex::new(value),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Snapshot of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Borrow the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.inner.value.lock().unwrap_or_else(PoisonError::into_inner);
        f(&value)
    }

    /// Replace the value and publish it to every subscriber.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.lock().unwrap_or_else(PoisonError::into_inner);
            *current = value;
        }
        self.publish();
    }

    /// Mutate the value in place, then publish the result.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let out = {
            let mut current = self.inner.value.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut current)
        };
        self.publish();
        out
    }

    /// Register `callback`. It runs once right away with the current value
    /// and again after every change until the returned guard is dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: Callback<T> = Arc::new(callback);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::clone(&callback)));

        let current = self.get();
        callback(&current);

        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .subscribers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(sub_id, _)| *sub_id != id);
            }
        })
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn publish(&self) {
        let callbacks: Vec<Callback<T>> = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        if callbacks.is_empty() {
            return;
        }
        let value = self.get();
        for callback in callbacks {
            callback(&value);
        }
    }
}

/// Guard returned by [`Observable::subscribe`]; unsubscribes on drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    /// Keep the subscription alive for the lifetime of the observable.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "reactive_test.rs"]
mod tests;
