//! Observer registry shared by the connectivity monitor and the sync engine.
//!
//! Listeners are plain callbacks. A listener that panics is caught and
//! logged, and the remaining listeners are still notified.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::error;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    listeners: Vec<(u64, Listener<E>)>,
    disposed: bool,
}

/// A set of callbacks notified with events of type `E`.
pub struct ListenerRegistry<E> {
    inner: Arc<Mutex<Registry<E>>>,
}

impl<E> Clone for ListenerRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
                disposed: false,
            })),
        }
    }
}

fn lock<E>(registry: &Mutex<Registry<E>>) -> MutexGuard<'_, Registry<E>> {
    // A poisoned registry still holds a valid listener list
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<E: 'static> ListenerRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`. Adding to a disposed registry returns an inert handle.
    pub fn add<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.inner);
        if registry.disposed {
            return Subscription::inert();
        }

        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));

        let weak: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.inner);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    lock(&inner).listeners.retain(|(lid, _)| *lid != id);
                }
            })),
        }
    }

    /// Call every listener with `event`. Returns how many completed without panicking.
    pub fn notify(&self, event: &E) -> usize {
        // Snapshot the list so listeners may (un)subscribe while being called
        let listeners: Vec<Listener<E>> = lock(&self.inner)
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        let mut delivered = 0;
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(_) => error!("Listener panicked while handling event"),
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every listener and refuse new ones.
    pub fn dispose(&self) {
        let mut registry = lock(&self.inner);
        registry.listeners.clear();
        registry.disposed = true;
    }
}

/// Handle returned by `ListenerRegistry::add`.
///
/// Dropping the handle keeps the listener registered; call `unsubscribe`
/// to remove it. Unsubscribing twice, or after the registry was disposed
/// or dropped, does nothing.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn inert() -> Self {
        Self { detach: None }
    }

    pub fn unsubscribe(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notify_reaches_all_listeners() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let total = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let total = Arc::clone(&total);
            registry.add(move |n: &u32| {
                total.fetch_add(*n as usize, Ordering::SeqCst);
            });
        }

        assert_eq!(registry.notify(&2), 3);
        assert_eq!(total.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let registry: ListenerRegistry<()> = ListenerRegistry::new();
        let seen = Arc::new(AtomicUsize::new(0));

        registry.add(|_| panic!("listener bug"));
        let counter = Arc::clone(&seen);
        registry.add(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(registry.notify(&()), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let registry: ListenerRegistry<()> = ListenerRegistry::new();
        let mut sub = registry.add(|_| {});
        registry.add(|_| {});
        assert_eq!(registry.len(), 2);

        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unsubscribe_after_dispose_is_noop() {
        let registry: ListenerRegistry<()> = ListenerRegistry::new();
        let mut sub = registry.add(|_| {});
        registry.dispose();
        sub.unsubscribe();
        assert!(registry.is_empty());

        let mut late = registry.add(|_| {});
        assert!(registry.is_empty());
        late.unsubscribe();
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let registry: ListenerRegistry<()> = ListenerRegistry::new();
        let mut sub = registry.add(|_| {});
        drop(registry);
        sub.unsubscribe();
    }
}
