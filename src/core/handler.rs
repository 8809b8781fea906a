use std::sync::Arc;

use parking_lot::Mutex;

/// A scoped release token for a registered callback.
///
/// Acquiring one (via [`HandlerSlot::register`]) installs a callback;
/// dropping it removes that callback. Registrations are move-only — there is
/// no `Clone` impl — and safe to drop in any order, since dropping only ever
/// clears the slot it was given, never anything reachable through another
/// registration.
pub struct Registration {
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl Registration {
    fn new(unregister: impl FnOnce() + Send + 'static) -> Self {
        Registration { unregister: Some(Box::new(unregister)) }
    }

    /// A registration that does nothing on drop, for subjects with no slot
    /// to clear (e.g. a test double that never installed a handler).
    #[must_use]
    pub fn noop() -> Self {
        Registration { unregister: None }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration").finish_non_exhaustive()
    }
}

/// A single-callback slot: a subject holds at most one callback per
/// registration family, and registering a new one replaces the old one (the
/// old registration's `Drop` then becomes a no-op, since the slot it
/// referenced no longer holds it — see the generation guard below).
pub struct HandlerSlot<F: ?Sized> {
    inner: Arc<Mutex<Option<(u64, Arc<F>)>>>,
    generation: std::sync::atomic::AtomicU64,
}

impl<F: ?Sized + Send + Sync + 'static> HandlerSlot<F> {
    pub fn new() -> Self {
        HandlerSlot { inner: Arc::new(Mutex::new(None)), generation: std::sync::atomic::AtomicU64::new(0) }
    }

    /// Installs `handler`, replacing any previously registered handler, and
    /// returns a token that clears the slot on drop — but only if no newer
    /// registration has since replaced it.
    pub fn register(&self, handler: Arc<F>) -> Registration {
        let gen = self.generation.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        *self.inner.lock() = Some((gen, handler));

        let inner = self.inner.clone();
        Registration::new(move || {
            let mut slot = inner.lock();
            if matches!(&*slot, Some((g, _)) if *g == gen) {
                *slot = None;
            }
        })
    }

    /// Returns the currently registered handler, if any.
    pub fn get(&self) -> Option<Arc<F>> {
        self.inner.lock().as_ref().map(|(_, f)| f.clone())
    }
}

impl<F: ?Sized + Send + Sync + 'static> Default for HandlerSlot<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn register_then_drop_clears_slot() {
        let slot: HandlerSlot<dyn Fn() + Send + Sync> = HandlerSlot::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let reg = slot.register(Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        (slot.get().unwrap())();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        drop(reg);
        assert!(slot.get().is_none());
    }

    #[test]
    fn reregistration_replaces_and_stale_drop_is_a_noop() {
        let slot: HandlerSlot<dyn Fn() + Send + Sync> = HandlerSlot::new();
        let first = slot.register(Arc::new(|| {}));
        let _second = slot.register(Arc::new(|| {}));

        // Dropping the superseded registration must not clear the new one.
        drop(first);
        assert!(slot.get().is_some());
    }

    #[test]
    fn drop_order_is_irrelevant() {
        let slot_a: HandlerSlot<dyn Fn() + Send + Sync> = HandlerSlot::new();
        let slot_b: HandlerSlot<dyn Fn() + Send + Sync> = HandlerSlot::new();
        let ra = slot_a.register(Arc::new(|| {}));
        let rb = slot_b.register(Arc::new(|| {}));
        drop(ra);
        drop(rb);
        assert!(slot_a.get().is_none());
        assert!(slot_b.get().is_none());
    }
}
