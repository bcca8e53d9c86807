use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Handlers<T> {
    next_id: u64,
    entries: Vec<(u64, Handler<T>)>,
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T> Detach for Mutex<Handlers<T>> {
    fn detach(&self, id: u64) {
        lock(self).entries.retain(|(entry_id, _)| *entry_id != id);
    }
}

/// Publish/subscribe fan-out for one kind of event.
///
/// Handlers run in subscription order on the emitting thread. The handler
/// list is snapshotted before delivery, so a handler may subscribe or
/// unsubscribe (itself included) while an emission is in progress.
pub struct Emitter<T> {
    handlers: Arc<Mutex<Handlers<T>>>,
}

impl<T: 'static> Emitter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut guard = lock(&self.handlers);
            guard.next_id += 1;
            let id = guard.next_id;
            guard.entries.push((id, Arc::new(handler)));
            id
        };
        let strong: Arc<dyn Detach> = self.handlers.clone();
        let target: Weak<dyn Detach> = Arc::downgrade(&strong);
        Subscription { target, id }
    }

    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Handler<T>> = lock(&self.handlers)
            .entries
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in snapshot {
            handler(value);
        }
    }

    /// Drops every handler. Outstanding [`Subscription`]s become no-ops.
    pub fn clear(&self) {
        lock(&self.handlers).entries.clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.handlers).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(Handlers {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("handlers", &lock(&self.handlers).entries.len())
            .finish()
    }
}

/// Handle returned by [`Emitter::subscribe`]. Dropping it keeps the handler
/// attached; call [`Subscription::unsubscribe`] to detach.
pub struct Subscription {
    target: Weak<dyn Detach>,
    id: u64,
}

impl Subscription {
    /// Detaches the handler. Safe to call more than once, and after the
    /// emitter itself is gone.
    pub fn unsubscribe(&self) {
        if let Some(target) = self.target.upgrade() {
            target.detach(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::Emitter;

    #[test]
    fn handlers_run_in_subscription_order() {
        let emitter = Emitter::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = seen.clone();
            emitter.subscribe(move |value| seen.lock().unwrap().push((tag, *value)));
        }

        emitter.emit(&7);

        assert_eq!(*seen.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn unsubscribe_detaches_only_that_handler() {
        let emitter = Emitter::<()>::new();
        let hits = Arc::new(Mutex::new(0));
        let kept = {
            let hits = hits.clone();
            emitter.subscribe(move |_| *hits.lock().unwrap() += 1)
        };
        let dropped = {
            let hits = hits.clone();
            emitter.subscribe(move |_| *hits.lock().unwrap() += 10)
        };

        dropped.unsubscribe();
        dropped.unsubscribe();
        emitter.emit(&());

        assert_eq!(*hits.lock().unwrap(), 1);
        assert_eq!(emitter.len(), 1);
        kept.unsubscribe();
        assert!(emitter.is_empty());
    }

    #[test]
    fn handler_may_unsubscribe_itself_during_emit() {
        let emitter = Arc::new(Emitter::<u8>::new());
        let slot: Arc<Mutex<Option<super::Subscription>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(Mutex::new(0));
        let subscription = {
            let slot = slot.clone();
            let hits = hits.clone();
            emitter.subscribe(move |_| {
                *hits.lock().unwrap() += 1;
                if let Some(own) = slot.lock().unwrap().as_ref() {
                    own.unsubscribe();
                }
            })
        };
        *slot.lock().unwrap() = Some(subscription);

        emitter.emit(&1);
        emitter.emit(&2);

        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn unsubscribe_after_emitter_dropped_is_noop() {
        let emitter = Emitter::<u8>::new();
        let subscription = emitter.subscribe(|_| {});
        drop(emitter);
        subscription.unsubscribe();
    }
}
