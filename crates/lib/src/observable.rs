//! Synchronous event fan-out.
//!
//! [`Observable`] holds a list of callbacks for one event type. Emitting an
//! event snapshots the callback list first, so callbacks may subscribe,
//! unsubscribe or emit again while they run. Every subscription is owned by a
//! [`Subscription`] guard that removes the callback when dropped.

use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

type Callback<E> = Rc<dyn Fn(&E)>;

struct Listeners<E> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<E>)>,
}

/// A list of callbacks interested in events of type `E`.
///
/// Cloning an `Observable` yields another handle to the same list.
pub struct Observable<E> {
    listeners: Rc<RefCell<Listeners<E>>>,
}

impl<E: 'static> Observable<E> {
    /// Creates an observable with no subscribers.
    pub fn new() -> Self {
        Self {
            listeners: Rc::new(RefCell::new(Listeners {
                next_id: 0,
                callbacks: Vec::new(),
            })),
        }
    }

    /// Registers `callback` and returns the guard that keeps it registered.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + 'static,
    {
        let id = {
            let mut listeners = self.listeners.borrow_mut();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.callbacks.push((id, Rc::new(callback)));
            id
        };
        let weak: Weak<RefCell<Listeners<E>>> = Rc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = weak.upgrade() {
                listeners
                    .borrow_mut()
                    .callbacks
                    .retain(|(callback_id, _)| *callback_id != id);
            }
        })
    }

    /// Calls every currently registered callback with `event`.
    pub fn emit(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = self
            .listeners
            .borrow()
            .callbacks
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }

    /// Drops every registered callback. Outstanding guards become no-ops.
    pub fn clear(&self) {
        self.listeners.borrow_mut().callbacks.clear();
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.listeners.borrow().callbacks.len()
    }

    /// Returns true if nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: 'static> Default for Observable<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Observable<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: Rc::clone(&self.listeners),
        }
    }
}

impl<E> fmt::Debug for Observable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("subscribers", &self.listeners.borrow().callbacks.len())
            .finish()
    }
}

/// Guard returned by every `observe*`/`subscribe` call.
///
/// Dropping it unsubscribes the callback.
#[must_use = "dropping a Subscription unsubscribes its callback"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
