//! Replicated document model.
//!
//! A [`Doc`] is one replica of a shared document holding any number of named
//! arrays. Arrays are sequence CRDTs: every element has a stable [`ItemId`],
//! deletions leave tombstones, and replicas that exchange [`Update`]s converge
//! to the same order.
//!
//! All mutations happen inside a [`Transaction`]. When a transaction commits,
//! array observers receive one [`ArrayEvent`] per changed array, followed by a
//! [`TransactionSummary`] for after-transaction observers. Observers may start
//! new transactions; those are queued and delivered once the current delivery
//! has finished, so every observer sees transactions in commit order.

mod array;
pub mod errors;
mod events;
mod ids;
mod store;
mod transaction;
mod update;

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
    fmt,
    rc::Rc,
};

pub use array::ArrayRef;
pub use errors::DocError;
pub use events::{ArrayEvent, TransactionSummary};
pub use ids::{ClientId, DocId, ItemId, Origin, WriteSource};
use store::BlockStore;
use tracing::debug;
pub use transaction::Transaction;
use transaction::Committed;
pub use update::{StateVector, Update};

use crate::observable::{Observable, Subscription};

struct DocInternal<T> {
    id: DocId,
    store: RefCell<BlockStore<T>>,
    array_observers: RefCell<HashMap<String, Observable<ArrayEvent<T>>>>,
    after_transaction: Observable<TransactionSummary>,
    destroy_observers: Observable<DocId>,
    /// Committed transactions waiting to be delivered.
    pending: RefCell<VecDeque<Committed<T>>>,
    dispatching: Cell<bool>,
    destroyed: Cell<bool>,
}

/// One replica of a shared document.
///
/// `Doc` is a cheap handle; clones refer to the same replica.
pub struct Doc<T> {
    inner: Rc<DocInternal<T>>,
}

/// Resets the dispatching flag even if an observer panics.
struct DispatchGuard<'a>(&'a Cell<bool>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<T: Clone + 'static> Doc<T> {
    /// Creates an empty document with a random client id.
    pub fn new() -> Self {
        Self::with_client(ClientId::random())
    }

    /// Creates an empty document whose elements are attributed to `client`.
    pub fn with_client(client: ClientId) -> Self {
        Self {
            inner: Rc::new(DocInternal {
                id: DocId::new(),
                store: RefCell::new(BlockStore::new(client)),
                array_observers: RefCell::new(HashMap::new()),
                after_transaction: Observable::new(),
                destroy_observers: Observable::new(),
                pending: RefCell::new(VecDeque::new()),
                dispatching: Cell::new(false),
                destroyed: Cell::new(false),
            }),
        }
    }

    pub fn id(&self) -> DocId {
        self.inner.id
    }

    pub fn client(&self) -> ClientId {
        self.inner.store.borrow().client()
    }

    /// Returns the array called `name`, creating it if needed.
    pub fn get_array(&self, name: &str) -> ArrayRef<T> {
        self.inner.store.borrow_mut().ensure_sequence(name);
        ArrayRef::new(self.clone(), name)
    }

    /// Runs `f` in a local transaction without origin.
    pub fn transact<R>(&self, f: impl FnOnce(&mut Transaction<'_, T>) -> R) -> R {
        self.transact_inner(None, WriteSource::Local, f)
    }

    /// Runs `f` in a local transaction tagged with `origin`.
    pub fn transact_with<R>(
        &self,
        origin: impl Into<Origin>,
        f: impl FnOnce(&mut Transaction<'_, T>) -> R,
    ) -> R {
        self.transact_inner(Some(origin.into()), WriteSource::Local, f)
    }

    fn transact_inner<R>(
        &self,
        origin: Option<Origin>,
        source: WriteSource,
        f: impl FnOnce(&mut Transaction<'_, T>) -> R,
    ) -> R {
        let mut txn = Transaction::new(self, origin, source);
        let result = f(&mut txn);
        if let Some(committed) = txn.commit() {
            self.publish(committed);
        }
        result
    }

    /// Summary of every element this replica has seen.
    pub fn state_vector(&self) -> StateVector {
        self.inner.store.borrow().state_vector()
    }

    /// Encodes everything a peer with state `remote` is missing.
    pub fn encode_state_as_update(&self, remote: &StateVector) -> Update<T> {
        self.inner.store.borrow().encode_diff(remote)
    }

    /// Applies an update produced by another replica.
    pub fn apply_update(&self, update: &Update<T>) {
        self.apply_update_inner(update, None);
    }

    /// Applies an update produced by another replica, tagging the resulting
    /// transaction with `origin`.
    pub fn apply_update_with(&self, update: &Update<T>, origin: impl Into<Origin>) {
        self.apply_update_inner(update, Some(origin.into()));
    }

    fn apply_update_inner(&self, update: &Update<T>, origin: Option<Origin>) {
        self.transact_inner(origin, WriteSource::Remote, |txn| {
            let applied = txn.store_mut().apply(update);
            debug!(
                doc = %self.inner.id,
                inserted = applied.inserted.len(),
                deleted = applied.deleted.len(),
                "Applied remote update"
            );
            txn.record_inserted(applied.inserted);
            txn.record_deleted(applied.deleted);
        });
    }

    /// Calls `f` after every committed transaction that changed something.
    pub fn observe_after_transaction<F>(&self, f: F) -> Subscription
    where
        F: Fn(&TransactionSummary) + 'static,
    {
        self.inner.after_transaction.subscribe(f)
    }

    /// Calls `f` once when the document is destroyed.
    pub fn observe_destroy<F>(&self, f: F) -> Subscription
    where
        F: Fn(&DocId) + 'static,
    {
        self.inner.destroy_observers.subscribe(f)
    }

    /// Notifies destroy observers and drops every observer of this document.
    pub fn destroy(&self) {
        if self.inner.destroyed.replace(true) {
            return;
        }
        debug!(doc = %self.inner.id, "Destroying document");
        self.inner.destroy_observers.emit(&self.inner.id);
        self.inner.destroy_observers.clear();
        self.inner.after_transaction.clear();
        let observers = std::mem::take(&mut *self.inner.array_observers.borrow_mut());
        for observable in observers.values() {
            observable.clear();
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// Returns true if both handles refer to the same replica.
    pub fn ptr_eq(&self, other: &Doc<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn array_observers(&self, name: &str) -> Observable<ArrayEvent<T>> {
        self.inner
            .array_observers
            .borrow_mut()
            .entry(name.to_owned())
            .or_default()
            .clone()
    }

    fn publish(&self, committed: Committed<T>) {
        self.inner.pending.borrow_mut().push_back(committed);
        if self.inner.dispatching.replace(true) {
            return;
        }
        let _guard = DispatchGuard(&self.inner.dispatching);
        loop {
            let next = self.inner.pending.borrow_mut().pop_front();
            let Some(committed) = next else {
                break;
            };
            self.dispatch(committed);
        }
    }

    fn dispatch(&self, committed: Committed<T>) {
        for event in &committed.events {
            let observers = self.inner.array_observers.borrow().get(&event.target).cloned();
            if let Some(observers) = observers {
                observers.emit(event);
            }
        }
        self.inner.after_transaction.emit(&committed.summary);
    }
}

impl<T: Clone + 'static> Default for Doc<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Doc<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Doc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Doc")
            .field("id", &self.inner.id)
            .field("destroyed", &self.inner.destroyed.get())
            .finish()
    }
}
