//! Shared setup for the integration tests.

use std::{cell::RefCell, rc::Rc};

use concord::{
    Doc, KeyValue, Subscription, UndoOptions,
    doc::ClientId,
    kv::{Change, ChangeEvent, Entry},
};

/// A document holding key-value entries with string values.
pub type KvDoc = Doc<Entry<String>>;

/// Creates a replica with a fixed client id so concurrent inserts resolve
/// the same way on every run.
pub fn replica<T: Clone + 'static>(client: u64) -> Doc<T> {
    Doc::with_client(ClientId::new(client))
}

/// Creates a replica together with a key-value view over its "kv" array.
pub fn kv_replica(client: u64) -> (KvDoc, KeyValue<String>) {
    let doc = replica(client);
    let kv = KeyValue::new(doc.get_array("kv")).expect("Failed to create key-value view");
    (doc, kv)
}

/// Sends everything `from` has that `to` is missing.
pub fn sync_into<T: Clone + 'static>(from: &Doc<T>, to: &Doc<T>) {
    to.apply_update(&from.encode_state_as_update(&to.state_vector()));
}

/// Exchanges updates until both replicas have seen each other's changes,
/// including deletions made in reaction to the first exchange.
pub fn sync_both<T: Clone + 'static>(a: &Doc<T>, b: &Doc<T>) {
    for _ in 0..2 {
        let to_b = a.encode_state_as_update(&b.state_vector());
        let to_a = b.encode_state_as_update(&a.state_vector());
        b.apply_update(&to_b);
        a.apply_update(&to_a);
    }
}

/// Undo options that never merge consecutive edits.
pub fn unmerged_options() -> UndoOptions {
    UndoOptions::default().with_capture_timeout(0)
}

/// Records every change event of a key-value view.
pub struct ChangeLog<V> {
    events: Rc<RefCell<Vec<ChangeEvent<V>>>>,
    _subscription: Subscription,
}

impl<V: Clone + 'static> ChangeLog<V> {
    pub fn attach(kv: &KeyValue<V>) -> Self {
        let events: Rc<RefCell<Vec<ChangeEvent<V>>>> = Rc::default();
        let subscription = {
            let events = Rc::clone(&events);
            kv.observe(move |event| events.borrow_mut().push(event.clone()))
        };
        Self {
            events,
            _subscription: subscription,
        }
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn events(&self) -> Vec<ChangeEvent<V>> {
        self.events.borrow().clone()
    }

    /// The change of `key` in the most recent event.
    pub fn last(&self, key: &str) -> Option<Change<V>> {
        self.events
            .borrow()
            .last()
            .and_then(|event| event.get(key).cloned())
    }
}

/// Collects events of any cloneable type.
pub struct Recorder<E> {
    events: Rc<RefCell<Vec<E>>>,
}

impl<E: Clone + 'static> Recorder<E> {
    pub fn new() -> Self {
        Self {
            events: Rc::default(),
        }
    }

    /// A callback that appends to this recorder.
    pub fn callback(&self) -> impl Fn(&E) + 'static {
        let events = Rc::clone(&self.events);
        move |event: &E| events.borrow_mut().push(event.clone())
    }

    pub fn events(&self) -> Vec<E> {
        self.events.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }
}
