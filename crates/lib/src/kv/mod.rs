//! Compacting key-value view over a replicated array.
//!
//! A [`KeyValue`] stores `{key, val}` entries in an array and treats the
//! rightmost entry of each key as its current value. Writing a key appends a
//! new entry and deletes the old one, so frequently updated keys do not leave
//! history behind the way a replicated map would.
//!
//! Entries written concurrently by other replicas can leave several entries
//! for one key. After every change of the array the view runs a
//! reconciliation pass that keeps the rightmost entry, deletes the others and
//! reports the net change of each key as a [`ChangeEvent`].

mod reconcile;

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    rc::{Rc, Weak},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{
    Result,
    constants::COMPACTION_ORIGIN,
    doc::{ArrayEvent, ArrayRef, Origin, Transaction, WriteSource},
    observable::{Observable, Subscription},
};
use reconcile::Indexed;

/// One `{key, val}` record of the backing array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry<V> {
    pub key: String,
    #[serde(rename = "val")]
    pub value: V,
}

impl<V> Entry<V> {
    pub fn new(key: impl Into<String>, value: V) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// How one key changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Change<V> {
    /// The key did not exist before.
    Add {
        #[serde(rename = "newValue")]
        new_value: V,
    },
    /// The key existed and now has another entry.
    Update {
        #[serde(rename = "oldValue")]
        old_value: V,
        #[serde(rename = "newValue")]
        new_value: V,
    },
    /// The key no longer exists.
    Delete {
        #[serde(rename = "oldValue")]
        old_value: V,
    },
}

impl<V> Change<V> {
    /// `"add"`, `"update"` or `"delete"`.
    pub fn action(&self) -> &'static str {
        match self {
            Change::Add { .. } => "add",
            Change::Update { .. } => "update",
            Change::Delete { .. } => "delete",
        }
    }

    pub fn old_value(&self) -> Option<&V> {
        match self {
            Change::Add { .. } => None,
            Change::Update { old_value, .. } | Change::Delete { old_value } => Some(old_value),
        }
    }

    pub fn new_value(&self) -> Option<&V> {
        match self {
            Change::Add { new_value } | Change::Update { new_value, .. } => Some(new_value),
            Change::Delete { .. } => None,
        }
    }
}

/// Everything one transaction changed in a [`KeyValue`].
#[derive(Debug, Clone)]
pub struct ChangeEvent<V> {
    changes: BTreeMap<String, Change<V>>,
    origin: Option<Origin>,
    source: WriteSource,
}

impl<V> ChangeEvent<V> {
    /// Changes keyed by the affected key.
    pub fn changes(&self) -> &BTreeMap<String, Change<V>> {
        &self.changes
    }

    pub fn get(&self, key: &str) -> Option<&Change<V>> {
        self.changes.get(key)
    }

    /// Origin of the transaction that caused the change.
    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    /// Whether the change was made locally or arrived from another replica.
    pub fn source(&self) -> WriteSource {
        self.source
    }
}

struct KeyValueInner<V> {
    array: ArrayRef<Entry<V>>,
    index: RefCell<HashMap<String, Indexed<V>>>,
    changes: Observable<ChangeEvent<V>>,
}

/// A map view over an array of [`Entry`] values.
///
/// Reads are answered from an in-memory index. Dropping the view stops
/// reconciliation; the array itself is left as is.
pub struct KeyValue<V> {
    inner: Rc<KeyValueInner<V>>,
    _subscription: Subscription,
}

impl<V: Clone + 'static> KeyValue<V> {
    /// Builds a view over `array`.
    ///
    /// Existing duplicates are removed right away, keeping the rightmost entry
    /// of each key. Building a second view over an already compacted array
    /// changes nothing.
    pub fn new(array: ArrayRef<Entry<V>>) -> Result<Self> {
        let mut index = HashMap::new();
        let mut stale = Vec::new();
        let entries = array.entries();
        for (position, (id, entry)) in entries.into_iter().enumerate().rev() {
            if index.contains_key(&entry.key) {
                stale.push(position);
            } else {
                index.insert(
                    entry.key,
                    Indexed {
                        id,
                        value: entry.value,
                    },
                );
            }
        }
        if !stale.is_empty() {
            debug!(
                array = array.name(),
                removed = stale.len(),
                "Removing duplicate entries"
            );
            array
                .doc()
                .transact_with(COMPACTION_ORIGIN, |txn| delete_positions(&array, txn, &stale))?;
        }

        let inner = Rc::new(KeyValueInner {
            array,
            index: RefCell::new(index),
            changes: Observable::new(),
        });
        let weak: Weak<KeyValueInner<V>> = Rc::downgrade(&inner);
        let subscription = inner.array.observe(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.reconcile(event);
            }
        });
        Ok(Self {
            inner,
            _subscription: subscription,
        })
    }

    /// Sets `key` to `value`, replacing any existing entry in the same
    /// transaction.
    pub fn set(&self, key: impl Into<String>, value: V) -> Result<()> {
        let key = key.into();
        let array = &self.inner.array;
        array.doc().transact(|txn| {
            if self.has(&key) {
                self.delete_in(txn, &key)?;
            }
            array.push(txn, Entry { key, value })?;
            Ok(())
        })
    }

    /// Current value of `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner
            .index
            .borrow()
            .get(key)
            .map(|indexed| indexed.value.clone())
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.index.borrow().contains_key(key)
    }

    /// Deletes the entry of `key`, if there is one.
    pub fn delete(&self, key: &str) -> Result<()> {
        let array = &self.inner.array;
        array.doc().transact(|txn| self.delete_in(txn, key))
    }

    fn delete_in(&self, txn: &mut Transaction<'_, Entry<V>>, key: &str) -> Result<()> {
        let array = &self.inner.array;
        if let Some(position) = array.position(|entry| entry.key == key) {
            array.delete(txn, position, 1)?;
        }
        Ok(())
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.inner.index.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.index.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Snapshot of the whole map.
    pub fn to_map(&self) -> BTreeMap<String, V> {
        self.inner
            .index
            .borrow()
            .iter()
            .map(|(key, indexed)| (key.clone(), indexed.value.clone()))
            .collect()
    }

    /// The backing array.
    pub fn array(&self) -> &ArrayRef<Entry<V>> {
        &self.inner.array
    }

    /// Calls `f` after every transaction that changed at least one key.
    pub fn observe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&ChangeEvent<V>) + 'static,
    {
        self.inner.changes.subscribe(f)
    }
}

impl<V: Clone + 'static> KeyValueInner<V> {
    fn reconcile(&self, event: &ArrayEvent<Entry<V>>) {
        let log = self
            .array
            .map_visible(|id, entry| (id, entry.key.clone()));
        let plan = reconcile::plan(
            &mut self.index.borrow_mut(),
            event.added(),
            event.deleted(),
            &log,
        );
        debug!(
            array = self.array.name(),
            added = event.added().len(),
            deleted = event.deleted().len(),
            compacted = plan.stale.len(),
            changed = plan.changes.len(),
            "Reconciled key-value view"
        );

        if !plan.stale.is_empty() {
            let result = self.array.doc().transact_with(COMPACTION_ORIGIN, |txn| {
                delete_positions(&self.array, txn, &plan.stale)
            });
            if let Err(err) = result {
                error!(array = self.array.name(), %err, "Failed to remove superseded entries");
            }
        }

        if !plan.changes.is_empty() {
            self.changes.emit(&ChangeEvent {
                changes: plan.changes,
                origin: event.origin().cloned(),
                source: event.source(),
            });
        }
    }
}

/// Deletes single elements at `positions`, which must be in descending order.
fn delete_positions<V: Clone + 'static>(
    array: &ArrayRef<Entry<V>>,
    txn: &mut Transaction<'_, Entry<V>>,
    positions: &[usize],
) -> Result<()> {
    for position in positions {
        array.delete(txn, *position, 1)?;
    }
    Ok(())
}
