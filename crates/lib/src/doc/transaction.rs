//! Transactions batch array mutations into one observable change.
//!
//! A [`Transaction`] records the ids it inserted and deleted while the caller's
//! closure runs. On commit the net effect is turned into one [`ArrayEvent`] per
//! changed array and one [`TransactionSummary`] for the whole document. Nothing
//! is delivered to observers until the transaction has committed, so observers
//! only ever see a consistent document.

use std::{
    cell::{Ref, RefMut},
    collections::BTreeSet,
};

use super::{
    Doc,
    events::{ArrayEvent, TransactionSummary},
    ids::{ItemId, Origin, WriteSource},
    store::BlockStore,
};

/// An open transaction on a [`Doc`].
///
/// Obtained through [`Doc::transact`] or [`Doc::transact_with`] and passed to
/// the array mutation methods.
pub struct Transaction<'doc, T> {
    doc: &'doc Doc<T>,
    origin: Option<Origin>,
    source: WriteSource,
    inserted: Vec<ItemId>,
    deleted: Vec<ItemId>,
}

/// The observable outcome of a committed transaction.
pub(crate) struct Committed<T> {
    pub(crate) events: Vec<ArrayEvent<T>>,
    pub(crate) summary: TransactionSummary,
}

impl<'doc, T: Clone + 'static> Transaction<'doc, T> {
    pub(crate) fn new(doc: &'doc Doc<T>, origin: Option<Origin>, source: WriteSource) -> Self {
        Self {
            doc,
            origin,
            source,
            inserted: Vec::new(),
            deleted: Vec::new(),
        }
    }

    /// The origin this transaction was opened with.
    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    pub fn source(&self) -> WriteSource {
        self.source
    }

    /// The document this transaction mutates.
    pub fn doc(&self) -> &'doc Doc<T> {
        self.doc
    }

    pub(crate) fn store(&self) -> Ref<'_, BlockStore<T>> {
        self.doc.inner.store.borrow()
    }

    pub(crate) fn store_mut(&self) -> RefMut<'_, BlockStore<T>> {
        self.doc.inner.store.borrow_mut()
    }

    pub(crate) fn record_inserted(&mut self, ids: impl IntoIterator<Item = ItemId>) {
        self.inserted.extend(ids);
    }

    pub(crate) fn record_deleted(&mut self, ids: impl IntoIterator<Item = ItemId>) {
        self.deleted.extend(ids);
    }

    /// Deletes one element by id. Returns false if it was already gone.
    pub(crate) fn delete_item(&mut self, id: ItemId) -> bool {
        let deleted = self.store_mut().delete_item(id);
        if deleted {
            self.deleted.push(id);
        }
        deleted
    }

    /// Brings a deleted element back as a new element at the same position.
    pub(crate) fn restore(&mut self, id: ItemId) -> Option<ItemId> {
        let restored = self.store_mut().restore(id)?;
        self.inserted.push(restored);
        Some(restored)
    }

    pub(crate) fn follow_redone(&self, id: ItemId) -> ItemId {
        self.store().follow_redone(id)
    }

    /// Name of the array `id` belongs to.
    pub(crate) fn parent_of(&self, id: ItemId) -> Option<String> {
        self.store().parent(id).map(str::to_owned)
    }

    pub(crate) fn is_deleted(&self, id: ItemId) -> bool {
        self.store().item(id).is_none_or(|item| item.deleted)
    }

    /// Computes the events of this transaction, or `None` if it changed nothing.
    pub(crate) fn commit(self) -> Option<Committed<T>> {
        if self.inserted.is_empty() && self.deleted.is_empty() {
            return None;
        }
        let inserted: BTreeSet<ItemId> = self.inserted.into_iter().collect();
        let deleted: BTreeSet<ItemId> = self.deleted.into_iter().collect();

        let store = self.doc.inner.store.borrow();
        let changed: BTreeSet<String> = inserted
            .union(&deleted)
            .filter_map(|id| store.parent(*id).map(str::to_owned))
            .collect();

        let mut events = Vec::new();
        for name in &changed {
            let mut added = Vec::new();
            let mut removed = Vec::new();
            for item in store.items(name) {
                let was_inserted = inserted.contains(&item.id);
                let was_deleted = deleted.contains(&item.id);
                if was_inserted && !was_deleted {
                    added.push((item.id, item.content.clone()));
                } else if was_deleted && !was_inserted {
                    removed.push((item.id, item.content.clone()));
                }
            }
            if added.is_empty() && removed.is_empty() {
                continue;
            }
            events.push(ArrayEvent {
                target: name.clone(),
                added,
                deleted: removed,
                origin: self.origin.clone(),
                source: self.source,
            });
        }

        Some(Committed {
            events,
            summary: TransactionSummary {
                origin: self.origin,
                source: self.source,
                changed,
                inserted,
                deleted,
            },
        })
    }
}
