//! Named replicated arrays inside a [`Doc`].

use std::{fmt, rc::Rc};

use super::{Doc, errors::DocError, events::ArrayEvent, ids::ItemId, transaction::Transaction};
use crate::{Result, observable::Subscription};

/// Handle to one named array of a document.
///
/// Reads go straight to the document. Mutations take the [`Transaction`] they
/// belong to, which must be a transaction of the same document.
pub struct ArrayRef<T> {
    doc: Doc<T>,
    name: Rc<str>,
}

impl<T: Clone + 'static> ArrayRef<T> {
    pub(crate) fn new(doc: Doc<T>, name: &str) -> Self {
        Self {
            doc,
            name: Rc::from(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The document this array belongs to.
    pub fn doc(&self) -> &Doc<T> {
        &self.doc
    }

    /// Number of visible elements.
    pub fn len(&self) -> usize {
        self.doc.inner.store.borrow().len(&self.name)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at visible position `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        self.doc
            .inner
            .store
            .borrow()
            .visible(&self.name)
            .nth(index)
            .map(|item| item.content.clone())
    }

    /// Snapshot of all visible values in order.
    pub fn to_vec(&self) -> Vec<T> {
        self.map_visible(|_, value| value.clone())
    }

    /// Snapshot of all visible elements with their ids.
    pub fn entries(&self) -> Vec<(ItemId, T)> {
        self.map_visible(|id, value| (id, value.clone()))
    }

    /// Projects every visible element in order without cloning values.
    pub fn map_visible<R>(&self, mut f: impl FnMut(ItemId, &T) -> R) -> Vec<R> {
        self.doc
            .inner
            .store
            .borrow()
            .visible(&self.name)
            .map(|item| f(item.id, &item.content))
            .collect()
    }

    /// Visible position of the first element matching `predicate`.
    pub fn position(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<usize> {
        self.doc
            .inner
            .store
            .borrow()
            .visible(&self.name)
            .position(|item| predicate(&item.content))
    }

    fn check_owner(&self, txn: &Transaction<'_, T>) -> Result<()> {
        if txn.doc().ptr_eq(&self.doc) {
            Ok(())
        } else {
            Err(DocError::ForeignDocument {
                array: self.name.to_string(),
            }
            .into())
        }
    }

    /// Appends `value` at the end of the array.
    pub fn push(&self, txn: &mut Transaction<'_, T>, value: T) -> Result<ItemId> {
        self.check_owner(txn)?;
        let id = txn.store_mut().push(&self.name, value);
        txn.record_inserted([id]);
        Ok(id)
    }

    /// Inserts `values` so that the first one ends up at visible position `index`.
    pub fn insert(
        &self,
        txn: &mut Transaction<'_, T>,
        index: usize,
        values: impl IntoIterator<Item = T>,
    ) -> Result<Vec<ItemId>> {
        self.check_owner(txn)?;
        let values: Vec<T> = values.into_iter().collect();
        let ids = txn.store_mut().insert(&self.name, index, values)?;
        txn.record_inserted(ids.iter().copied());
        Ok(ids)
    }

    /// Deletes `len` visible elements starting at `index`.
    pub fn delete(&self, txn: &mut Transaction<'_, T>, index: usize, len: usize) -> Result<()> {
        self.check_owner(txn)?;
        let ids = txn.store_mut().delete_range(&self.name, index, len)?;
        txn.record_deleted(ids);
        Ok(())
    }

    /// Calls `f` with the net change of this array after every transaction
    /// that touched it.
    pub fn observe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&ArrayEvent<T>) + 'static,
    {
        self.doc.array_observers(&self.name).subscribe(f)
    }
}

impl<T> Clone for ArrayRef<T> {
    fn clone(&self) -> Self {
        Self {
            doc: self.doc.clone(),
            name: Rc::clone(&self.name),
        }
    }
}

impl<T> PartialEq for ArrayRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.doc.inner, &other.doc.inner) && self.name == other.name
    }
}

impl<T> fmt::Debug for ArrayRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayRef")
            .field("doc", &self.doc.inner.id)
            .field("name", &self.name)
            .finish()
    }
}
