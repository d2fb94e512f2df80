//! Undo and redo of local edits.
//!
//! An [`UndoManager`] watches one document and records every local
//! transaction that touched its scope as a [`StackItem`]. A
//! [`MultiDocUndoManager`] owns one `UndoManager` per document and merges
//! their histories into one chronological undo/redo stack.

mod manager;
mod multi;
mod options;

use std::{
    cell::RefCell,
    collections::{BTreeSet, HashMap},
    fmt,
    rc::Rc,
};

pub use manager::UndoManager;
pub use multi::{DocStackItemEvent, MultiDocUndoManager};
pub use options::UndoOptions;
use serde::{Deserialize, Serialize};

use crate::doc::{ItemId, Origin};

/// Which stack an item lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackKind {
    Undo,
    Redo,
}

struct StackItemInner {
    insertions: RefCell<BTreeSet<ItemId>>,
    deletions: RefCell<BTreeSet<ItemId>>,
    meta: RefCell<HashMap<String, serde_json::Value>>,
}

/// One undoable unit: the elements a group of transactions inserted and
/// deleted, plus free-form metadata.
///
/// Stack items are shared handles. The item passed to a `stack-item-added`
/// observer is the same item later returned by `undo`, so metadata stored
/// on it (a cursor position, say) travels with it.
#[derive(Clone)]
pub struct StackItem {
    inner: Rc<StackItemInner>,
}

impl StackItem {
    pub(crate) fn new(insertions: BTreeSet<ItemId>, deletions: BTreeSet<ItemId>) -> Self {
        Self {
            inner: Rc::new(StackItemInner {
                insertions: RefCell::new(insertions),
                deletions: RefCell::new(deletions),
                meta: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Elements created by the captured transactions.
    pub fn insertions(&self) -> BTreeSet<ItemId> {
        self.inner.insertions.borrow().clone()
    }

    /// Elements deleted by the captured transactions.
    pub fn deletions(&self) -> BTreeSet<ItemId> {
        self.inner.deletions.borrow().clone()
    }

    pub fn meta(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.meta.borrow().get(key).cloned()
    }

    pub fn set_meta(&self, key: impl Into<String>, value: serde_json::Value) {
        self.inner.meta.borrow_mut().insert(key.into(), value);
    }

    /// Returns true if both handles refer to the same item.
    pub fn ptr_eq(&self, other: &StackItem) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn merge(&self, insertions: &BTreeSet<ItemId>, deletions: &BTreeSet<ItemId>) {
        self.inner.insertions.borrow_mut().extend(insertions);
        self.inner.deletions.borrow_mut().extend(deletions);
    }
}

impl PartialEq for StackItem {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for StackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackItem")
            .field("insertions", &self.inner.insertions.borrow().len())
            .field("deletions", &self.inner.deletions.borrow().len())
            .field("meta", &self.inner.meta.borrow())
            .finish()
    }
}

/// Payload of `stack-item-added`, `stack-item-updated` and
/// `stack-item-popped` notifications.
#[derive(Debug, Clone)]
pub struct StackItemEvent {
    /// Stack the item was added to, updated on, or popped from.
    pub kind: StackKind,
    pub stack_item: StackItem,
    /// Origin of the transaction that caused the notification.
    pub origin: Option<Origin>,
    /// Arrays in scope that the transaction changed.
    pub changed_parent_types: BTreeSet<String>,
}

/// Payload of `stack-cleared` notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackCleared {
    pub undo_stack_cleared: bool,
    pub redo_stack_cleared: bool,
}
