//! Events delivered to document observers after a transaction commits.

use std::collections::BTreeSet;

use super::ids::{ItemId, Origin, WriteSource};

/// Net change of one array in one transaction.
///
/// Elements inserted and deleted within the same transaction appear in
/// neither list.
#[derive(Debug, Clone)]
pub struct ArrayEvent<T> {
    pub(crate) target: String,
    pub(crate) added: Vec<(ItemId, T)>,
    pub(crate) deleted: Vec<(ItemId, T)>,
    pub(crate) origin: Option<Origin>,
    pub(crate) source: WriteSource,
}

impl<T> ArrayEvent<T> {
    /// Name of the changed array.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Elements that became part of the array, in document order.
    pub fn added(&self) -> &[(ItemId, T)] {
        &self.added
    }

    /// Elements that were removed from the array, with their last content.
    pub fn deleted(&self) -> &[(ItemId, T)] {
        &self.deleted
    }

    /// Origin of the transaction that produced this event.
    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    /// Whether the transaction was local or applied from a remote update.
    pub fn source(&self) -> WriteSource {
        self.source
    }
}

/// Document-wide summary of one committed transaction.
#[derive(Debug, Clone)]
pub struct TransactionSummary {
    pub(crate) origin: Option<Origin>,
    pub(crate) source: WriteSource,
    pub(crate) changed: BTreeSet<String>,
    pub(crate) inserted: BTreeSet<ItemId>,
    pub(crate) deleted: BTreeSet<ItemId>,
}

impl TransactionSummary {
    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    pub fn source(&self) -> WriteSource {
        self.source
    }

    pub fn is_local(&self) -> bool {
        self.source == WriteSource::Local
    }

    /// Names of every array touched by the transaction.
    pub fn changed(&self) -> &BTreeSet<String> {
        &self.changed
    }

    /// Every element created by the transaction, including ones it deleted again.
    pub fn inserted(&self) -> &BTreeSet<ItemId> {
        &self.inserted
    }

    /// Every element the transaction deleted.
    pub fn deleted(&self) -> &BTreeSet<ItemId> {
        &self.deleted
    }
}
