//! Replication payloads exchanged between replicas of a document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::{ClientId, ItemId};

/// Summary of what a replica has seen: the highest clock observed per client.
///
/// Because each replica only ever receives another client's elements as a
/// clock-ordered prefix, the highest clock is enough to decide whether an
/// element is already known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateVector(BTreeMap<ClientId, u64>);

impl StateVector {
    /// Highest clock seen from `client`, or 0 if none.
    pub fn get(&self, client: ClientId) -> u64 {
        self.0.get(&client).copied().unwrap_or(0)
    }

    /// Returns true if the element `id` is covered by this state vector.
    pub fn contains(&self, id: ItemId) -> bool {
        id.clock <= self.get(id.client)
    }

    /// Number of clients this vector has seen.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing has been seen.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn observe(&mut self, id: ItemId) {
        let clock = self.0.entry(id.client).or_insert(0);
        *clock = (*clock).max(id.clock);
    }
}

/// One element as shipped in an [`Update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct UpdateItem<T> {
    pub(crate) id: ItemId,
    pub(crate) parent: String,
    pub(crate) origin: Option<ItemId>,
    pub(crate) content: T,
}

/// A batch of elements and deletions produced by one replica for another.
///
/// Elements are ordered by id, so every element's origin precedes it.
/// The delete set is always complete; applying it twice is harmless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update<T> {
    pub(crate) items: Vec<UpdateItem<T>>,
    pub(crate) deleted: Vec<ItemId>,
}

impl<T> Update<T> {
    /// Number of elements carried by this update.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the update carries neither elements nor deletions.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.deleted.is_empty()
    }

    /// Ids of the elements carried by this update.
    pub fn item_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items.iter().map(|item| item.id)
    }

    /// Ids deleted according to this update.
    pub fn deleted(&self) -> &[ItemId] {
        &self.deleted
    }
}
