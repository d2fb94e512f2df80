//! Element storage and RGA integration for the arrays of one document.
//!
//! Each array is a sequence of items in document order, tombstones included.
//! A new item is placed right after its left origin, skipping any items that
//! precede it: items with a greater clock, or with the same clock and a lower
//! client id. Since a replica's Lamport clock exceeds everything it has seen,
//! local inserts never skip and land exactly where requested, while concurrent
//! inserts at the same spot resolve identically on every replica.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use super::{
    errors::DocError,
    ids::{ClientId, ItemId},
    update::{StateVector, Update, UpdateItem},
};

/// Returns true if `existing` stays left of a concurrent sibling `new`.
fn precedes(existing: ItemId, new: ItemId) -> bool {
    existing.clock > new.clock || (existing.clock == new.clock && existing.client < new.client)
}

#[derive(Debug, Clone)]
pub(crate) struct Item<T> {
    pub(crate) id: ItemId,
    pub(crate) origin: Option<ItemId>,
    pub(crate) content: T,
    pub(crate) deleted: bool,
    /// Set when this tombstone was restored as a new item by an undo manager.
    pub(crate) redone: Option<ItemId>,
}

/// Ids touched by applying a remote update.
#[derive(Debug, Default)]
pub(crate) struct Applied {
    pub(crate) inserted: Vec<ItemId>,
    pub(crate) deleted: Vec<ItemId>,
}

#[derive(Debug)]
pub(crate) struct BlockStore<T> {
    client: ClientId,
    clock: u64,
    sequences: BTreeMap<String, Vec<Item<T>>>,
    parents: HashMap<ItemId, String>,
}

impl<T: Clone> BlockStore<T> {
    pub(crate) fn new(client: ClientId) -> Self {
        Self {
            client,
            clock: 0,
            sequences: BTreeMap::new(),
            parents: HashMap::new(),
        }
    }

    pub(crate) fn client(&self) -> ClientId {
        self.client
    }

    pub(crate) fn ensure_sequence(&mut self, name: &str) {
        if !self.sequences.contains_key(name) {
            self.sequences.insert(name.to_owned(), Vec::new());
        }
    }

    fn next_id(&mut self) -> ItemId {
        self.clock += 1;
        ItemId::new(self.client, self.clock)
    }

    pub(crate) fn contains(&self, id: ItemId) -> bool {
        self.parents.contains_key(&id)
    }

    pub(crate) fn parent(&self, id: ItemId) -> Option<&str> {
        self.parents.get(&id).map(String::as_str)
    }

    pub(crate) fn item(&self, id: ItemId) -> Option<&Item<T>> {
        let parent = self.parents.get(&id)?;
        self.sequences.get(parent)?.iter().find(|item| item.id == id)
    }

    fn item_mut(&mut self, id: ItemId) -> Option<&mut Item<T>> {
        let parent = self.parents.get(&id)?;
        self.sequences
            .get_mut(parent)?
            .iter_mut()
            .find(|item| item.id == id)
    }

    /// All items of `name` in document order, tombstones included.
    pub(crate) fn items<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Item<T>> + use<'a, T> {
        self.sequences.get(name).into_iter().flatten()
    }

    /// Visible (non-deleted) items of `name` in document order.
    pub(crate) fn visible<'a>(
        &'a self,
        name: &str,
    ) -> impl Iterator<Item = &'a Item<T>> + use<'a, T> {
        self.sequences
            .get(name)
            .into_iter()
            .flatten()
            .filter(|item| !item.deleted)
    }

    pub(crate) fn len(&self, name: &str) -> usize {
        self.visible(name).count()
    }

    /// Places an item into its sequence according to the RGA rule.
    fn integrate(&mut self, name: &str, id: ItemId, origin: Option<ItemId>, content: T) {
        self.clock = self.clock.max(id.clock);
        let sequence = self.sequences.entry(name.to_owned()).or_default();
        let mut position = match origin {
            Some(origin) => sequence
                .iter()
                .position(|item| item.id == origin)
                .map_or(0, |p| p + 1),
            None => 0,
        };
        while position < sequence.len() && precedes(sequence[position].id, id) {
            position += 1;
        }
        sequence.insert(
            position,
            Item {
                id,
                origin,
                content,
                deleted: false,
                redone: None,
            },
        );
        self.parents.insert(id, name.to_owned());
    }

    /// Inserts `contents` so the first lands at visible position `index`.
    pub(crate) fn insert(
        &mut self,
        name: &str,
        index: usize,
        contents: Vec<T>,
    ) -> Result<Vec<ItemId>, DocError> {
        let len = self.len(name);
        if index > len {
            return Err(DocError::IndexOutOfBounds {
                array: name.to_owned(),
                index,
                len,
            });
        }
        let mut origin = match index {
            0 => None,
            _ => self.visible(name).nth(index - 1).map(|item| item.id),
        };
        let mut ids = Vec::with_capacity(contents.len());
        for content in contents {
            let id = self.next_id();
            self.integrate(name, id, origin, content);
            origin = Some(id);
            ids.push(id);
        }
        Ok(ids)
    }

    /// Appends after the last item of the sequence, tombstones included.
    pub(crate) fn push(&mut self, name: &str, content: T) -> ItemId {
        let origin = self
            .sequences
            .get(name)
            .and_then(|sequence| sequence.last())
            .map(|item| item.id);
        let id = self.next_id();
        self.integrate(name, id, origin, content);
        id
    }

    /// Tombstones the visible items `start..start + count`.
    pub(crate) fn delete_range(
        &mut self,
        name: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<ItemId>, DocError> {
        let len = self.len(name);
        let end = start.saturating_add(count);
        if end > len {
            return Err(DocError::RangeOutOfBounds {
                array: name.to_owned(),
                start,
                end,
                len,
            });
        }
        let ids: Vec<ItemId> = self
            .visible(name)
            .skip(start)
            .take(count)
            .map(|item| item.id)
            .collect();
        for id in &ids {
            self.delete_item(*id);
        }
        Ok(ids)
    }

    /// Tombstones one item. Returns false if it was unknown or already deleted.
    pub(crate) fn delete_item(&mut self, id: ItemId) -> bool {
        match self.item_mut(id) {
            Some(item) if !item.deleted => {
                item.deleted = true;
                true
            }
            _ => false,
        }
    }

    /// Follows restore links from `id` to the newest incarnation of the item.
    pub(crate) fn follow_redone(&self, mut id: ItemId) -> ItemId {
        while let Some(next) = self.item(id).and_then(|item| item.redone) {
            id = next;
        }
        id
    }

    /// Re-creates a deleted item as a new item at the tombstone's position.
    ///
    /// Returns the new id, or `None` if the newest incarnation is still alive
    /// or the item is unknown.
    pub(crate) fn restore(&mut self, id: ItemId) -> Option<ItemId> {
        let target = self.follow_redone(id);
        let item = self.item(target)?;
        if !item.deleted {
            return None;
        }
        let content = item.content.clone();
        let parent = self.parents.get(&target)?.clone();
        let restored = self.next_id();
        self.integrate(&parent, restored, Some(target), content);
        if let Some(item) = self.item_mut(target) {
            item.redone = Some(restored);
        }
        Some(restored)
    }

    pub(crate) fn state_vector(&self) -> StateVector {
        let mut state = StateVector::default();
        for id in self.parents.keys() {
            state.observe(*id);
        }
        state
    }

    /// Every item the peer described by `remote` has not seen, plus the full
    /// delete set.
    pub(crate) fn encode_diff(&self, remote: &StateVector) -> Update<T> {
        let mut items = Vec::new();
        let mut deleted = Vec::new();
        for (parent, sequence) in &self.sequences {
            for item in sequence {
                if item.deleted {
                    deleted.push(item.id);
                }
                if !remote.contains(item.id) {
                    items.push(UpdateItem {
                        id: item.id,
                        parent: parent.clone(),
                        origin: item.origin,
                        content: item.content.clone(),
                    });
                }
            }
        }
        items.sort_by_key(|item| item.id);
        deleted.sort();
        Update { items, deleted }
    }

    /// Integrates the unknown items of `update` and applies its deletions.
    pub(crate) fn apply(&mut self, update: &Update<T>) -> Applied {
        let mut applied = Applied::default();
        let mut pending: Vec<&UpdateItem<T>> = update
            .items
            .iter()
            .filter(|item| !self.contains(item.id))
            .collect();
        pending.sort_by_key(|item| item.id);

        loop {
            let before = pending.len();
            let mut waiting = Vec::new();
            for item in pending {
                let ready = item.origin.is_none_or(|origin| self.contains(origin));
                if ready {
                    self.integrate(&item.parent, item.id, item.origin, item.content.clone());
                    applied.inserted.push(item.id);
                } else {
                    waiting.push(item);
                }
            }
            pending = waiting;
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }
        if !pending.is_empty() {
            warn!(
                dropped = pending.len(),
                "Dropping update items whose origin is unknown"
            );
        }

        for id in &update.deleted {
            if self.delete_item(*id) {
                applied.deleted.push(*id);
            }
        }
        applied
    }
}
