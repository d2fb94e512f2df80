//! The reconciliation pass run after every change of the backing array.
//!
//! Planning is kept separate from execution: [`plan`] updates the index and
//! works out which positions are stale and which changes to report, and the
//! caller deletes the stale positions in one transaction afterwards.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{error, trace};

use super::{Change, Entry};
use crate::doc::ItemId;

/// The authoritative entry for one key.
#[derive(Debug, Clone)]
pub(crate) struct Indexed<V> {
    pub(crate) id: ItemId,
    pub(crate) value: V,
}

/// Outcome of one reconciliation pass.
#[derive(Debug)]
pub(crate) struct Plan<V> {
    pub(crate) changes: BTreeMap<String, Change<V>>,
    /// Positions to delete, in descending order.
    pub(crate) stale: Vec<usize>,
}

/// Reconciles `index` with one array change.
///
/// `log` is the current array projected to `(id, key)` pairs in order.
/// The rightmost entry of a key always wins; every other entry of a key that
/// was touched by this change is reported as stale.
pub(crate) fn plan<V: Clone>(
    index: &mut HashMap<String, Indexed<V>>,
    added: &[(ItemId, Entry<V>)],
    deleted: &[(ItemId, Entry<V>)],
    log: &[(ItemId, String)],
) -> Plan<V> {
    let mut changes = BTreeMap::new();

    for (id, entry) in deleted {
        if index.get(&entry.key).is_some_and(|indexed| indexed.id == *id) {
            if let Some(old) = index.remove(&entry.key) {
                changes.insert(entry.key.clone(), Change::Delete { old_value: old.value });
            }
        }
    }

    let added_values: HashMap<ItemId, &V> =
        added.iter().map(|(id, entry)| (*id, &entry.value)).collect();
    let mut pending: HashMap<&str, usize> = HashMap::new();
    for (_, entry) in added {
        *pending.entry(entry.key.as_str()).or_default() += 1;
    }

    let mut stale = Vec::new();
    let mut resolved: HashSet<&str> = HashSet::new();
    // Entries of resolved keys still expected further left.
    let mut outstanding = 0usize;

    for (position, (id, key)) in log.iter().enumerate().rev() {
        if pending.is_empty() && outstanding == 0 {
            break;
        }
        let key = key.as_str();
        if resolved.contains(key) {
            trace!(position, key, "Stale entry");
            stale.push(position);
            outstanding = outstanding.saturating_sub(1);
            continue;
        }
        let Some(count) = pending.remove(key) else {
            continue;
        };

        let expected_stale = match added_values.get(id) {
            Some(value) => {
                let new_value = (*value).clone();
                let prior = index.insert(
                    key.to_owned(),
                    Indexed {
                        id: *id,
                        value: new_value.clone(),
                    },
                );
                // The other new entries, plus the previously indexed one if
                // it is still in the log.
                let mut expected = count - 1;
                let change = match prior {
                    Some(prior) => {
                        expected += 1;
                        Change::Update {
                            old_value: prior.value,
                            new_value,
                        }
                    }
                    None => match changes.remove(key) {
                        Some(Change::Delete { old_value }) => Change::Update {
                            old_value,
                            new_value,
                        },
                        _ => Change::Add { new_value },
                    },
                };
                trace!(position, key, action = change.action(), "New winning entry");
                changes.insert(key.to_owned(), change);
                expected
            }
            None => {
                let indexed = index.get(key).is_some_and(|indexed| indexed.id == *id);
                debug_assert!(indexed, "winning entry for '{key}' is not indexed");
                if !indexed {
                    error!(key, "Winning entry is not the indexed entry");
                }
                count
            }
        };
        resolved.insert(key);
        outstanding += expected_stale;
    }

    Plan { changes, stale }
}
