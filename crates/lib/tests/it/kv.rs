//! Key-value view tests, single replica and across replicas.

use std::{
    cell::Cell,
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

use concord::{
    KeyValue, WriteSource,
    kv::{Change, Entry},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::helpers::*;

fn update(old: &str, new: &str) -> Change<String> {
    Change::Update {
        old_value: old.to_string(),
        new_value: new.to_string(),
    }
}

fn add(new: &str) -> Change<String> {
    Change::Add {
        new_value: new.to_string(),
    }
}

fn delete(old: &str) -> Change<String> {
    Change::Delete {
        old_value: old.to_string(),
    }
}

fn entry(key: &str, value: &str) -> Entry<String> {
    Entry::new(key, value.to_string())
}

#[test]
fn test_basic_change_flow() {
    let (_doc, kv) = kv_replica(1);
    let log = ChangeLog::attach(&kv);

    kv.set("key1", "val1".to_string()).unwrap();
    assert_eq!(log.last("key1"), Some(add("val1")));
    kv.set("key1", "updated".to_string()).unwrap();
    assert_eq!(log.last("key1"), Some(update("val1", "updated")));
    kv.delete("key1").unwrap();
    assert_eq!(log.last("key1"), Some(delete("updated")));
    kv.set("key1", "new".to_string()).unwrap();
    assert_eq!(log.last("key1"), Some(add("new")));

    assert_eq!(log.len(), 4);
    assert_eq!(kv.array().len(), 1);
}

#[test]
fn test_remote_set_is_a_single_update() {
    let (doc1, kv1) = kv_replica(1);
    let log1 = ChangeLog::attach(&kv1);
    kv1.set("key1", "val1".to_string()).unwrap();
    kv1.set("key1", "updated".to_string()).unwrap();
    kv1.delete("key1").unwrap();
    kv1.set("key1", "new".to_string()).unwrap();

    let (doc2, kv2) = kv_replica(2);
    kv2.set("key1", "overwritten".to_string()).unwrap();
    sync_into(&doc2, &doc1);

    assert_eq!(log1.last("key1"), Some(update("new", "overwritten")));
    assert_eq!(log1.events().last().unwrap().changes().len(), 1);
    assert_eq!(log1.events().last().unwrap().source(), WriteSource::Remote);
    assert_eq!(kv1.get("key1").as_deref(), Some("overwritten"));
    assert!(kv1.has("key1"));
    assert!(!kv1.has("key2"));
    assert_eq!(kv1.array().len(), 1);

    // A second view over the same array sees the same state without touching it.
    let duplicate = KeyValue::new(kv1.array().clone()).unwrap();
    assert_eq!(duplicate.get("key1").as_deref(), Some("overwritten"));

    // An entry inserted left of the winner never takes effect.
    let events_before = log1.len();
    doc1.transact(|txn| kv1.array().insert(txn, 0, [entry("key1", "nope")]))
        .unwrap();
    assert_eq!(duplicate.get("key1").as_deref(), Some("overwritten"));
    assert_eq!(kv1.get("key1").as_deref(), Some("overwritten"));
    assert_eq!(kv1.array().len(), 1);
    assert_eq!(log1.len(), events_before);
}

#[test]
fn test_init_removes_duplicates() {
    let doc: KvDoc = replica(1);
    let array = doc.get_array("kv");
    doc.transact(|txn| {
        array.insert(
            txn,
            0,
            [
                entry("key1", "old"),
                entry("key2", "only"),
                entry("key1", "overwritten"),
            ],
        )
    })
    .unwrap();

    let kv = KeyValue::new(array.clone()).unwrap();
    assert_eq!(kv.get("key1").as_deref(), Some("overwritten"));
    assert_eq!(kv.get("key2").as_deref(), Some("only"));
    assert_eq!(array.len(), 2);
    assert_eq!(
        array.to_vec(),
        vec![entry("key2", "only"), entry("key1", "overwritten")]
    );
}

#[test]
fn test_reinit_over_compacted_array_is_a_no_op() {
    let (doc, kv) = kv_replica(1);
    for (key, value) in [("a", "1"), ("b", "2"), ("a", "3")] {
        kv.set(key, value.to_string()).unwrap();
    }

    let transactions = Rc::new(Cell::new(0));
    let _sub = {
        let transactions = Rc::clone(&transactions);
        doc.observe_after_transaction(move |_| transactions.set(transactions.get() + 1))
    };
    let again = KeyValue::new(kv.array().clone()).unwrap();

    assert_eq!(transactions.get(), 0);
    assert_eq!(again.to_map(), kv.to_map());
    assert_eq!(kv.array().len(), 2);
}

#[test]
fn test_pushes_of_one_key_in_one_transaction() {
    let (doc, kv) = kv_replica(1);
    let log = ChangeLog::attach(&kv);
    doc.transact(|txn| {
        kv.array().push(txn, entry("k", "first"))?;
        kv.array().push(txn, entry("k", "second"))
    })
    .unwrap();

    assert_eq!(log.len(), 1);
    assert_eq!(log.last("k"), Some(add("second")));
    assert_eq!(kv.array().to_vec(), vec![entry("k", "second")]);
}

#[test]
fn test_remote_delete_is_reported() {
    let (doc1, kv1) = kv_replica(1);
    let (doc2, kv2) = kv_replica(2);
    let log2 = ChangeLog::attach(&kv2);

    kv1.set("k", "v".to_string()).unwrap();
    sync_into(&doc1, &doc2);
    assert_eq!(log2.last("k"), Some(add("v")));

    kv1.delete("k").unwrap();
    sync_into(&doc1, &doc2);
    assert_eq!(log2.last("k"), Some(delete("v")));
    assert!(!kv2.has("k"));
    assert!(kv2.array().is_empty());
}

#[test]
fn test_concurrent_sets_converge() {
    let (doc1, kv1) = kv_replica(1);
    let (doc2, kv2) = kv_replica(2);
    let log1 = ChangeLog::attach(&kv1);
    let log2 = ChangeLog::attach(&kv2);

    kv1.set("k", "a".to_string()).unwrap();
    kv2.set("k", "b".to_string()).unwrap();
    sync_both(&doc1, &doc2);

    assert_eq!(kv1.get("k"), kv2.get("k"));
    assert_eq!(kv1.get("k").as_deref(), Some("b"));
    assert_eq!(kv1.array().len(), 1);
    assert_eq!(kv2.array().len(), 1);

    // Only the replica whose value lost sees a change, and it is one update.
    assert_eq!(log1.len(), 2);
    assert_eq!(log1.last("k"), Some(update("a", "b")));
    assert_eq!(log2.len(), 1);
    assert_eq!(log2.last("k"), Some(add("b")));
}

#[test]
fn test_concurrent_writers_on_many_keys_converge() {
    let (doc1, kv1) = kv_replica(1);
    let (doc2, kv2) = kv_replica(2);
    for key in ["a", "b", "c", "d"] {
        kv1.set(key, format!("{key}-base")).unwrap();
    }
    sync_both(&doc1, &doc2);
    assert_eq!(kv1.to_map(), kv2.to_map());

    // Interleave updates so entries of different keys end up mixed together.
    kv1.set("a", "a1".to_string()).unwrap();
    kv1.set("c", "c1".to_string()).unwrap();
    kv1.delete("d").unwrap();
    kv2.set("c", "c2".to_string()).unwrap();
    kv2.set("a", "a2".to_string()).unwrap();
    kv2.set("e", "e2".to_string()).unwrap();
    kv1.set("b", "b1".to_string()).unwrap();
    sync_both(&doc1, &doc2);

    assert_eq!(kv1.to_map(), kv2.to_map());
    assert_eq!(kv1.array().to_vec(), kv2.array().to_vec());
    let keys: BTreeSet<String> = kv1.array().to_vec().into_iter().map(|e| e.key).collect();
    assert_eq!(keys.len(), kv1.array().len());
    assert_eq!(kv1.keys(), vec!["a", "b", "c", "e"]);
    assert_eq!(kv1.get("b").as_deref(), Some("b1"));
}

#[test]
fn test_random_operations_match_a_map() {
    let (_doc, kv) = kv_replica(1);
    let mut model = BTreeMap::new();
    let mut rng = StdRng::seed_from_u64(1337);

    for i in 0..500 {
        let key = format!("key{}", rng.gen_range(0..20));
        if rng.gen_range(0..4) == 0 {
            kv.delete(&key).unwrap();
            model.remove(&key);
        } else {
            kv.set(key.clone(), i.to_string()).unwrap();
            model.insert(key, i.to_string());
        }
        assert_eq!(kv.array().len(), model.len());
    }
    assert_eq!(kv.to_map(), model);
}
