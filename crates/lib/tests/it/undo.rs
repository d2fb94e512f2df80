//! Undo tests spanning several documents.

use concord::{
    ArrayRef, Doc, MultiDocUndoManager, UndoOptions,
    undo::{DocStackItemEvent, StackCleared, StackKind},
};
use serde_json::json;

use crate::helpers::*;

fn push(array: &ArrayRef<i32>, value: i32) {
    array.doc().transact(|txn| array.push(txn, value)).unwrap();
}

/// Two documents with a "numbers" array each, both in scope of one coordinator.
fn two_docs(options: UndoOptions) -> (MultiDocUndoManager<i32>, ArrayRef<i32>, ArrayRef<i32>) {
    let doc1: Doc<i32> = replica(1);
    let doc2: Doc<i32> = replica(2);
    let first = doc1.get_array("numbers");
    let second = doc2.get_array("numbers");
    let undo = MultiDocUndoManager::new(options);
    undo.add_to_scope([first.clone(), second.clone()]).unwrap();
    (undo, first, second)
}

#[test]
fn test_undo_and_redo_follow_edit_order_across_documents() {
    let (undo, first, second) = two_docs(unmerged_options());
    let (d1, d2) = (first.doc().id(), second.doc().id());
    assert!(!undo.can_undo());

    push(&first, 1);
    push(&second, 2);
    push(&first, 3);
    assert_eq!(undo.undo_stack(), vec![d1, d2, d1]);

    assert!(undo.undo().is_some());
    assert_eq!(first.to_vec(), vec![1]);
    assert!(undo.undo().is_some());
    assert!(second.is_empty());
    assert!(undo.undo().is_some());
    assert!(first.is_empty());
    assert!(!undo.can_undo());
    assert!(undo.undo().is_none());
    assert_eq!(undo.redo_stack(), vec![d1, d2, d1]);

    assert!(undo.redo().is_some());
    assert_eq!(first.to_vec(), vec![1]);
    assert!(second.is_empty());
    assert!(undo.redo().is_some());
    assert_eq!(second.to_vec(), vec![2]);
    assert!(undo.redo().is_some());
    assert_eq!(first.to_vec(), vec![1, 3]);
    assert!(!undo.can_redo());
    assert_eq!(undo.undo_stack(), vec![d1, d2, d1]);
}

#[test]
fn test_undo_restores_key_value_state() {
    let (_doc, kv) = kv_replica(1);
    let log = ChangeLog::attach(&kv);
    let undo = MultiDocUndoManager::new(unmerged_options());
    undo.add_to_scope([kv.array().clone()]).unwrap();

    kv.set("k", "a".to_string()).unwrap();
    kv.set("k", "b".to_string()).unwrap();
    assert_eq!(undo.undo_stack().len(), 2);

    assert!(undo.undo().is_some());
    assert_eq!(kv.get("k").as_deref(), Some("a"));
    assert_eq!(kv.array().len(), 1);
    let undone = log.last("k").unwrap();
    assert_eq!(undone.old_value().map(String::as_str), Some("b"));
    assert_eq!(undone.new_value().map(String::as_str), Some("a"));

    assert!(undo.redo().is_some());
    assert_eq!(kv.get("k").as_deref(), Some("b"));

    assert!(undo.undo().is_some());
    assert!(undo.undo().is_some());
    assert!(!kv.has("k"));
    assert!(kv.array().is_empty());
}

#[test]
fn test_items_without_effect_are_skipped() {
    let (undo, first, second) = two_docs(unmerged_options());
    push(&first, 1);
    push(&second, 2);

    // A peer replica of the second document removes the element; the change
    // arrives as a remote update and is not captured.
    let peer: Doc<i32> = replica(3);
    sync_into(second.doc(), &peer);
    let peer_numbers = peer.get_array("numbers");
    peer.transact(|txn| peer_numbers.delete(txn, 0, 1)).unwrap();
    sync_into(&peer, second.doc());
    assert!(second.is_empty());
    assert_eq!(undo.undo_stack().len(), 2);

    assert!(undo.undo().is_some());
    assert!(first.is_empty());
    assert!(!undo.can_undo());
    assert_eq!(undo.redo_stack(), vec![first.doc().id()]);
}

#[test]
fn test_destroyed_document_leaves_the_history() {
    let (undo, first, second) = two_docs(unmerged_options());
    push(&first, 1);
    push(&second, 2);
    push(&first, 3);

    first.doc().destroy();
    assert_eq!(undo.undo_stack(), vec![second.doc().id()]);
    assert_eq!(undo.docs(), vec![second.doc().id()]);
    assert!(undo.manager(first.doc().id()).is_none());

    assert!(undo.undo().is_some());
    assert!(second.is_empty());
    assert_eq!(first.to_vec(), vec![1, 3]);
}

#[test]
fn test_forwarded_events_carry_document_and_meta() {
    let (undo, first, second) = two_docs(unmerged_options());
    let added = Recorder::<DocStackItemEvent>::new();
    let popped = Recorder::<DocStackItemEvent>::new();
    let _added_sub = undo.observe_stack_item_added(added.callback());
    let _popped_sub = undo.observe_stack_item_popped(popped.callback());
    let _cursor_sub = undo.observe_stack_item_added(|event: &DocStackItemEvent| {
        if event.event.kind == StackKind::Undo {
            event.event.stack_item.set_meta("cursor", json!(7));
        }
    });

    push(&second, 5);
    let added = added.events();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].doc, second.doc().id());
    assert_eq!(added[0].event.kind, StackKind::Undo);
    assert!(added[0].event.changed_parent_types.contains("numbers"));
    assert_eq!(added[0].event.origin, None);

    let item = undo.undo().unwrap();
    assert_eq!(item.meta("cursor"), Some(json!(7)));
    let popped = popped.events();
    assert_eq!(popped.len(), 1);
    assert_eq!(popped[0].doc, second.doc().id());
    assert_eq!(popped[0].event.kind, StackKind::Undo);
    assert!(popped[0].event.stack_item.ptr_eq(&item));
    let manager = undo.manager(second.doc().id()).unwrap();
    assert_eq!(popped[0].event.origin.as_ref(), Some(manager.origin()));
    assert!(first.is_empty());
}

#[test]
fn test_clear_resets_requested_stacks() {
    let (undo, first, second) = two_docs(unmerged_options());
    let cleared = Recorder::<StackCleared>::new();
    let _sub = undo.observe_stack_cleared(cleared.callback());

    push(&first, 1);
    push(&second, 2);
    undo.undo().unwrap();
    assert_eq!(undo.undo_stack(), vec![first.doc().id()]);
    assert_eq!(undo.redo_stack(), vec![second.doc().id()]);

    undo.clear(true, false);
    assert!(!undo.can_undo());
    assert!(undo.can_redo());
    assert_eq!(
        cleared.events(),
        vec![StackCleared {
            undo_stack_cleared: true,
            redo_stack_cleared: false,
        }]
    );
    let manager = undo.manager(first.doc().id()).unwrap();
    assert!(!manager.can_undo());

    // Nothing left to clear on the undo side.
    undo.clear(true, false);
    assert_eq!(cleared.len(), 1);

    assert!(undo.redo().is_some());
    assert_eq!(second.to_vec(), vec![2]);
}

#[test]
fn test_new_edit_clears_redo_everywhere() {
    let (undo, first, second) = two_docs(unmerged_options());
    push(&first, 1);
    push(&second, 2);
    undo.undo().unwrap();
    undo.undo().unwrap();
    assert_eq!(undo.redo_stack().len(), 2);

    push(&first, 9);
    assert!(!undo.can_redo());
    for doc in undo.docs() {
        assert!(!undo.manager(doc).unwrap().can_redo());
    }
    assert_eq!(undo.undo_stack(), vec![first.doc().id()]);
}

#[test]
fn test_stop_capturing_starts_a_new_item() {
    let (undo, first, second) = two_docs(UndoOptions::default().with_capture_timeout(60_000));
    let updated = Recorder::<DocStackItemEvent>::new();
    let _sub = undo.observe_stack_item_updated(updated.callback());

    push(&first, 1);
    push(&first, 2);
    assert_eq!(undo.undo_stack().len(), 1);
    assert_eq!(updated.len(), 1);

    undo.stop_capturing();
    push(&first, 3);
    push(&second, 4);
    assert_eq!(undo.undo_stack().len(), 3);

    assert!(undo.undo().is_some());
    assert!(second.is_empty());
    assert!(undo.undo().is_some());
    assert_eq!(first.to_vec(), vec![1, 2]);
    assert!(undo.undo().is_some());
    assert!(first.is_empty());
}

#[test]
fn test_only_tracked_origins_are_captured() {
    let (undo, first, _second) =
        two_docs(unmerged_options().with_tracked_origins([]).track_origin("toolbar"));

    push(&first, 1);
    first
        .doc()
        .transact_with("sync", |txn| first.push(txn, 2))
        .unwrap();
    assert!(!undo.can_undo());

    first
        .doc()
        .transact_with("toolbar", |txn| first.push(txn, 3))
        .unwrap();
    assert_eq!(undo.undo_stack().len(), 1);

    assert!(undo.undo().is_some());
    assert_eq!(first.to_vec(), vec![1, 2]);
    assert!(undo.redo().is_some());
    assert_eq!(first.to_vec(), vec![1, 2, 3]);
}
