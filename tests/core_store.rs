use proptest::prelude::*;

use livetodo::{
    core::store::{StoreError, TodoStore},
    op::BatchWrite,
    todo::{QueryFilter, TodoDraft, TodoPatch},
    types::UserId,
};

fn draft(content: &str, index: i64, author: &str) -> TodoDraft {
    TodoDraft::new(content, index, Some(UserId::new(author)))
}

#[test]
fn insert_yields_monotonic_ids_and_seqs() {
    let mut store = TodoStore::new();
    let (id1, op1) = store.insert(draft("a", 0, "u1")).unwrap();
    let (id2, op2) = store.insert(draft("b", -1, "u1")).unwrap();
    let (id3, op3) = store.insert(draft("c", -2, "u1")).unwrap();

    assert_eq!((id1, id2, id3), (1, 2, 3));
    assert_eq!((op1.seq, op2.seq, op3.seq), (1, 2, 3));
    assert!(!store.get(id1).unwrap().completed);
}

#[test]
fn write_one_merges_only_given_fields() {
    let mut store = TodoStore::new();
    let (id, _) = store.insert(draft("buy milk", 4, "u1")).unwrap();

    store.patch(id, TodoPatch::completed(true)).unwrap();
    let rec = store.get(id).unwrap();
    assert!(rec.completed);
    assert_eq!(rec.content, "buy milk");
    assert_eq!(rec.index, 4);
    assert_eq!(rec.author, Some(UserId::new("u1")));

    store.patch(id, TodoPatch::content("buy oat milk")).unwrap();
    let rec = store.get(id).unwrap();
    assert_eq!(rec.content, "buy oat milk");
    assert!(rec.completed);
}

#[test]
fn patch_and_delete_reject_unknown_or_empty() {
    let mut store = TodoStore::new();
    let (id, _) = store.insert(draft("a", 0, "u1")).unwrap();

    assert_eq!(
        store.patch(99, TodoPatch::completed(true)).unwrap_err(),
        StoreError::MissingTodo(99)
    );
    assert_eq!(
        store.patch(id, TodoPatch::default()).unwrap_err(),
        StoreError::EmptyPatch(id)
    );
    assert_eq!(store.delete(99).unwrap_err(), StoreError::MissingTodo(99));
    assert_eq!(store.latest_op_seq(), 1);
}

#[test]
fn failed_batch_leaves_every_document_untouched() {
    let mut store = TodoStore::new();
    let mut ids = Vec::new();
    for (i, content) in ["x", "y", "z"].into_iter().enumerate() {
        let (id, _) = store.insert(draft(content, i as i64, "u1")).unwrap();
        ids.push(id);
    }
    let before = store.query(&QueryFilter::all());
    let seq_before = store.latest_op_seq();

    let writes = vec![
        BatchWrite::update(ids[2], TodoPatch::index(0)),
        BatchWrite::update(ids[0], TodoPatch::index(1)),
        BatchWrite::update(404, TodoPatch::index(2)),
        BatchWrite::delete(ids[1]),
    ];
    assert_eq!(store.write_batch(writes).unwrap_err(), StoreError::MissingTodo(404));

    assert_eq!(store.query(&QueryFilter::all()), before);
    assert_eq!(store.latest_op_seq(), seq_before);
}

#[test]
fn batch_rejects_write_after_delete_and_empty_batches() {
    let mut store = TodoStore::new();
    let (id, _) = store.insert(draft("a", 0, "u1")).unwrap();

    let writes = vec![BatchWrite::delete(id), BatchWrite::update(id, TodoPatch::completed(true))];
    assert_eq!(store.write_batch(writes).unwrap_err(), StoreError::WriteAfterDelete(id));
    assert!(store.get(id).is_some());

    assert_eq!(store.write_batch(Vec::new()).unwrap_err(), StoreError::EmptyBatch);
}

#[test]
fn successful_batch_applies_as_one_op() {
    let mut store = TodoStore::new();
    let (a, _) = store.insert(draft("a", 0, "u1")).unwrap();
    let (b, _) = store.insert(draft("b", 1, "u1")).unwrap();
    let (c, _) = store.insert(draft("c", 2, "u1")).unwrap();

    let stored = store
        .write_batch(vec![
            BatchWrite::update(a, TodoPatch::completed(true)),
            BatchWrite::delete(b),
            BatchWrite::update(c, TodoPatch::index(-5)),
        ])
        .unwrap();

    assert_eq!(stored.seq, 4);
    assert_eq!(store.latest_op_seq(), 4);
    assert!(store.get(a).unwrap().completed);
    assert!(store.get(b).is_none());
    let ids: Vec<_> = store.query(&QueryFilter::all()).iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![c, a]);
}

#[test]
fn author_filter_scopes_queries() {
    let mut store = TodoStore::new();
    let (a1, _) = store.insert(draft("mine", 0, "alice")).unwrap();
    let (_b1, _) = store.insert(draft("theirs", 0, "bob")).unwrap();
    let (a2, _) = store.insert(draft("mine too", -1, "alice")).unwrap();
    let (_anon, _) = store.insert(TodoDraft::new("nobody", 0, None)).unwrap();

    let alice: Vec<_> = store
        .query(&QueryFilter::by_author(UserId::new("alice")))
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(alice, vec![a2, a1]);
    assert_eq!(store.query(&QueryFilter::all()).len(), 4);

    store.delete(a2).unwrap();
    let alice: Vec<_> = store
        .query(&QueryFilter::by_author(UserId::new("alice")))
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(alice, vec![a1]);
    assert!(store.query(&QueryFilter::by_author(UserId::new("carol"))).is_empty());
}

#[test]
fn snapshot_export_round_trips() {
    let mut store = TodoStore::new();
    let (a, _) = store.insert(draft("a", 0, "u1")).unwrap();
    store.insert(draft("b", 1, "u2")).unwrap();
    store.delete(a).unwrap();

    let exported = store.export_snapshot();
    let restored = TodoStore::from_snapshot(exported.clone()).unwrap();
    assert_eq!(restored.export_snapshot(), exported);
    assert_eq!(restored.latest_op_seq(), store.latest_op_seq());
    assert_eq!(
        restored.query(&QueryFilter::by_author(UserId::new("u2"))),
        store.query(&QueryFilter::by_author(UserId::new("u2")))
    );
}

fn batch_write() -> impl Strategy<Value = BatchWrite> {
    (1u64..8, 0u8..3, -5i64..5).prop_map(|(id, kind, rank)| match kind {
        0 => BatchWrite::update(id, TodoPatch::index(rank)),
        1 => BatchWrite::update(id, TodoPatch::completed(rank % 2 == 0)),
        _ => BatchWrite::delete(id),
    })
}

proptest! {
    #[test]
    fn batches_apply_fully_or_not_at_all(writes in prop::collection::vec(batch_write(), 0..6)) {
        let mut store = TodoStore::new();
        for i in 0..5i64 {
            store.insert(draft("t", i, "u1")).unwrap();
        }
        let before = store.export_snapshot();

        let mut expected = TodoStore::from_snapshot(before.clone()).unwrap();
        let mut serial_ok = !writes.is_empty();
        for w in &writes {
            let res = match &w.kind {
                livetodo::op::WriteKind::Update(patch) => expected.patch(w.id, patch.clone()).map(|_| ()),
                livetodo::op::WriteKind::Delete => expected.delete(w.id).map(|_| ()),
            };
            if res.is_err() {
                serial_ok = false;
                break;
            }
        }

        match store.write_batch(writes) {
            Ok(_) => {
                prop_assert!(serial_ok);
                prop_assert_eq!(store.query(&QueryFilter::all()), expected.query(&QueryFilter::all()));
            }
            Err(_) => {
                prop_assert!(!serial_ok);
                prop_assert_eq!(store.export_snapshot(), before);
            }
        }
    }
}
