use std::{path::Path, time::Duration};

use rusqlite::ffi;
use tempfile::TempDir;

use livetodo::{
    config::AppConfig,
    core::store::TodoStore,
    op::{BatchWrite, StoredOp},
    persist::{sqlite::SqliteOpSink, OpSink, PersistError, PersistResult},
    runtime::{
        connect::{connect, ConnectError},
        events::StoreEvent,
        handle::{spawn_todo_store, RuntimeConfig, RuntimeError},
    },
    todo::{QueryFilter, TodoDraft, TodoPatch},
    types::{OpSeq, UserId},
};

fn draft(content: &str, index: i64) -> TodoDraft {
    TodoDraft::new(content, index, Some(UserId::new("u1")))
}

#[test]
fn sqlite_replay_round_trips_state_and_order() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("todos.db");

    let mut store = TodoStore::new();
    let mut sink = SqliteOpSink::open(&db_path).expect("open sqlite");

    let (a, _) = store.insert(draft("x", 0)).expect("insert a");
    let (b, _) = store.insert(draft("y", 1)).expect("insert b");
    let (c, _) = store.insert(draft("z", 2)).expect("insert c");
    store.patch(a, TodoPatch::content("x2")).expect("patch");
    store
        .write_batch(vec![
            BatchWrite::update(c, TodoPatch::index(0)),
            BatchWrite::update(a, TodoPatch::index(1)),
            BatchWrite::update(b, TodoPatch::completed(true)),
        ])
        .expect("batch");
    store.delete(b).expect("delete");

    let ops = store.drain_pending_ops();
    assert_eq!(ops.len(), 6);
    sink.append_ops(&ops).expect("append");

    drop(sink);

    let sink2 = SqliteOpSink::open(&db_path).expect("reopen");
    let replayed = sink2.load_store().expect("replay");

    assert_eq!(replayed.export_snapshot(), store.export_snapshot());
    assert_eq!(
        replayed.query(&QueryFilter::all()),
        store.query(&QueryFilter::all())
    );
}

#[test]
fn snapshot_and_compaction_preserve_replay() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("snap.db");

    let mut store = TodoStore::new();
    let mut sink = SqliteOpSink::open(&db_path).expect("open sqlite");

    for i in 0..10i64 {
        store.insert(draft(&format!("item {i}"), -i)).expect("insert");
    }
    sink.append_ops(&store.drain_pending_ops()).expect("append");

    let snapshot = store.export_snapshot();
    let last_seq = store.latest_op_seq();
    let removed = sink.checkpoint(&snapshot, last_seq, true).expect("checkpoint");
    assert_eq!(removed, 10);
    assert_eq!(sink.durable_seq().expect("durable"), 10);

    let (tail, _) = store.insert(draft("after snapshot", 100)).expect("insert");
    sink.append_ops(&store.drain_pending_ops()).expect("append tail");

    drop(sink);

    let reopened = SqliteOpSink::open(&db_path).expect("reopen");
    let replayed = reopened.load_store().expect("replay");

    assert_eq!(replayed.export_snapshot(), store.export_snapshot());
    assert!(replayed.get(tail).is_some());
}

#[test]
fn journal_refuses_a_foreign_namespace() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("ns.db");

    let mut sink = SqliteOpSink::open(&db_path).expect("open");
    sink.claim_namespace("proj-a/todos").expect("claim");
    sink.claim_namespace("proj-a/todos").expect("same namespace again");
    drop(sink);

    let mut sink = SqliteOpSink::open(&db_path).expect("reopen");
    let err = sink.claim_namespace("proj-b/todos").unwrap_err();
    assert!(matches!(err, PersistError::ForeignJournal { .. }));
}

#[tokio::test]
async fn connect_replays_journaled_runtime_state() {
    let tmp = TempDir::new().expect("tmp");
    let config = AppConfig {
        journal_path: Some(tmp.path().join("live.db")),
        ..AppConfig::default()
    };

    let handle = connect(&config).expect("connect");
    let a = handle.add(draft("kept", 0)).await.expect("add");
    let b = handle.add(draft("dropped", -1)).await.expect("add");
    handle
        .write_batch(vec![
            BatchWrite::update(a, TodoPatch::completed(true)),
            BatchWrite::delete(b),
        ])
        .await
        .expect("batch");
    handle.checkpoint().await.expect("checkpoint");
    handle.add(draft("tail", 5)).await.expect("add");
    assert_eq!(handle.flush().await.expect("flush"), 4);
    handle.shutdown().await.expect("shutdown");

    let handle = connect(&config).expect("reconnect");
    let snap = handle.query(QueryFilter::all()).await.expect("query");
    let contents: Vec<&str> = snap.todos.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, ["kept", "tail"]);
    assert!(snap.get(a).expect("kept").completed);

    let next = handle.add(draft("fresh", 9)).await.expect("add");
    assert!(next > a && next > b, "ids are never reused after replay");
    handle.shutdown().await.expect("shutdown");

    let other = AppConfig {
        journal_path: config.journal_path.clone(),
        connection: livetodo::config::ConnectionConfig {
            project_id: "someone-else".to_string(),
            ..Default::default()
        },
        ..AppConfig::default()
    };
    assert!(matches!(
        connect(&other),
        Err(ConnectError::Persist(PersistError::ForeignJournal { .. }))
    ));
}

fn disk_full() -> PersistError {
    PersistError::Sqlite(rusqlite::Error::SqliteFailure(
        ffi::Error::new(ffi::SQLITE_FULL),
        None,
    ))
}

/// SQLite journal whose first `failures` appends are refused.
struct FlakySink {
    inner: SqliteOpSink,
    failures: usize,
}

impl FlakySink {
    fn open(path: &Path, failures: usize) -> Self {
        Self {
            inner: SqliteOpSink::open(path).expect("open sqlite"),
            failures,
        }
    }
}

impl OpSink for FlakySink {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(disk_full());
        }
        self.inner.append_ops(ops)
    }
}

#[tokio::test]
async fn failed_append_is_retried_and_replays_cleanly() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("flaky.db");

    let sink = FlakySink::open(&db_path, 1);
    let handle = spawn_todo_store(TodoStore::new(), Some(Box::new(sink)), RuntimeConfig::default());
    let mut events = handle.events();

    let id = handle.add(draft("buy milk", 0)).await.expect("add");
    handle
        .write_one(id, TodoPatch::completed(true))
        .await
        .expect("write_one");

    let stalled = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            match events.recv().await.expect("recv") {
                StoreEvent::JournalStalled { queued } => break queued,
                StoreEvent::DurableUpTo { op_seq } => panic!("op {op_seq} reported durable early"),
                _ => {}
            }
        }
    })
    .await
    .expect("stall reported");
    assert!(stalled >= 1);

    assert_eq!(handle.flush().await.expect("flush retries"), 2);
    handle.shutdown().await.expect("shutdown");

    let reopened = SqliteOpSink::open(&db_path).expect("reopen");
    assert_eq!(reopened.durable_seq().expect("durable"), 2);
    let replayed = reopened.load_store().expect("replay");
    assert_eq!(replayed.latest_op_seq(), 2);
    let todo = replayed.get(id).expect("todo replayed");
    assert_eq!(todo.content, "buy milk");
    assert!(todo.completed);
}

#[tokio::test]
async fn unwritable_journal_surfaces_on_flush_and_shutdown() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("dead.db");

    let sink = FlakySink::open(&db_path, usize::MAX);
    let handle = spawn_todo_store(TodoStore::new(), Some(Box::new(sink)), RuntimeConfig::default());

    let id = handle.add(draft("never lands", 0)).await.expect("add");
    assert!(handle.get(id).await.expect("get").is_some());

    assert!(matches!(
        handle.flush().await,
        Err(RuntimeError::Persist(PersistError::Sqlite(_)))
    ));
    assert!(matches!(
        handle.shutdown().await,
        Err(RuntimeError::Persist(_))
    ));

    let reopened = SqliteOpSink::open(&db_path).expect("reopen");
    assert_eq!(reopened.durable_seq().expect("durable"), 0);
    assert!(reopened.load_store().expect("replay").is_empty());
}

#[test]
fn journal_rejects_appends_that_skip_a_seq() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("gap.db");

    let mut store = TodoStore::new();
    store.insert(draft("a", 0)).expect("insert");
    store.insert(draft("b", 1)).expect("insert");
    store.insert(draft("c", 2)).expect("insert");
    let ops = store.drain_pending_ops();

    let mut sink = SqliteOpSink::open(&db_path).expect("open");
    let err = sink.append_ops(&ops[1..]).unwrap_err();
    assert!(matches!(err, PersistError::SeqGap { expected: 1, found: 2 }));

    let holed = [ops[0].clone(), ops[2].clone()];
    let err = sink.append_ops(&holed).unwrap_err();
    assert!(matches!(err, PersistError::SeqGap { expected: 2, found: 3 }));
    assert_eq!(sink.durable_seq().expect("durable"), 0);

    // Nothing from the rejected batches stuck around.
    assert_eq!(sink.append_ops(&ops).expect("append"), 3);
    assert_eq!(sink.load_store().expect("replay").export_snapshot(), store.export_snapshot());
}
