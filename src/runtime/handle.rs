use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::{
    core::store::{StoreError, TodoStore},
    op::{BatchWrite, StoredOp},
    persist::{OpSink, PersistError},
    todo::{QueryFilter, TodoDraft, TodoPatch, TodoRecord, TodoSnapshot},
    types::{OpSeq, TodoId},
};

use super::{
    events::StoreEvent,
    journal::{Journal, JournalReport},
    live::LiveQuery,
};

/// Errors returned through a [`TodoStoreHandle`].
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The store rejected the mutation; nothing was applied.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The journal could not take or persist the mutation.
    #[error(transparent)]
    Persist(#[from] PersistError),
    /// The runtime task has stopped.
    #[error("store runtime is not running")]
    ChannelClosed,
}

/// Journal batching and checkpoint tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Append immediately whenever an insert is queued.
    pub flush_on_insert: bool,
    /// Append once this many ops are queued.
    pub batch_max_ops: usize,
    /// Longest an op waits in the queue before it is appended.
    pub batch_max_latency_ms: u64,
    /// Ops that may wait for the journal before commits are refused.
    pub persist_queue_bound: usize,
    /// Commits between automatic checkpoints; `0` disables them.
    pub snapshot_every_ops: usize,
    /// Drop journaled ops once a checkpoint covers them.
    pub compact_after_snapshot: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_on_insert: true,
            batch_max_ops: 32,
            batch_max_latency_ms: 75,
            persist_queue_bound: 64,
            snapshot_every_ops: 2000,
            compact_after_snapshot: false,
        }
    }
}

/// Identifier of a registered live query.
pub type SubscriptionId = u64;

/// Cloneable handle to the single-writer store runtime.
#[derive(Clone)]
pub struct TodoStoreHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<StoreEvent>,
}

pub(crate) enum Command {
    Add {
        draft: TodoDraft,
        resp: oneshot::Sender<Result<TodoId, RuntimeError>>,
    },
    WriteOne {
        id: TodoId,
        patch: TodoPatch,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Delete {
        id: TodoId,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    WriteBatch {
        writes: Vec<BatchWrite>,
        resp: oneshot::Sender<Result<OpSeq, RuntimeError>>,
    },
    Get {
        id: TodoId,
        resp: oneshot::Sender<Option<TodoRecord>>,
    },
    Query {
        filter: QueryFilter,
        resp: oneshot::Sender<TodoSnapshot>,
    },
    Subscribe {
        filter: QueryFilter,
        resp: oneshot::Sender<(SubscriptionId, watch::Receiver<Arc<TodoSnapshot>>)>,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Flush {
        resp: oneshot::Sender<Result<OpSeq, RuntimeError>>,
    },
    Checkpoint {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

struct Subscriber {
    filter: QueryFilter,
    tx: watch::Sender<Arc<TodoSnapshot>>,
}

/// Everything owned by the writer task.
struct WriterState {
    store: TodoStore,
    journal: Option<Journal>,
    subscribers: HashMap<SubscriptionId, Subscriber>,
    next_subscription_id: SubscriptionId,
    events_tx: broadcast::Sender<StoreEvent>,
}

impl WriterState {
    /// Runs one mutation against the store and hands its op to the journal.
    ///
    /// The journal slot is reserved before the store is touched, so a full
    /// journal queue rejects the mutation without applying any of it.
    fn commit<T>(
        &mut self,
        apply: impl FnOnce(&mut TodoStore) -> Result<(T, StoredOp), StoreError>,
    ) -> Result<(T, StoredOp), RuntimeError> {
        let (out, stored) = {
            let slot = match &self.journal {
                Some(journal) => Some(journal.reserve()?),
                None => None,
            };

            let (out, stored) = apply(&mut self.store)?;
            // The journal worker owns durability; the store's own buffer is unused here.
            self.store.drain_pending_ops();

            match slot {
                Some(slot) => slot.send(stored.clone()),
                None => {
                    let _ = self.events_tx.send(StoreEvent::DurableUpTo {
                        op_seq: stored.seq,
                    });
                }
            }
            (out, stored)
        };

        self.publish();
        Ok((out, stored))
    }

    /// Bookkeeping after a successful commit.
    async fn committed(&mut self) {
        if let Some(journal) = self.journal.as_mut() {
            journal.committed(&self.store).await;
        }
    }

    /// Pushes a fresh snapshot to every live query whose result changed.
    fn publish(&mut self) {
        let store = &self.store;
        self.subscribers.retain(|id, sub| {
            if sub.tx.is_closed() {
                debug!(subscription = id, "dropping closed live query");
                return false;
            }
            let todos = store.query(&sub.filter);
            if sub.tx.borrow().todos != todos {
                sub.tx.send_replace(Arc::new(TodoSnapshot {
                    seq: store.latest_op_seq(),
                    todos,
                }));
            }
            true
        });
    }

    fn on_report(&self, report: JournalReport) {
        match report {
            JournalReport::Durable(op_seq) => {
                let _ = self.events_tx.send(StoreEvent::DurableUpTo { op_seq });
            }
            JournalReport::Failed { queued, error } => {
                warn!(queued, %error, "journal append failed; ops kept for retry");
                let _ = self.events_tx.send(StoreEvent::JournalStalled { queued });
            }
        }
    }
}

/// Starts the writer task for `store`, journaling to `sink` if given.
///
/// `sink` must already hold every op up to `store.latest_op_seq()`.
pub fn spawn_todo_store(
    store: TodoStore,
    sink: Option<Box<dyn OpSink>>,
    config: RuntimeConfig,
) -> TodoStoreHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);
    let (events_tx, _) = broadcast::channel::<StoreEvent>(1024);

    let (journal, mut reports) = match sink {
        Some(sink) => {
            let (journal, reports) = Journal::spawn(sink, store.latest_op_seq(), &config);
            (Some(journal), Some(reports))
        }
        None => (None, None),
    };

    info!(
        todos = store.len(),
        op_seq = store.latest_op_seq(),
        journaled = journal.is_some(),
        "todo store runtime starting"
    );

    let mut state = WriterState {
        store,
        journal,
        subscribers: HashMap::new(),
        next_subscription_id: 1,
        events_tx: events_tx.clone(),
    };

    tokio::spawn(async move {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    if handle_command(cmd, &mut state).await {
                        break;
                    }
                }
                report = next_report(&mut reports) => match report {
                    Some(report) => state.on_report(report),
                    None => reports = None,
                },
            }
        }

        info!(op_seq = state.store.latest_op_seq(), "todo store runtime stopped");
    });

    TodoStoreHandle { cmd_tx, events_tx }
}

impl TodoStoreHandle {
    /// Raw commit/durability event stream.
    pub fn events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events_tx.subscribe()
    }

    /// Opens a live query. The first snapshot is the state at subscription time.
    pub async fn subscribe(&self, filter: QueryFilter) -> Result<LiveQuery, RuntimeError> {
        let (id, snapshots) = self
            .request(|resp| Command::Subscribe {
                filter: filter.clone(),
                resp,
            })
            .await?;
        Ok(LiveQuery::new(id, filter, snapshots, self.cmd_tx.clone()))
    }

    /// Creates a document and returns its id.
    pub async fn add(&self, draft: TodoDraft) -> Result<TodoId, RuntimeError> {
        self.request(|resp| Command::Add { draft, resp }).await?
    }

    /// Merges `patch` into one document.
    pub async fn write_one(&self, id: TodoId, patch: TodoPatch) -> Result<(), RuntimeError> {
        self.request(|resp| Command::WriteOne { id, patch, resp }).await?
    }

    /// Removes one document.
    pub async fn delete(&self, id: TodoId) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Delete { id, resp }).await?
    }

    /// Applies `writes` all-or-nothing. Returns the batch op sequence, or
    /// `None` when there was nothing to write.
    pub async fn write_batch(&self, writes: Vec<BatchWrite>) -> Result<Option<OpSeq>, RuntimeError> {
        if writes.is_empty() {
            return Ok(None);
        }
        let seq = self.request(|resp| Command::WriteBatch { writes, resp }).await??;
        Ok(Some(seq))
    }

    /// Reads one document.
    pub async fn get(&self, id: TodoId) -> Result<Option<TodoRecord>, RuntimeError> {
        self.request(|resp| Command::Get { id, resp }).await
    }

    /// One-shot read of the filtered collection.
    pub async fn query(&self, filter: QueryFilter) -> Result<TodoSnapshot, RuntimeError> {
        self.request(|resp| Command::Query { filter, resp }).await
    }

    /// Waits until every commit so far is journaled and returns the durable
    /// seq. Fails if the journal cannot currently be written.
    pub async fn flush(&self) -> Result<OpSeq, RuntimeError> {
        self.request(|resp| Command::Flush { resp }).await?
    }

    /// Writes a snapshot of the current state to the journal.
    pub async fn checkpoint(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Checkpoint { resp }).await?
    }

    /// Flushes the journal and stops the runtime. Live queries go stale.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Shutdown { resp }).await?
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

async fn next_report(
    reports: &mut Option<mpsc::UnboundedReceiver<JournalReport>>,
) -> Option<JournalReport> {
    match reports {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_command(cmd: Command, state: &mut WriterState) -> bool {
    match cmd {
        Command::Add { draft, resp } => {
            let res = state.commit(|store| store.insert(draft)).map(|(id, _)| {
                debug!(id, "todo added");
                let _ = state.events_tx.send(StoreEvent::Added { id });
                id
            });
            if res.is_ok() {
                state.committed().await;
            }
            let _ = resp.send(res);
        }
        Command::WriteOne { id, patch, resp } => {
            let res = state
                .commit(|store| store.patch(id, patch).map(|stored| ((), stored)))
                .map(|_| {
                    let _ = state.events_tx.send(StoreEvent::Updated { id });
                });
            if res.is_ok() {
                state.committed().await;
            }
            let _ = resp.send(res);
        }
        Command::Delete { id, resp } => {
            let res = state
                .commit(|store| store.delete(id).map(|stored| ((), stored)))
                .map(|_| {
                    debug!(id, "todo deleted");
                    let _ = state.events_tx.send(StoreEvent::Deleted { id });
                });
            if res.is_ok() {
                state.committed().await;
            }
            let _ = resp.send(res);
        }
        Command::WriteBatch { writes, resp } => {
            let count = writes.len();
            let res = state
                .commit(|store| store.write_batch(writes).map(|stored| ((), stored)))
                .map(|(_, stored)| {
                    debug!(op_seq = stored.seq, writes = count, "batch committed");
                    let _ = state.events_tx.send(StoreEvent::BatchCommitted {
                        op_seq: stored.seq,
                        writes: count,
                    });
                    stored.seq
                });
            match &res {
                Ok(_) => state.committed().await,
                Err(err) => warn!(error = %err, writes = count, "batch rejected"),
            }
            let _ = resp.send(res);
        }
        Command::Get { id, resp } => {
            let _ = resp.send(state.store.get_cloned(id));
        }
        Command::Query { filter, resp } => {
            let _ = resp.send(state.store.snapshot(&filter));
        }
        Command::Subscribe { filter, resp } => {
            let id = state.next_subscription_id;
            state.next_subscription_id += 1;
            let (tx, rx) = watch::channel(Arc::new(state.store.snapshot(&filter)));
            debug!(subscription = id, author = ?filter.author, "live query opened");
            state.subscribers.insert(id, Subscriber { filter, tx });
            if resp.send((id, rx)).is_err() {
                state.subscribers.remove(&id);
            }
        }
        Command::Unsubscribe { id } => {
            if state.subscribers.remove(&id).is_some() {
                debug!(subscription = id, "live query closed");
            }
        }
        Command::Flush { resp } => {
            let out = match &state.journal {
                Some(journal) => journal.flush().await,
                None => Ok(state.store.latest_op_seq()),
            };
            let _ = resp.send(out);
        }
        Command::Checkpoint { resp } => {
            let out = match state.journal.as_mut() {
                Some(journal) => journal.checkpoint(&state.store).await,
                None => Ok(()),
            };
            let _ = resp.send(out);
        }
        Command::Shutdown { resp } => {
            let out = match state.journal.take() {
                Some(journal) => journal.shutdown().await.map(|_| ()),
                None => Ok(()),
            };
            if let Err(err) = &out {
                warn!(error = %err, "shutdown left ops unjournaled");
            }
            state.subscribers.clear();
            let _ = resp.send(out);
            return true;
        }
    }

    false
}
