//! Journal worker: moves committed ops into an [`OpSink`] off the writer task.
//!
//! Ops reach the sink strictly in seq order. An append that fails keeps its
//! ops queued, and they are retried with backoff ahead of anything newer, so
//! the durable seq only ever covers a gap-free prefix of the op log.

use tokio::{
    sync::{mpsc, oneshot},
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    core::store::{StoreSnapshotV1, TodoStore},
    op::{Op, StoredOp},
    persist::{OpSink, PersistError},
    types::OpSeq,
};

use super::handle::{RuntimeConfig, RuntimeError};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// What the worker tells the writer after each append attempt.
pub(crate) enum JournalReport {
    Durable(OpSeq),
    Failed { queued: usize, error: String },
}

enum JournalMsg {
    Op(StoredOp),
    Flush {
        resp: oneshot::Sender<Result<OpSeq, PersistError>>,
    },
    Checkpoint {
        snapshot: StoreSnapshotV1,
        last_seq: OpSeq,
        compact: bool,
        resp: oneshot::Sender<Result<usize, PersistError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<OpSeq, PersistError>>,
    },
}

/// Writer-side end of the journal.
pub(crate) struct Journal {
    tx: mpsc::Sender<JournalMsg>,
    compact_after_snapshot: bool,
    snapshot_every_ops: usize,
    ops_since_snapshot: usize,
}

/// Room for one op in the journal queue, taken before the store is touched.
pub(crate) struct JournalSlot<'a>(mpsc::Permit<'a, JournalMsg>);

impl JournalSlot<'_> {
    pub(crate) fn send(self, op: StoredOp) {
        self.0.send(JournalMsg::Op(op));
    }
}

impl Journal {
    /// Starts the worker. `durable` is the last seq the sink already holds.
    pub(crate) fn spawn(
        sink: Box<dyn OpSink>,
        durable: OpSeq,
        config: &RuntimeConfig,
    ) -> (Self, mpsc::UnboundedReceiver<JournalReport>) {
        let (tx, rx) = mpsc::channel(config.persist_queue_bound);
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let worker = JournalWorker {
            sink: Some(sink),
            queued: Vec::new(),
            durable,
            failures: 0,
            batch_max_ops: config.batch_max_ops.max(1),
            flush_on_insert: config.flush_on_insert,
            latency: Duration::from_millis(config.batch_max_latency_ms),
            report_tx,
        };
        tokio::spawn(worker.run(rx));

        let journal = Self {
            tx,
            compact_after_snapshot: config.compact_after_snapshot,
            snapshot_every_ops: config.snapshot_every_ops,
            ops_since_snapshot: 0,
        };
        (journal, report_rx)
    }

    pub(crate) fn reserve(&self) -> Result<JournalSlot<'_>, RuntimeError> {
        self.tx.try_reserve().map(JournalSlot).map_err(|err| match err {
            mpsc::error::TrySendError::Full(()) => RuntimeError::Persist(PersistError::QueueFull),
            mpsc::error::TrySendError::Closed(()) => RuntimeError::ChannelClosed,
        })
    }

    /// Waits until everything committed so far is durable.
    pub(crate) async fn flush(&self) -> Result<OpSeq, RuntimeError> {
        let (resp, rx) = oneshot::channel();
        self.request(JournalMsg::Flush { resp }, rx).await
    }

    pub(crate) async fn checkpoint(&mut self, store: &TodoStore) -> Result<(), RuntimeError> {
        let last_seq = store.latest_op_seq();
        let (resp, rx) = oneshot::channel();
        let msg = JournalMsg::Checkpoint {
            snapshot: store.export_snapshot(),
            last_seq,
            compact: self.compact_after_snapshot,
            resp,
        };
        let removed = self.request(msg, rx).await?;
        self.ops_since_snapshot = 0;
        info!(last_seq, removed, "checkpoint written");
        Ok(())
    }

    /// Counts one commit and checkpoints once enough have piled up.
    pub(crate) async fn committed(&mut self, store: &TodoStore) {
        self.ops_since_snapshot += 1;
        if self.snapshot_every_ops == 0 || self.ops_since_snapshot < self.snapshot_every_ops {
            return;
        }
        if let Err(err) = self.checkpoint(store).await {
            warn!(error = %err, "automatic checkpoint failed");
        }
    }

    /// Final flush; the worker stops afterwards either way.
    pub(crate) async fn shutdown(&self) -> Result<OpSeq, RuntimeError> {
        let (resp, rx) = oneshot::channel();
        self.request(JournalMsg::Shutdown { resp }, rx).await
    }

    async fn request<T>(
        &self,
        msg: JournalMsg,
        rx: oneshot::Receiver<Result<T, PersistError>>,
    ) -> Result<T, RuntimeError> {
        self.tx.send(msg).await.map_err(|_| RuntimeError::ChannelClosed)?;
        let out = rx.await.map_err(|_| RuntimeError::ChannelClosed)?;
        Ok(out?)
    }
}

struct JournalWorker {
    // `None` only if a blocking call panicked and took the sink with it.
    sink: Option<Box<dyn OpSink>>,
    queued: Vec<StoredOp>,
    durable: OpSeq,
    failures: u32,
    batch_max_ops: usize,
    flush_on_insert: bool,
    latency: Duration,
    report_tx: mpsc::UnboundedSender<JournalReport>,
}

impl JournalWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<JournalMsg>) {
        let mut deadline = Instant::now() + self.latency;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        let _ = self.flush().await;
                        break;
                    };
                    match msg {
                        JournalMsg::Op(op) => {
                            let is_insert = matches!(op.op, Op::Insert { .. });
                            if self.queued.is_empty() {
                                deadline = Instant::now() + self.latency;
                            }
                            self.queued.push(op);

                            // While failing, only the retry timer touches the sink.
                            let due = self.queued.len() >= self.batch_max_ops
                                || (self.flush_on_insert && is_insert);
                            if due && self.failures == 0 {
                                let _ = self.flush().await;
                                deadline = self.next_attempt();
                            }
                        }
                        JournalMsg::Flush { resp } => {
                            let _ = resp.send(self.flush().await);
                            deadline = self.next_attempt();
                        }
                        JournalMsg::Checkpoint { snapshot, last_seq, compact, resp } => {
                            let out = self.checkpoint(snapshot, last_seq, compact).await;
                            let _ = resp.send(out);
                            deadline = self.next_attempt();
                        }
                        JournalMsg::Shutdown { resp } => {
                            let _ = resp.send(self.flush().await);
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !self.queued.is_empty() => {
                    let _ = self.flush().await;
                    deadline = self.next_attempt();
                }
            }
        }

        if self.queued.is_empty() {
            debug!(durable = self.durable, "journal worker stopped");
        } else {
            warn!(
                durable = self.durable,
                lost = self.queued.len(),
                "journal worker stopped with unjournaled ops"
            );
        }
    }

    /// Appends everything queued. On failure the ops stay queued, in order.
    async fn flush(&mut self) -> Result<OpSeq, PersistError> {
        if self.queued.is_empty() {
            return Ok(self.durable);
        }

        let batch = self.queued.clone();
        match self.on_sink(move |sink| sink.append_ops(&batch)).await {
            Ok(durable) => {
                if self.failures > 0 {
                    info!(durable, attempts = self.failures + 1, "journal recovered");
                }
                debug!(durable, ops = self.queued.len(), "journal appended");
                self.queued.clear();
                self.durable = durable;
                self.failures = 0;
                let _ = self.report_tx.send(JournalReport::Durable(durable));
                Ok(durable)
            }
            Err(err) => {
                self.failures = self.failures.saturating_add(1);
                let _ = self.report_tx.send(JournalReport::Failed {
                    queued: self.queued.len(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn checkpoint(
        &mut self,
        snapshot: StoreSnapshotV1,
        last_seq: OpSeq,
        compact: bool,
    ) -> Result<usize, PersistError> {
        // A snapshot must never run ahead of the ops before it.
        self.flush().await?;
        self.on_sink(move |sink| sink.checkpoint(&snapshot, last_seq, compact))
            .await
    }

    /// Runs `f` against the sink on the blocking pool.
    async fn on_sink<T, F>(&mut self, f: F) -> Result<T, PersistError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn OpSink) -> Result<T, PersistError> + Send + 'static,
    {
        let mut sink = self
            .sink
            .take()
            .ok_or_else(|| PersistError::Worker("sink lost".to_string()))?;
        let (sink, out) = tokio::task::spawn_blocking(move || {
            let out = f(sink.as_mut());
            (sink, out)
        })
        .await
        .map_err(|err| PersistError::Worker(err.to_string()))?;
        self.sink = Some(sink);
        out
    }

    fn next_attempt(&self) -> Instant {
        let delay = match self.failures {
            0 => self.latency,
            n => self
                .latency
                .max(Duration::from_millis(10))
                .saturating_mul(1 << n.min(10))
                .min(MAX_RETRY_DELAY),
        };
        Instant::now() + delay
    }
}
