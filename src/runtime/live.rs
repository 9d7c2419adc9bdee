//! Cancellable live queries over the todo collection.

use std::sync::Arc;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::debug;

use crate::todo::{QueryFilter, TodoSnapshot};

use super::handle::{Command, RuntimeError, SubscriptionId};

/// A standing query that yields the full result set after every change.
///
/// Readers that fall behind skip straight to the newest snapshot. Closing or
/// dropping the query unregisters it from the writer.
pub struct LiveQuery {
    id: SubscriptionId,
    filter: QueryFilter,
    rx: watch::Receiver<Arc<TodoSnapshot>>,
    cmd_tx: mpsc::Sender<Command>,
    delivered_initial: bool,
    closed: bool,
}

impl LiveQuery {
    pub(crate) fn new(
        id: SubscriptionId,
        filter: QueryFilter,
        rx: watch::Receiver<Arc<TodoSnapshot>>,
        cmd_tx: mpsc::Sender<Command>,
    ) -> Self {
        Self {
            id,
            filter,
            rx,
            cmd_tx,
            delivered_initial: false,
            closed: false,
        }
    }

    /// Registration id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Filter this query was opened with.
    pub fn filter(&self) -> &QueryFilter {
        &self.filter
    }

    /// Latest confirmed snapshot, without waiting.
    pub fn current(&self) -> Arc<TodoSnapshot> {
        Arc::clone(&self.rx.borrow())
    }

    /// False once the store runtime has gone away. The last snapshot is then stale.
    pub fn is_live(&self) -> bool {
        self.rx.has_changed().is_ok()
    }

    /// Waits for the next snapshot. The first call returns immediately with
    /// the state at subscription time. `None` means the runtime stopped.
    pub async fn next(&mut self) -> Option<Arc<TodoSnapshot>> {
        if !self.delivered_initial {
            self.delivered_initial = true;
            return Some(Arc::clone(&self.rx.borrow_and_update()));
        }
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update()))
    }

    /// Unregisters the query. Nothing is delivered afterwards.
    pub async fn close(mut self) -> Result<(), RuntimeError> {
        self.closed = true;
        self.cmd_tx
            .send(Command::Unsubscribe { id: self.id })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Runs `on_snapshot` for every snapshot on a background task.
    pub fn listen<F>(mut self, mut on_snapshot: F) -> Listener
    where
        F: FnMut(&TodoSnapshot) + Send + 'static,
    {
        let id = self.id;
        let task = tokio::spawn(async move {
            while let Some(snapshot) = self.next().await {
                on_snapshot(&snapshot);
            }
            debug!(subscription = self.id, "live query ended");
        });
        Listener { id, task }
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.cmd_tx.try_send(Command::Unsubscribe { id: self.id });
        }
    }
}

/// Callback-driven live query. Aborted on drop.
pub struct Listener {
    id: SubscriptionId,
    task: JoinHandle<()>,
}

impl Listener {
    /// Registration id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stops the callback. Once this returns the callback will not run again.
    pub async fn close(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.task.abort();
    }
}
