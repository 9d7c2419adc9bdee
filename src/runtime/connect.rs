use tracing::info;

use crate::{
    config::{AppConfig, ConfigError},
    core::store::TodoStore,
    persist::{sqlite::SqliteOpSink, OpSink, PersistError},
};

use super::handle::{spawn_todo_store, TodoStoreHandle};

/// Startup failures.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The journal could not be opened, claimed or replayed.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Validates `config`, replays the journal if one is configured, and spawns
/// the store runtime. Must be called inside a tokio runtime.
pub fn connect(config: &AppConfig) -> Result<TodoStoreHandle, ConnectError> {
    config.validate()?;
    let namespace = config.connection.namespace();

    let (store, sink) = match &config.journal_path {
        Some(path) => {
            let mut sink = SqliteOpSink::open(path)?;
            sink.claim_namespace(&namespace)?;
            let store = sink.load_store()?;
            info!(
                namespace = %namespace,
                path = %path.display(),
                todos = store.len(),
                op_seq = store.latest_op_seq(),
                "journal replayed"
            );
            (store, Some(Box::new(sink) as Box<dyn OpSink>))
        }
        None => {
            info!(namespace = %namespace, "using in-memory todo collection");
            (TodoStore::new(), None)
        }
    };

    Ok(spawn_todo_store(store, sink, config.runtime.clone()))
}
