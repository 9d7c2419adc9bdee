//! Op journal seam and its SQLite implementation.

/// SQLite-backed journal.
pub mod sqlite;

use crate::{
    core::store::{StoreError, StoreSnapshotV1},
    op::StoredOp,
    types::OpSeq,
};

/// Journal failures.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// SQLite rejected a statement.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A payload could not be encoded or decoded.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// The journal was created for another project or collection.
    #[error("journal belongs to {found}, expected {expected}")]
    ForeignJournal {
        /// Namespace the caller asked for.
        expected: String,
        /// Namespace recorded in the journal.
        found: String,
    },
    /// An op would leave a hole in the journal's seq range.
    #[error("journal expected op {expected}, got {found}")]
    SeqGap {
        /// Next seq the journal can accept.
        expected: OpSeq,
        /// Seq that was offered.
        found: OpSeq,
    },
    /// A payload was written by an incompatible version.
    #[error("unsupported {what} format version {version}")]
    UnsupportedFormat {
        /// Payload kind.
        what: &'static str,
        /// Version found on disk.
        version: u16,
    },
    /// Journal metadata is unreadable.
    #[error("corrupt journal: {0}")]
    Corrupt(String),
    /// A journaled op no longer applies to the replayed store.
    #[error("replay: {0}")]
    Replay(#[from] StoreError),
    /// The journal queue has no room for another op.
    #[error("journal queue is full")]
    QueueFull,
    /// The journal worker lost its sink.
    #[error("journal worker failed: {0}")]
    Worker(String),
}

/// Result alias for journal operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Destination for committed ops. Calls happen off the writer task.
pub trait OpSink: Send {
    /// Appends `ops`, which must continue the journal's seq range without a
    /// gap. Returns the new durable seq.
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq>;

    /// Records `snapshot` as covering every op up to `last_seq`. With
    /// `compact`, the covered ops are dropped. Returns how many were dropped.
    fn checkpoint(
        &mut self,
        _snapshot: &StoreSnapshotV1,
        _last_seq: OpSeq,
        _compact: bool,
    ) -> PersistResult<usize> {
        Ok(0)
    }
}
