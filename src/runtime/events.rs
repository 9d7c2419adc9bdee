//! Runtime event stream payloads.

use crate::types::{OpSeq, TodoId};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A new todo was added.
    Added {
        /// Added todo id.
        id: TodoId,
    },
    /// An existing todo was updated.
    Updated {
        /// Updated todo id.
        id: TodoId,
    },
    /// A todo was deleted.
    Deleted {
        /// Deleted todo id.
        id: TodoId,
    },
    /// An atomic batch was applied in full.
    BatchCommitted {
        /// Sequence of the batch op.
        op_seq: OpSeq,
        /// Number of writes in the batch.
        writes: usize,
    },
    /// Persistence has reached at least this op sequence.
    DurableUpTo {
        /// Highest sequence known durable.
        op_seq: OpSeq,
    },
    /// A journal append failed; the ops stay queued and are retried.
    JournalStalled {
        /// Ops waiting for the journal.
        queued: usize,
    },
}
