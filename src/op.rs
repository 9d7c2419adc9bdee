//! Mutation operation model and persistence wrappers.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::{
    todo::{TodoPatch, TodoRecord},
    types::{OpSeq, TodoId},
};

/// Version number for serialized [`StoredOpEnvelope`] payloads.
pub const OP_FORMAT_VERSION: u16 = 1;

/// Per-document operation inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteKind {
    /// Merge fields into the document.
    Update(TodoPatch),
    /// Remove the document.
    Delete,
}

/// One staged write of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWrite {
    /// Target document.
    pub id: TodoId,
    /// What to do with it.
    pub kind: WriteKind,
}

impl BatchWrite {
    /// Stages a field merge.
    pub fn update(id: TodoId, patch: TodoPatch) -> Self {
        Self {
            id,
            kind: WriteKind::Update(patch),
        }
    }

    /// Stages a delete.
    pub fn delete(id: TodoId) -> Self {
        Self {
            id,
            kind: WriteKind::Delete,
        }
    }
}

/// Immutable operation appended to the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Insert a fully materialized todo.
    Insert {
        /// Inserted record.
        todo: TodoRecord,
    },
    /// Merge fields into one todo.
    Patch {
        /// Todo id to mutate.
        id: TodoId,
        /// Forward patch.
        patch: TodoPatch,
    },
    /// Remove one todo.
    Delete {
        /// Todo id to remove.
        id: TodoId,
    },
    /// All-or-nothing group of writes.
    Batch {
        /// Writes in application order.
        writes: Vec<BatchWrite>,
    },
}

/// Journal row metadata plus operation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOp {
    /// Monotonic operation sequence.
    pub seq: OpSeq,
    /// Operation timestamp in milliseconds.
    pub ts_ms: u64,
    /// Operation body.
    pub op: Op,
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOpEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped operation.
    pub stored: StoredOp,
}

impl StoredOpEnvelope {
    /// Constructs an envelope using [`OP_FORMAT_VERSION`].
    pub fn new(stored: StoredOp) -> Self {
        Self {
            format_version: OP_FORMAT_VERSION,
            stored,
        }
    }
}

/// Wall-clock milliseconds since the Unix epoch, `0` if the clock is before it.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
