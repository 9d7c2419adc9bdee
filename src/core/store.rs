use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::{
    core::indices::VecIndex,
    op::{now_ms, BatchWrite, Op, StoredOp, WriteKind},
    plan::reorder::sort_by_rank,
    todo::{QueryFilter, TodoDraft, TodoPatch, TodoRecord, TodoSnapshot},
    types::{OpSeq, TodoId, UserId},
};

/// Why a mutation was refused. A refused mutation changes nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No document with this id.
    #[error("todo {0} not found")]
    MissingTodo(TodoId),
    /// A replayed insert reused a live id.
    #[error("todo {0} already exists")]
    AlreadyExists(TodoId),
    /// The patch sets no field.
    #[error("patch for todo {0} sets no fields")]
    EmptyPatch(TodoId),
    /// A batch touches a document it already deleted.
    #[error("batch writes todo {0} after deleting it")]
    WriteAfterDelete(TodoId),
    /// A batch op with no writes.
    #[error("batch contains no writes")]
    EmptyBatch,
}

/// Serializable image of a [`TodoStore`], used for checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshotV1 {
    /// Next id to hand out.
    pub next_todo_id: TodoId,
    /// Seq the next op will get.
    pub next_op_seq: OpSeq,
    /// Ids in creation order.
    pub order: Vec<TodoId>,
    /// Live documents.
    pub records: Vec<TodoRecord>,
}

/// The authoritative todo collection.
///
/// `order` is creation order; display order is derived from ranks at query
/// time and never stored.
#[derive(Debug, Clone, Default)]
pub struct TodoStore {
    records: HashMap<TodoId, TodoRecord>,
    order: Vec<TodoId>,
    by_author: VecIndex<UserId>,
    pending_ops: Vec<StoredOp>,
    next_op_seq: OpSeq,
    next_todo_id: TodoId,
}

impl TodoStore {
    /// Empty store. Ids and seqs start at 1.
    pub fn new() -> Self {
        Self {
            next_op_seq: 1,
            next_todo_id: 1,
            ..Self::default()
        }
    }

    /// Rebuilds a store from a checkpoint image.
    pub fn from_snapshot(snapshot: StoreSnapshotV1) -> Result<Self, StoreError> {
        let mut store = Self {
            next_todo_id: snapshot.next_todo_id,
            next_op_seq: snapshot.next_op_seq,
            order: snapshot.order,
            ..Self::default()
        };

        for rec in snapshot.records {
            if store.records.contains_key(&rec.id) {
                return Err(StoreError::AlreadyExists(rec.id));
            }
            store.insert_indices(&rec);
            store.records.insert(rec.id, rec);
        }

        let records = &store.records;
        store.order.retain(|id| records.contains_key(id));
        Ok(store)
    }

    /// Captures the current state for a checkpoint.
    pub fn export_snapshot(&self) -> StoreSnapshotV1 {
        let records = self
            .order
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect();

        StoreSnapshotV1 {
            next_todo_id: self.next_todo_id,
            next_op_seq: self.next_op_seq,
            order: self.order.clone(),
            records,
        }
    }

    /// Adds a document, stamping its id and creation time.
    pub fn insert(&mut self, draft: TodoDraft) -> Result<(TodoId, StoredOp), StoreError> {
        let id = self.next_todo_id;
        self.next_todo_id += 1;

        let todo = TodoRecord {
            id,
            content: draft.content,
            completed: draft.completed,
            index: draft.index,
            author: draft.author,
        };

        let seq = self.take_next_op_seq();
        let stored = self.apply_insert_with_seq(todo, seq)?;
        self.pending_ops.push(stored.clone());
        Ok((id, stored))
    }

    /// Merges the set fields of `patch` into one document.
    pub fn patch(&mut self, id: TodoId, patch: TodoPatch) -> Result<StoredOp, StoreError> {
        self.check_patch(id, &patch)?;
        let seq = self.take_next_op_seq();
        let stored = self.apply_patch_with_seq(id, patch, seq)?;
        self.pending_ops.push(stored.clone());
        Ok(stored)
    }

    /// Removes one document.
    pub fn delete(&mut self, id: TodoId) -> Result<StoredOp, StoreError> {
        if !self.records.contains_key(&id) {
            return Err(StoreError::MissingTodo(id));
        }
        let seq = self.take_next_op_seq();
        let stored = self.apply_delete_with_seq(id, seq)?;
        self.pending_ops.push(stored.clone());
        Ok(stored)
    }

    /// Applies every write or none of them.
    ///
    /// The whole batch is checked against current state before the first
    /// mutation, so a rejected batch leaves the store untouched.
    pub fn write_batch(&mut self, writes: Vec<BatchWrite>) -> Result<StoredOp, StoreError> {
        self.validate_batch(&writes)?;
        let seq = self.take_next_op_seq();
        let stored = self.apply_batch_with_seq(writes, seq)?;
        self.pending_ops.push(stored.clone());
        Ok(stored)
    }

    /// Checks `writes` against current state without applying them.
    pub fn validate_batch(&self, writes: &[BatchWrite]) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Err(StoreError::EmptyBatch);
        }

        let mut deleted: HashSet<TodoId> = HashSet::new();
        for write in writes {
            if deleted.contains(&write.id) {
                return Err(StoreError::WriteAfterDelete(write.id));
            }
            match &write.kind {
                WriteKind::Update(patch) => self.check_patch(write.id, patch)?,
                WriteKind::Delete => {
                    if !self.records.contains_key(&write.id) {
                        return Err(StoreError::MissingTodo(write.id));
                    }
                    deleted.insert(write.id);
                }
            }
        }
        Ok(())
    }

    /// Re-applies a journaled op. Its seq must be the next one.
    pub fn apply_replayed_op(&mut self, stored: StoredOp) -> Result<(), StoreError> {
        let seq = stored.seq;
        match stored.op {
            Op::Insert { todo } => {
                self.apply_insert_with_seq(todo, seq)?;
            }
            Op::Patch { id, patch } => {
                self.apply_patch_with_seq(id, patch, seq)?;
            }
            Op::Delete { id } => {
                self.apply_delete_with_seq(id, seq)?;
            }
            Op::Batch { writes } => {
                self.validate_batch(&writes)?;
                self.apply_batch_with_seq(writes, seq)?;
            }
        }
        Ok(())
    }

    /// Borrows one document.
    pub fn get(&self, id: TodoId) -> Option<&TodoRecord> {
        self.records.get(&id)
    }

    /// Owned copy of one document.
    pub fn get_cloned(&self, id: TodoId) -> Option<TodoRecord> {
        self.get(id).cloned()
    }

    /// Number of live documents.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` when no document is live.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Matching documents in display order.
    pub fn query(&self, filter: &QueryFilter) -> Vec<TodoRecord> {
        let mut out: Vec<TodoRecord> = match &filter.author {
            Some(author) => self
                .by_author
                .get(author)
                .into_iter()
                .flat_map(|ids| ids.iter())
                .filter_map(|id| self.records.get(id))
                .cloned()
                .collect(),
            None => self
                .order
                .iter()
                .filter_map(|id| self.records.get(id))
                .cloned()
                .collect(),
        };
        sort_by_rank(&mut out);
        out
    }

    /// Filtered result stamped with the latest seq.
    pub fn snapshot(&self, filter: &QueryFilter) -> TodoSnapshot {
        TodoSnapshot {
            seq: self.latest_op_seq(),
            todos: self.query(filter),
        }
    }

    /// Takes the ops committed since the last drain.
    pub fn drain_pending_ops(&mut self) -> Vec<StoredOp> {
        std::mem::take(&mut self.pending_ops)
    }

    /// Seq of the last applied op; `0` before any.
    pub fn latest_op_seq(&self) -> OpSeq {
        self.next_op_seq.saturating_sub(1)
    }

    fn check_patch(&self, id: TodoId, patch: &TodoPatch) -> Result<(), StoreError> {
        if !self.records.contains_key(&id) {
            return Err(StoreError::MissingTodo(id));
        }
        if patch.is_empty() {
            return Err(StoreError::EmptyPatch(id));
        }
        Ok(())
    }

    fn apply_insert_with_seq(&mut self, todo: TodoRecord, seq: OpSeq) -> Result<StoredOp, StoreError> {
        if self.records.contains_key(&todo.id) {
            return Err(StoreError::AlreadyExists(todo.id));
        }

        let id = todo.id;
        self.next_todo_id = self.next_todo_id.max(id.saturating_add(1));
        self.insert_indices(&todo);
        self.order.push(id);
        self.records.insert(id, todo.clone());

        self.bump_next_seq_from(seq);
        Ok(StoredOp {
            seq,
            ts_ms: now_ms(),
            op: Op::Insert { todo },
        })
    }

    fn apply_patch_with_seq(&mut self, id: TodoId, patch: TodoPatch, seq: OpSeq) -> Result<StoredOp, StoreError> {
        let rec = self.records.get_mut(&id).ok_or(StoreError::MissingTodo(id))?;
        patch.apply_to(rec);

        self.bump_next_seq_from(seq);
        Ok(StoredOp {
            seq,
            ts_ms: now_ms(),
            op: Op::Patch { id, patch },
        })
    }

    fn apply_delete_with_seq(&mut self, id: TodoId, seq: OpSeq) -> Result<StoredOp, StoreError> {
        self.remove_record(id)?;

        self.bump_next_seq_from(seq);
        Ok(StoredOp {
            seq,
            ts_ms: now_ms(),
            op: Op::Delete { id },
        })
    }

    // Callers validate first; nothing below may fail part way through.
    fn apply_batch_with_seq(&mut self, writes: Vec<BatchWrite>, seq: OpSeq) -> Result<StoredOp, StoreError> {
        for write in &writes {
            match &write.kind {
                WriteKind::Update(patch) => {
                    let rec = self
                        .records
                        .get_mut(&write.id)
                        .ok_or(StoreError::MissingTodo(write.id))?;
                    patch.apply_to(rec);
                }
                WriteKind::Delete => self.remove_record(write.id)?,
            }
        }

        self.bump_next_seq_from(seq);
        Ok(StoredOp {
            seq,
            ts_ms: now_ms(),
            op: Op::Batch { writes },
        })
    }

    fn remove_record(&mut self, id: TodoId) -> Result<(), StoreError> {
        let rec = self.records.remove(&id).ok_or(StoreError::MissingTodo(id))?;
        if let Some(author) = &rec.author {
            if let Some(ids) = self.by_author.get_mut(author) {
                Self::remove_from_vec_index(ids, id);
                if ids.is_empty() {
                    self.by_author.remove(author);
                }
            }
        }
        Self::remove_from_vec_index(&mut self.order, id);
        Ok(())
    }

    fn insert_indices(&mut self, rec: &TodoRecord) {
        if let Some(author) = &rec.author {
            self.by_author
                .entry(author.clone())
                .or_default()
                .push(rec.id);
        }
    }

    fn remove_from_vec_index(v: &mut Vec<TodoId>, id: TodoId) {
        if let Some(pos) = v.iter().position(|x| *x == id) {
            v.remove(pos);
        }
    }

    fn take_next_op_seq(&mut self) -> OpSeq {
        let seq = self.next_op_seq;
        self.next_op_seq += 1;
        seq
    }

    fn bump_next_seq_from(&mut self, seq: OpSeq) {
        self.next_op_seq = self.next_op_seq.max(seq.saturating_add(1));
    }
}
