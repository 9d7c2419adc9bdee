//! Whole-list mutations planned from a snapshot.
//!
//! Planners only see the snapshot they are handed. Documents created after
//! it was taken are never part of the resulting batch.

use crate::{
    op::BatchWrite,
    todo::{TodoPatch, TodoSnapshot},
};

/// Marks every open item in `snapshot` completed.
pub fn plan_complete_all(snapshot: &TodoSnapshot) -> Vec<BatchWrite> {
    snapshot
        .todos
        .iter()
        .filter(|t| !t.completed)
        .map(|t| BatchWrite::update(t.id, TodoPatch::completed(true)))
        .collect()
}

/// Deletes every item in `snapshot`.
pub fn plan_clear_all(snapshot: &TodoSnapshot) -> Vec<BatchWrite> {
    snapshot
        .todos
        .iter()
        .map(|t| BatchWrite::delete(t.id))
        .collect()
}

/// Deletes the completed items in `snapshot`.
pub fn plan_clear_completed(snapshot: &TodoSnapshot) -> Vec<BatchWrite> {
    snapshot
        .todos
        .iter()
        .filter(|t| t.completed)
        .map(|t| BatchWrite::delete(t.id))
        .collect()
}
