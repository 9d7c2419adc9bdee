//! Rank assignment for drag-and-drop moves and new-item placement.
//!
//! Ranks are advisory. A move rewrites the whole list to contiguous ranks
//! `0..n`; placing a new item at the head only picks a rank below the current
//! minimum so no other document is touched.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{
    op::BatchWrite,
    todo::{TodoPatch, TodoRecord},
    types::{Rank, TodoId},
};

/// A move that does not fit the current list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReorderError {
    /// A sorted position past the end of the list.
    #[error("position {position} is out of range for a list of {len}")]
    PositionOutOfRange {
        /// Offending position.
        position: usize,
        /// List length.
        len: usize,
    },
    /// The moved item or anchor is not in the list.
    #[error("todo {0} is not in the list")]
    UnknownTodo(TodoId),
}

/// A drag gesture, resolved against the rank-sorted list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveInstruction {
    /// Splice the item at sorted position `from` into sorted position `to`.
    Position {
        /// Current sorted position.
        from: usize,
        /// Target sorted position.
        to: usize,
    },
    /// Drop `moved` immediately before (or after) `anchor`.
    Anchor {
        /// Item the drop is relative to.
        anchor: TodoId,
        /// Item being dragged.
        moved: TodoId,
        /// Drop above `anchor` rather than below it.
        before: bool,
    },
}

/// New rank for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankAssignment {
    /// Document to update.
    pub id: TodoId,
    /// Its new rank.
    pub index: Rank,
}

/// Where freshly added items land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Above every existing item.
    #[default]
    Top,
    /// Below every existing item.
    Bottom,
}

impl Placement {
    /// Rank for a new item given the current list.
    pub fn rank_for_new(self, todos: &[TodoRecord]) -> Rank {
        match self {
            Placement::Top => prepend_rank(todos),
            Placement::Bottom => append_rank(todos),
        }
    }
}

/// Sorts ascending by rank, breaking ties by id.
pub fn sort_by_rank(todos: &mut [TodoRecord]) {
    todos.sort_by(rank_order);
}

fn rank_order(a: &TodoRecord, b: &TodoRecord) -> Ordering {
    a.index.cmp(&b.index).then(a.id.cmp(&b.id))
}

/// Rank that sorts strictly before every existing item.
pub fn prepend_rank(todos: &[TodoRecord]) -> Rank {
    todos
        .iter()
        .map(|t| t.index)
        .min()
        .map_or(0, |min| min.saturating_sub(1))
}

/// Rank that sorts strictly after every existing item.
pub fn append_rank(todos: &[TodoRecord]) -> Rank {
    todos
        .iter()
        .map(|t| t.index)
        .max()
        .map_or(0, |max| max.saturating_add(1))
}

/// Computes the ranks that realise `instruction`.
///
/// Only documents whose rank actually changes are returned. An empty result
/// means the move is a no-op and nothing should be written.
pub fn plan_move(
    todos: &[TodoRecord],
    instruction: &MoveInstruction,
) -> Result<Vec<RankAssignment>, ReorderError> {
    let mut working: Vec<&TodoRecord> = todos.iter().collect();
    working.sort_by(|a, b| rank_order(a, b));
    let len = working.len();
    if len <= 1 {
        return Ok(Vec::new());
    }

    let (from, to) = match *instruction {
        MoveInstruction::Position { from, to } => {
            for position in [from, to] {
                if position >= len {
                    return Err(ReorderError::PositionOutOfRange { position, len });
                }
            }
            (from, to)
        }
        MoveInstruction::Anchor {
            anchor,
            moved,
            before,
        } => {
            let from = position_of(&working, moved)?;
            let anchor_at = position_of(&working, anchor)?;
            if anchor == moved {
                return Ok(Vec::new());
            }
            // Anchor position as seen after `moved` has been taken out.
            let anchor_after_removal = if from < anchor_at { anchor_at - 1 } else { anchor_at };
            let to = if before {
                anchor_after_removal
            } else {
                anchor_after_removal + 1
            };
            (from, to)
        }
    };

    if from == to {
        return Ok(Vec::new());
    }

    let moved = working.remove(from);
    working.insert(to, moved);

    Ok(working
        .iter()
        .enumerate()
        .filter_map(|(rank, todo)| {
            let index = rank as Rank;
            (todo.index != index).then_some(RankAssignment { id: todo.id, index })
        })
        .collect())
}

/// Stages one rank update per assignment.
pub fn reorder_batch(assignments: &[RankAssignment]) -> Vec<BatchWrite> {
    assignments
        .iter()
        .map(|a| BatchWrite::update(a.id, TodoPatch::index(a.index)))
        .collect()
}

fn position_of(working: &[&TodoRecord], id: TodoId) -> Result<usize, ReorderError> {
    working
        .iter()
        .position(|t| t.id == id)
        .ok_or(ReorderError::UnknownTodo(id))
}
