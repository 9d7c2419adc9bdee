//! Todo document, draft, patch, and query types.

use serde::{Deserialize, Serialize};

use crate::types::{OpSeq, Rank, TodoId, UserId};

/// Fully materialized, authoritative todo document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoRecord {
    /// Stable todo identifier.
    pub id: TodoId,
    /// Free-form item text.
    pub content: String,
    /// Completion flag.
    pub completed: bool,
    /// Display rank; documents written without one sort as rank 0.
    #[serde(default)]
    pub index: Rank,
    /// Owning user, fixed at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<UserId>,
}

/// Insert payload used to create a new [`TodoRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoDraft {
    /// Item text.
    pub content: String,
    /// Initial completion flag.
    pub completed: bool,
    /// Initial rank.
    pub index: Rank,
    /// Owning user, if any.
    pub author: Option<UserId>,
}

impl TodoDraft {
    /// Draft for a fresh, not-yet-completed item.
    pub fn new(content: impl Into<String>, index: Rank, author: Option<UserId>) -> Self {
        Self {
            content: content.into(),
            completed: false,
            index,
            author,
        }
    }
}

/// Sparse patch where each `Some` field overwrites the record value.
///
/// There is no `author` field: ownership is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TodoPatch {
    /// Optional replacement text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Optional replacement completion flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    /// Optional replacement rank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<Rank>,
}

impl TodoPatch {
    /// Patch that only sets the completion flag.
    pub fn completed(value: bool) -> Self {
        Self {
            completed: Some(value),
            ..Self::default()
        }
    }

    /// Patch that only replaces the text.
    pub fn content(value: impl Into<String>) -> Self {
        Self {
            content: Some(value.into()),
            ..Self::default()
        }
    }

    /// Patch that only moves the item to a new rank.
    pub fn index(value: Rank) -> Self {
        Self {
            index: Some(value),
            ..Self::default()
        }
    }

    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies this patch in place to `rec`.
    pub fn apply_to(&self, rec: &mut TodoRecord) {
        if let Some(v) = &self.content {
            rec.content = v.clone();
        }
        if let Some(v) = self.completed {
            rec.completed = v;
        }
        if let Some(v) = self.index {
            rec.index = v;
        }
    }
}

/// Document selector for queries and live subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct QueryFilter {
    /// Restrict to documents owned by this user.
    pub author: Option<UserId>,
}

impl QueryFilter {
    /// Matches every document in the collection.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches documents owned by `author`.
    pub fn by_author(author: UserId) -> Self {
        Self {
            author: Some(author),
        }
    }

    /// Returns true when `rec` satisfies the filter.
    pub fn matches(&self, rec: &TodoRecord) -> bool {
        match &self.author {
            Some(author) => rec.author.as_ref() == Some(author),
            None => true,
        }
    }
}

/// Full, rank-sorted result set of a query at one point in the op stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TodoSnapshot {
    /// Latest op sequence reflected in `todos`.
    pub seq: OpSeq,
    /// Matching documents, ascending by `(index, id)`.
    pub todos: Vec<TodoRecord>,
}

impl TodoSnapshot {
    /// Number of documents in the snapshot.
    pub fn len(&self) -> usize {
        self.todos.len()
    }

    /// True when the snapshot holds no documents.
    pub fn is_empty(&self) -> bool {
        self.todos.is_empty()
    }

    /// Looks up a document by id.
    pub fn get(&self, id: TodoId) -> Option<&TodoRecord> {
        self.todos.iter().find(|t| t.id == id)
    }

    /// Ids in display order.
    pub fn ids(&self) -> Vec<TodoId> {
        self.todos.iter().map(|t| t.id).collect()
    }
}
