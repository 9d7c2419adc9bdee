//! Pure planners that turn user gestures into atomic batches.

/// Complete-all and clear planners.
pub mod bulk;
/// Reordering algorithm and new-item rank rules.
pub mod reorder;
