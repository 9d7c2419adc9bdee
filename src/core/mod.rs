//! In-memory authoritative store and index helpers.

/// Helper index aliases.
pub mod indices;
/// Authoritative todo collection with atomic batch writes.
pub mod store;
