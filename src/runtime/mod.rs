//! Single-writer async runtime, live queries, and event stream APIs.

/// Config-driven startup with journal replay.
pub mod connect;
/// Event stream types emitted by the runtime.
pub mod events;
/// Handle and command loop implementation.
pub mod handle;
mod journal;
/// Live query and callback listener handles.
pub mod live;
