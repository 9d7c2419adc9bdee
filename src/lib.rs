//! Live, multi-session todo lists over a single-writer document store.
//!
//! # Examples
//!
//! Ranking and reordering with the pure planners:
//! ```
//! use livetodo::{
//!     core::store::TodoStore,
//!     plan::reorder::{plan_move, prepend_rank, reorder_batch, MoveInstruction},
//!     todo::{QueryFilter, TodoDraft},
//! };
//!
//! let mut store = TodoStore::new();
//! for content in ["x", "y", "z"] {
//!     let index = prepend_rank(&store.query(&QueryFilter::all()));
//!     store.insert(TodoDraft::new(content, index, None)).expect("insert");
//! }
//!
//! let todos = store.query(&QueryFilter::all());
//! let plan = plan_move(&todos, &MoveInstruction::Position { from: 2, to: 0 }).expect("plan");
//! store.write_batch(reorder_batch(&plan)).expect("batch");
//!
//! let order: Vec<String> = store
//!     .query(&QueryFilter::all())
//!     .into_iter()
//!     .map(|t| t.content)
//!     .collect();
//! assert_eq!(order, ["x", "z", "y"]);
//! ```
//!
//! Runtime usage with a live view:
//! ```no_run
//! use livetodo::{
//!     app::TodoApp,
//!     auth::{FixedIdentityProvider, Session, User},
//!     config::AppConfig,
//!     runtime::connect::connect,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = AppConfig::default();
//! let store = connect(&config).expect("connect");
//! let provider = FixedIdentityProvider::accepting(User::new("uid-1"));
//! let mut app = TodoApp::new(store.clone(), Session::new(), provider, config.placement);
//!
//! app.start().await.expect("start");
//! app.sign_in().await.expect("sign in");
//! app.set_input("buy milk");
//! app.add().await.expect("add");
//! assert_eq!(app.todos().len(), 1);
//! app.sign_out().await;
//! store.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Presentation binding for user intents and views.
pub mod app;
/// Identity provider seam and session state.
pub mod auth;
/// Static connection and application configuration.
pub mod config;
/// Core in-memory store and index helpers.
pub mod core;
/// Mutation op model and persistence wrapper types.
pub mod op;
/// Persistence abstraction and SQLite implementation.
pub mod persist;
/// Batch planners for reordering and bulk edits.
pub mod plan;
/// Single-writer runtime handle, live queries, and events.
pub mod runtime;
/// Todo documents, patches, and query types.
pub mod todo;
/// Shared primitive types.
pub mod types;
