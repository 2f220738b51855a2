//! codetrace: a persistent, incremental source-code index and query engine
//! for TypeScript-family source trees.
//!
//! The public entry point is [`Session`]; everything else is an internal
//! collaborator it composes (scanner, processor, writer, coordinator,
//! dependency graph, ownership arbiter, health monitor).

pub mod boundaries;
pub mod bus;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod graph;
pub mod graph_cache;
pub mod hash;
pub mod health;
pub mod logging;
pub mod model;
pub mod move_tracker;
pub mod parse_cache;
pub mod parsing;
pub mod processor;
pub mod report;
pub mod scanner;
pub mod session;
pub mod store;
pub mod tsconfig;
pub mod types;
pub mod watcher;
pub mod writer;

pub use config::Settings;
pub use error::{ErrorKind, IndexError, IndexResult};
pub use report::IndexReport;
pub use session::{CallbackHandle, Role, Session};
pub use store::StoreStats;
