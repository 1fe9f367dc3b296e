//! HTTP read surface for ObjectDB.
//!
//! Serves the current tick, tick waits, the rows written at a tick, and
//! the latest value of an object. Handlers only read: tick state comes
//! from the [`objectdb_core::ChangeMonitor`], object state from an
//! [`objectdb_db::ObjectReader`]. The engine starts this surface only once
//! replication has caught up.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
