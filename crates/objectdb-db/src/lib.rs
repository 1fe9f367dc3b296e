//! Data layer for the ObjectDB event-sourced object store.
//!
//! Events arrive one tick at a time. Each tick is applied in a single
//! serializable transaction that writes the tick marker, the raw events,
//! and the append-only object revisions computed by the rules, then
//! publishes the tick on a notification channel before committing.
//!
//! # Architecture
//!
//! ```text
//! ReplicationLoop
//!     |
//!     +-- TickStore::begin ----> TickTransaction<B: TickBackend>
//!             |-- set_tick / record_event   (ordering rules enforced here)
//!             |-- fetch / change            (read cache, one write per slot)
//!             +-- publish / commit
//!
//! Backends: PostgresPool -> PgTickBackend, MemoryStore -> MemoryBackend
//! Readers:  ObjectReader (committed state only)
//! ```
//!
//! # Modules
//!
//! - [`backend`] -- [`TickBackend`] and [`TickStore`] seams
//! - [`transaction`] -- [`TickTransaction`] and the [`ObjectStore`] view
//! - [`postgres`] -- `PostgreSQL` pool, configuration, and backend
//! - [`memory`] -- In-memory store with snapshot isolation
//! - [`reader`] -- Read surface over committed state
//! - [`rows`] -- Row types returned by readers
//! - [`error`] -- Shared error types

pub mod backend;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod reader;
pub mod rows;
pub mod transaction;

// Re-export primary types for convenience.
pub use backend::{TickBackend, TickStore};
pub use error::{DbError, InvariantViolation};
pub use memory::{MemoryBackend, MemoryStore};
pub use postgres::{PgTickBackend, PostgresConfig, PostgresPool, DEFAULT_NOTIFY_CHANNEL};
pub use reader::ObjectReader;
pub use rows::{EventRow, QuarantineRow, RevisionRow};
pub use transaction::{ObjectStore, TickTransaction};
