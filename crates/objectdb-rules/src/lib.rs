//! Declarative event rules for ObjectDB.
//!
//! Each declared event type maps to a pure handler in [`rules`] that builds
//! an [`Action`] tree. The [`interpreter`] walks that tree against an
//! [`objectdb_db::ObjectStore`], performing the reads and writes it
//! describes. Keeping handlers free of I/O is what makes replay
//! deterministic.

pub mod action;
pub mod interpreter;
pub mod rules;

pub use action::{Action, Fetch, NOT_FOUND};
pub use interpreter::{InterpretError, finalize, process_event};
