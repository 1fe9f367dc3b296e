//! Shared type definitions for the ObjectDB event-sourced object store.
//!
//! This crate is the single source of truth for the data that flows between
//! the upstream event authority, the rule engine, and the object store. It
//! performs no I/O.
//!
//! # Modules
//!
//! - [`key`] -- Object identity (`object_type`, `object_id`) and the closed
//!   set of object types the rules write
//! - [`events`] -- The raw upstream event envelope and the typed domain
//!   event enum decoded from it
//! - [`objects`] -- Typed object payloads stored as revision data

pub mod events;
pub mod key;
pub mod objects;

// Re-export primary types at crate root for convenience.
pub use events::{
    BoardCreated, BoardRenamed, DomainEvent, EventEnvelope, EventParseError, Ping,
    UserEmailChanged, UserRealnameChanged, UserRegistered, UserUsernameChanged,
};
pub use key::{ObjectKey, ObjectType};
pub use objects::{
    BoardObject, CounterObject, CredentialsObject, EmailObject, UserBoardsObject, UserLinkObject,
    UserObject, UsernameObject,
};
