//! Row types returned by the read surface.
//!
//! Uses runtime types rather than compile-time checked types to avoid
//! requiring a live database during builds.

use serde::{Deserialize, Serialize};

/// A row from the `event` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRow {
    /// Tick the event belongs to.
    pub tick: i64,
    /// Zero-based position within the tick.
    pub slot: i32,
    /// Event type discriminator.
    pub event_type: String,
    /// Raw event payload.
    pub payload: serde_json::Value,
}

/// A row from the `object_rev` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RevisionRow {
    /// Tick that wrote this revision.
    pub tick: i64,
    /// Slot of the event that wrote this revision.
    pub slot: i32,
    /// Object type.
    pub object_type: String,
    /// Object identifier.
    pub object_id: String,
    /// New value, `None` for a deletion.
    pub payload: Option<serde_json::Value>,
}

/// A row from the `quarantined_event` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct QuarantineRow {
    /// Tick of the set-aside event.
    pub tick: i64,
    /// Slot of the set-aside event.
    pub slot: i32,
    /// Type of the set-aside event.
    pub event_type: String,
    /// Why the event could not be applied.
    pub reason: String,
}
