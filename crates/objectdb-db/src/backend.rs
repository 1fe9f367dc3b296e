//! Storage seams for the transactional store.
//!
//! [`TickBackend`] is the raw, per-transaction I/O a [`TickTransaction`]
//! drives: it knows how to write rows and look up the latest revision, but
//! enforces none of the ordering rules. [`TickStore`] opens transactions and
//! reports the local tick. Both are implemented for `PostgreSQL`
//! ([`crate::postgres`]) and for the in-memory store ([`crate::memory`]).

use std::future::Future;

use objectdb_types::{EventEnvelope, ObjectKey};
use serde_json::Value;

use crate::error::DbError;
use crate::transaction::TickTransaction;

/// Raw row I/O inside one open transaction.
pub trait TickBackend: Send {
    /// Insert the tick marker row.
    fn insert_tick_marker(&mut self, tick: u64) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Insert one raw event row.
    fn insert_event(
        &mut self,
        tick: u64,
        slot: u32,
        event: &EventEnvelope,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Load the materialized value of an object: the payload of its
    /// revision with the greatest `(tick, slot)`, `None` when there is no
    /// revision or the latest one is a deletion.
    fn load_latest(
        &mut self,
        key: &ObjectKey,
    ) -> impl Future<Output = Result<Option<Value>, DbError>> + Send;

    /// Append one object revision.
    fn insert_revision(
        &mut self,
        tick: u64,
        slot: u32,
        key: &ObjectKey,
        payload: Option<&Value>,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Record that the event at `(tick, slot)` was set aside.
    fn insert_quarantine(
        &mut self,
        tick: u64,
        slot: u32,
        event_type: &str,
        reason: &str,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Queue the change notification for `tick`. Delivered on commit.
    fn publish_tick(&mut self, tick: u64) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Make every write of this transaction durable and visible.
    fn commit(self) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Discard every write of this transaction.
    fn rollback(self) -> impl Future<Output = Result<(), DbError>> + Send;
}

/// A store the replication loop can write ticks into.
pub trait TickStore: Send + Sync {
    /// The per-transaction backend this store hands out.
    type Backend: TickBackend;

    /// Highest tick with a committed marker, `0` if none.
    fn local_tick(&self) -> impl Future<Output = Result<u64, DbError>> + Send;

    /// Open a new serializable transaction.
    fn begin(&self) -> impl Future<Output = Result<TickTransaction<Self::Backend>, DbError>> + Send;
}
