//! In-memory object store.
//!
//! [`MemoryStore`] implements the same [`TickStore`]/[`TickBackend`] seams as
//! `PostgreSQL` with snapshot isolation: a transaction sees the state that
//! was committed when it began plus its own writes, and its rows become
//! visible to others only on commit. Used by tests and local runs without a
//! database.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use objectdb_types::{EventEnvelope, ObjectKey};
use serde_json::Value;

use crate::backend::{TickBackend, TickStore};
use crate::error::{db_slot, db_tick, tick_from_db, DbError, InvariantViolation};
use crate::rows::{EventRow, QuarantineRow, RevisionRow};
use crate::transaction::TickTransaction;

/// Everything a memory store holds. Also used as a transaction's private
/// write set.
#[derive(Debug, Clone, Default)]
struct MemoryState {
    ticks: BTreeSet<u64>,
    events: Vec<EventRow>,
    revisions: Vec<RevisionRow>,
    quarantined: Vec<QuarantineRow>,
    published: Vec<u64>,
}

impl MemoryState {
    fn latest(&self, key: &ObjectKey) -> Option<&RevisionRow> {
        self.revisions
            .iter()
            .filter(|rev| rev.object_type == key.object_type && rev.object_id == key.object_id)
            .max_by_key(|rev| (rev.tick, rev.slot))
    }

    fn has_event(&self, tick: i64, slot: i32) -> bool {
        self.events.iter().any(|e| e.tick == tick && e.slot == slot)
    }
}

/// Shared in-memory store. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Event rows of `tick`, ordered by slot.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::OutOfRange`] if `tick` does not fit a `BIGINT`.
    pub fn events_at(&self, tick: u64) -> Result<Vec<EventRow>, DbError> {
        let tick = db_tick(tick)?;
        let mut rows: Vec<EventRow> = self
            .lock()
            .events
            .iter()
            .filter(|e| e.tick == tick)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.slot);
        Ok(rows)
    }

    /// Object revision rows of `tick`, ordered by slot.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::OutOfRange`] if `tick` does not fit a `BIGINT`.
    pub fn revisions_at(&self, tick: u64) -> Result<Vec<RevisionRow>, DbError> {
        let tick = db_tick(tick)?;
        let mut rows: Vec<RevisionRow> = self
            .lock()
            .revisions
            .iter()
            .filter(|r| r.tick == tick)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (a.slot, &a.object_type, &a.object_id).cmp(&(b.slot, &b.object_type, &b.object_id))
        });
        Ok(rows)
    }

    /// Latest committed value of `key`, `None` if missing or deleted.
    ///
    /// # Errors
    ///
    /// Infallible for the memory store; the signature mirrors `PostgreSQL`.
    pub fn latest_value(&self, key: &ObjectKey) -> Result<Option<Value>, DbError> {
        Ok(self.lock().latest(key).and_then(|rev| rev.payload.clone()))
    }

    /// All quarantined events in `(tick, slot)` order.
    pub fn quarantined(&self) -> Vec<QuarantineRow> {
        let mut rows = self.lock().quarantined.clone();
        rows.sort_by_key(|q| (q.tick, q.slot));
        rows
    }

    /// Ticks whose change notification was delivered, in commit order.
    pub fn published_ticks(&self) -> Vec<u64> {
        self.lock().published.clone()
    }
}

impl TickStore for MemoryStore {
    type Backend = MemoryBackend;

    async fn local_tick(&self) -> Result<u64, DbError> {
        Ok(self.lock().ticks.last().copied().unwrap_or(0))
    }

    async fn begin(&self) -> Result<TickTransaction<MemoryBackend>, DbError> {
        let snapshot = self.lock().clone();
        Ok(TickTransaction::new(MemoryBackend {
            shared: Arc::clone(&self.state),
            snapshot,
            pending: MemoryState::default(),
        }))
    }
}

/// A transaction against a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryBackend {
    shared: Arc<Mutex<MemoryState>>,
    snapshot: MemoryState,
    pending: MemoryState,
}

impl TickBackend for MemoryBackend {
    async fn insert_tick_marker(&mut self, tick: u64) -> Result<(), DbError> {
        if self.snapshot.ticks.contains(&tick) || !self.pending.ticks.insert(tick) {
            return Err(InvariantViolation::DuplicateTick { tick }.into());
        }
        Ok(())
    }

    async fn insert_event(
        &mut self,
        tick: u64,
        slot: u32,
        event: &EventEnvelope,
    ) -> Result<(), DbError> {
        let (db_t, db_s) = (db_tick(tick)?, db_slot(slot)?);
        if self.snapshot.has_event(db_t, db_s) || self.pending.has_event(db_t, db_s) {
            return Err(InvariantViolation::DuplicateEvent { tick, slot }.into());
        }
        self.pending.events.push(EventRow {
            tick: db_t,
            slot: db_s,
            event_type: event.event_type.clone(),
            payload: event.data.clone(),
        });
        Ok(())
    }

    async fn load_latest(&mut self, key: &ObjectKey) -> Result<Option<Value>, DbError> {
        let latest = self
            .pending
            .latest(key)
            .or_else(|| self.snapshot.latest(key));
        Ok(latest.and_then(|rev| rev.payload.clone()))
    }

    async fn insert_revision(
        &mut self,
        tick: u64,
        slot: u32,
        key: &ObjectKey,
        payload: Option<&Value>,
    ) -> Result<(), DbError> {
        let (db_t, db_s) = (db_tick(tick)?, db_slot(slot)?);
        let duplicate = self.pending.revisions.iter().any(|rev| {
            rev.tick == db_t
                && rev.slot == db_s
                && rev.object_type == key.object_type
                && rev.object_id == key.object_id
        });
        if duplicate {
            return Err(InvariantViolation::DoubleWrite {
                tick,
                slot,
                key: key.clone(),
            }
            .into());
        }
        self.pending.revisions.push(RevisionRow {
            tick: db_t,
            slot: db_s,
            object_type: key.object_type.clone(),
            object_id: key.object_id.clone(),
            payload: payload.cloned(),
        });
        Ok(())
    }

    async fn insert_quarantine(
        &mut self,
        tick: u64,
        slot: u32,
        event_type: &str,
        reason: &str,
    ) -> Result<(), DbError> {
        self.pending.quarantined.push(QuarantineRow {
            tick: db_tick(tick)?,
            slot: db_slot(slot)?,
            event_type: event_type.to_owned(),
            reason: reason.to_owned(),
        });
        Ok(())
    }

    async fn publish_tick(&mut self, tick: u64) -> Result<(), DbError> {
        self.pending.published.push(tick);
        Ok(())
    }

    async fn commit(self) -> Result<(), DbError> {
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);

        // A concurrent transaction may have committed the same tick since
        // this one began.
        if let Some(&tick) = self.pending.ticks.intersection(&shared.ticks).next() {
            return Err(InvariantViolation::DuplicateTick { tick }.into());
        }
        for row in &self.pending.events {
            if shared.has_event(row.tick, row.slot) {
                return Err(InvariantViolation::DuplicateEvent {
                    tick: tick_from_db(row.tick)?,
                    slot: u32::try_from(row.slot)
                        .map_err(|e| DbError::OutOfRange(format!("slot {}: {e}", row.slot)))?,
                }
                .into());
            }
        }

        let MemoryState {
            ticks,
            events,
            revisions,
            quarantined,
            published,
        } = self.pending;
        shared.ticks.extend(ticks);
        shared.events.extend(events);
        shared.revisions.extend(revisions);
        shared.quarantined.extend(quarantined);
        shared.published.extend(published);
        Ok(())
    }

    async fn rollback(self) -> Result<(), DbError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::transaction::ObjectStore;

    async fn commit_tick(store: &MemoryStore, tick: u64, writes: &[(&str, Option<Value>)]) {
        let mut trx = store.begin().await.unwrap();
        trx.set_tick(tick).await.unwrap();
        for (slot, (id, value)) in writes.iter().enumerate() {
            let slot = u32::try_from(slot).unwrap();
            trx.record_event(slot, &EventEnvelope::new("ping", json!({})))
                .await
                .unwrap();
            trx.change(ObjectKey::new("counter", *id), value.clone())
                .await
                .unwrap();
        }
        trx.publish().await.unwrap();
        trx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn local_tick_tracks_highest_marker() {
        let store = MemoryStore::new();
        assert_eq!(store.local_tick().await.unwrap(), 0);
        commit_tick(&store, 1, &[("a", Some(json!({"count": 1})))]).await;
        commit_tick(&store, 2, &[]).await;
        assert_eq!(store.local_tick().await.unwrap(), 2);
        assert_eq!(store.published_ticks(), vec![1, 2]);
    }

    #[tokio::test]
    async fn latest_revision_wins() {
        let store = MemoryStore::new();
        commit_tick(&store, 1, &[("a", Some(json!({"count": 1})))]).await;
        commit_tick(
            &store,
            2,
            &[("b", Some(json!({"count": 5}))), ("a", Some(json!({"count": 2})))],
        )
        .await;
        let key = ObjectKey::new("counter", "a");
        assert_eq!(
            store.latest_value(&key).unwrap(),
            Some(json!({"count": 2}))
        );
    }

    #[tokio::test]
    async fn revisions_are_listed_by_slot() {
        let store = MemoryStore::new();
        commit_tick(
            &store,
            1,
            &[("z", Some(json!({"count": 1}))), ("a", None)],
        )
        .await;
        let rows = store.revisions_at(1).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.object_id.as_str()).collect();
        assert_eq!(ids, ["z", "a"]);
        assert_eq!(rows.last().unwrap().payload, None);
    }

    #[tokio::test]
    async fn duplicate_tick_marker_is_rejected() {
        let store = MemoryStore::new();
        commit_tick(&store, 1, &[]).await;
        let mut trx = store.begin().await.unwrap();
        let err = trx.set_tick(1).await.unwrap_err();
        assert_eq!(
            err.invariant(),
            Some(&InvariantViolation::DuplicateTick { tick: 1 })
        );
    }

    #[tokio::test]
    async fn concurrent_commit_of_same_tick_is_rejected() {
        let store = MemoryStore::new();
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.set_tick(1).await.unwrap();
        second.set_tick(1).await.unwrap();
        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert_eq!(
            err.invariant(),
            Some(&InvariantViolation::DuplicateTick { tick: 1 })
        );
    }
}
