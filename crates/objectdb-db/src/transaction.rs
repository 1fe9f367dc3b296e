//! The transactional object store.
//!
//! A [`TickTransaction`] binds one atomic unit of work to one tick. It
//! writes the tick marker and the raw event rows, gives the rule
//! interpreter a cached view of object state through [`ObjectStore`], and
//! enforces the write-ordering rules of the store:
//!
//! - the tick marker is set exactly once, before anything else
//! - event slots run `0..n-1` with no gaps
//! - each object is written at most once per slot
//!
//! Breaking any of these yields [`InvariantViolation`]; the transaction must
//! then be rolled back.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use objectdb_types::{EventEnvelope, ObjectKey};
use serde_json::Value;

use crate::backend::TickBackend;
use crate::error::{DbError, InvariantViolation};

/// Object reads and writes as seen by the rule interpreter.
pub trait ObjectStore: Send {
    /// The current value of `key`: committed state as of the start of the
    /// transaction plus this transaction's own writes. `None` means missing.
    fn fetch(
        &mut self,
        key: &ObjectKey,
    ) -> impl Future<Output = Result<Option<Value>, DbError>> + Send;

    /// Append a revision of `key` at the current `(tick, slot)`. `None`
    /// deletes the object.
    fn change(
        &mut self,
        key: ObjectKey,
        value: Option<Value>,
    ) -> impl Future<Output = Result<(), DbError>> + Send;
}

/// One tick's unit of work against a [`TickBackend`].
#[derive(Debug)]
pub struct TickTransaction<B> {
    backend: B,
    tick: Option<u64>,
    slot: Option<u32>,
    /// Last observed value per object, from reads or own writes.
    cache: HashMap<ObjectKey, Option<Value>>,
    /// Objects already written in the current slot.
    slot_writes: HashSet<ObjectKey>,
}

impl<B: TickBackend> TickTransaction<B> {
    /// Wrap a freshly opened backend transaction.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            tick: None,
            slot: None,
            cache: HashMap::new(),
            slot_writes: HashSet::new(),
        }
    }

    /// The tick this transaction is bound to, once set.
    pub const fn tick(&self) -> Option<u64> {
        self.tick
    }

    /// The slot of the event currently being applied, once one is recorded.
    pub const fn slot(&self) -> Option<u32> {
        self.slot
    }

    /// Bind the transaction to `tick` and write its marker.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::TickAlreadySet`] on a second call, or
    /// [`DbError`] if the marker cannot be written.
    pub async fn set_tick(&mut self, tick: u64) -> Result<(), DbError> {
        if let Some(current) = self.tick {
            return Err(InvariantViolation::TickAlreadySet {
                current,
                attempted: tick,
            }
            .into());
        }
        self.backend.insert_tick_marker(tick).await?;
        self.tick = Some(tick);
        Ok(())
    }

    /// Append the raw event row at `slot` and make it the current slot.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::TickNotSet`] before `set_tick`,
    /// [`InvariantViolation::NonContiguousSlot`] unless `slot` is `0` for the
    /// first event and the previous slot plus one afterwards.
    pub async fn record_event(&mut self, slot: u32, event: &EventEnvelope) -> Result<(), DbError> {
        let tick = self.tick.ok_or(InvariantViolation::TickNotSet)?;
        let expected = match self.slot {
            None => Some(0),
            Some(previous) => previous.checked_add(1),
        };
        if expected != Some(slot) {
            return Err(InvariantViolation::NonContiguousSlot {
                tick,
                expected: expected.unwrap_or(u32::MAX),
                got: slot,
            }
            .into());
        }

        self.backend.insert_event(tick, slot, event).await?;
        self.slot = Some(slot);
        self.slot_writes.clear();

        tracing::debug!(tick, slot, event_type = event.event_type.as_str(), "Recorded event");
        Ok(())
    }

    /// Mark the current event as set aside with `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation`] if no event has been recorded yet.
    pub async fn quarantine(&mut self, event_type: &str, reason: &str) -> Result<(), DbError> {
        let (tick, slot) = self.position()?;
        self.backend
            .insert_quarantine(tick, slot, event_type, reason)
            .await
    }

    /// Queue the change notification for this transaction's tick.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::TickNotSet`] before `set_tick`.
    pub async fn publish(&mut self) -> Result<(), DbError> {
        let tick = self.tick.ok_or(InvariantViolation::TickNotSet)?;
        self.backend.publish_tick(tick).await
    }

    /// Commit every write.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the backend refuses the commit; nothing is
    /// persisted in that case.
    pub async fn commit(self) -> Result<(), DbError> {
        self.backend.commit().await
    }

    /// Discard every write.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the backend fails to roll back.
    pub async fn rollback(self) -> Result<(), DbError> {
        self.backend.rollback().await
    }

    fn position(&self) -> Result<(u64, u32), InvariantViolation> {
        let tick = self.tick.ok_or(InvariantViolation::TickNotSet)?;
        let slot = self
            .slot
            .ok_or(InvariantViolation::NoEventRecorded { tick })?;
        Ok((tick, slot))
    }
}

impl<B: TickBackend> ObjectStore for TickTransaction<B> {
    async fn fetch(&mut self, key: &ObjectKey) -> Result<Option<Value>, DbError> {
        if let Some(cached) = self.cache.get(key) {
            return Ok(cached.clone());
        }
        let value = self.backend.load_latest(key).await?;
        self.cache.insert(key.clone(), value.clone());
        Ok(value)
    }

    async fn change(&mut self, key: ObjectKey, value: Option<Value>) -> Result<(), DbError> {
        let (tick, slot) = self.position()?;
        if self.slot_writes.contains(&key) {
            return Err(InvariantViolation::DoubleWrite { tick, slot, key }.into());
        }

        self.backend
            .insert_revision(tick, slot, &key, value.as_ref())
            .await?;

        tracing::debug!(
            tick,
            slot,
            object_type = key.object_type.as_str(),
            object_id = key.object_id.as_str(),
            deleted = value.is_none(),
            "Wrote object revision"
        );

        self.slot_writes.insert(key.clone());
        self.cache.insert(key, value);
        Ok(())
    }
}
