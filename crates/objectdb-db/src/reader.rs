//! Read surface over committed state.
//!
//! [`ObjectReader`] serves the queries external readers need: the local
//! tick, the rows written at a tick, and the latest value of one object.
//! It never writes. Uses enum dispatch rather than a trait object because
//! async methods are not dyn-compatible.

use objectdb_types::ObjectKey;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::{db_tick, tick_from_db, DbError};
use crate::memory::MemoryStore;
use crate::rows::{EventRow, QuarantineRow, RevisionRow};

/// Read-only access to committed object state.
#[derive(Debug, Clone)]
pub enum ObjectReader {
    /// Reads from `PostgreSQL`.
    Postgres(PgPool),
    /// Reads from an in-memory store.
    Memory(MemoryStore),
}

impl ObjectReader {
    /// Highest committed tick, `0` if none.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub async fn local_tick(&self) -> Result<u64, DbError> {
        match self {
            Self::Postgres(pool) => pg_local_tick(pool).await,
            Self::Memory(store) => {
                use crate::backend::TickStore as _;
                store.local_tick().await
            }
        }
    }

    /// Event rows of `tick`, ordered by slot.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub async fn events_at(&self, tick: u64) -> Result<Vec<EventRow>, DbError> {
        match self {
            Self::Postgres(pool) => {
                let rows = sqlx::query_as::<_, EventRow>(
                    r"SELECT tick, slot, event_type, payload
                      FROM event
                      WHERE tick = $1
                      ORDER BY slot",
                )
                .bind(db_tick(tick)?)
                .fetch_all(pool)
                .await?;
                Ok(rows)
            }
            Self::Memory(store) => store.events_at(tick),
        }
    }

    /// Object revision rows of `tick`, ordered by slot.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub async fn revisions_at(&self, tick: u64) -> Result<Vec<RevisionRow>, DbError> {
        match self {
            Self::Postgres(pool) => {
                let rows = sqlx::query_as::<_, RevisionRow>(
                    r"SELECT tick, slot, object_type, object_id, payload
                      FROM object_rev
                      WHERE tick = $1
                      ORDER BY slot, object_type, object_id",
                )
                .bind(db_tick(tick)?)
                .fetch_all(pool)
                .await?;
                Ok(rows)
            }
            Self::Memory(store) => store.revisions_at(tick),
        }
    }

    /// Latest committed value of `key`, `None` if missing or deleted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub async fn latest_value(&self, key: &ObjectKey) -> Result<Option<Value>, DbError> {
        match self {
            Self::Postgres(pool) => {
                let row = sqlx::query_as::<_, (Option<Value>,)>(
                    r"SELECT payload FROM object_rev
                      WHERE object_type = $1 AND object_id = $2
                      ORDER BY tick DESC, slot DESC
                      LIMIT 1",
                )
                .bind(&key.object_type)
                .bind(&key.object_id)
                .fetch_optional(pool)
                .await?;
                Ok(row.and_then(|(payload,)| payload))
            }
            Self::Memory(store) => store.latest_value(key),
        }
    }

    /// Every quarantined event, in `(tick, slot)` order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub async fn quarantined(&self) -> Result<Vec<QuarantineRow>, DbError> {
        match self {
            Self::Postgres(pool) => {
                let rows = sqlx::query_as::<_, QuarantineRow>(
                    r"SELECT tick, slot, event_type, reason
                      FROM quarantined_event
                      ORDER BY tick, slot",
                )
                .fetch_all(pool)
                .await?;
                Ok(rows)
            }
            Self::Memory(store) => Ok(store.quarantined()),
        }
    }
}

/// Highest committed tick marker in `PostgreSQL`, `0` if none.
pub(crate) async fn pg_local_tick(pool: &PgPool) -> Result<u64, DbError> {
    let row = sqlx::query_as::<_, (Option<i64>,)>("SELECT MAX(tick) FROM tick_marker")
        .fetch_one(pool)
        .await?;
    row.0.map_or(Ok(0), tick_from_db)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use objectdb_types::EventEnvelope;
    use serde_json::json;

    use super::*;
    use crate::backend::TickStore;
    use crate::transaction::ObjectStore;

    #[tokio::test]
    async fn memory_reader_serves_committed_rows() {
        let store = MemoryStore::new();
        let mut trx = store.begin().await.unwrap();
        trx.set_tick(1).await.unwrap();
        trx.record_event(0, &EventEnvelope::new("ping", json!({})))
            .await
            .unwrap();
        let key = ObjectKey::new("counter", "ping");
        trx.change(key.clone(), Some(json!({"count": 1})))
            .await
            .unwrap();
        trx.commit().await.unwrap();

        let reader = ObjectReader::Memory(store);
        assert_eq!(reader.local_tick().await.unwrap(), 1);
        assert_eq!(reader.events_at(1).await.unwrap().len(), 1);
        assert_eq!(reader.revisions_at(1).await.unwrap().len(), 1);
        assert_eq!(
            reader.latest_value(&key).await.unwrap(),
            Some(json!({"count": 1}))
        );
        assert!(reader.quarantined().await.unwrap().is_empty());
        assert!(reader.revisions_at(2).await.unwrap().is_empty());
    }
}
