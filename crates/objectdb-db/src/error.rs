//! Error types for the data layer.
//!
//! Every fallible operation returns [`DbError`]. Broken store invariants are
//! kept apart in [`InvariantViolation`] so callers can tell a caller bug or a
//! corrupted store (never retried) from a transient I/O failure.

use objectdb_types::ObjectKey;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A tick or slot number does not fit the column type.
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// A store invariant was violated.
    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl DbError {
    /// The violated invariant, if this error is one.
    pub const fn invariant(&self) -> Option<&InvariantViolation> {
        match self {
            Self::Invariant(violation) => Some(violation),
            _ => None,
        }
    }

    /// Whether retrying the same unit of work may succeed.
    ///
    /// Connection, pool, and serialization-conflict failures are transient.
    /// Invariant violations, decode failures, constraint and auth errors,
    /// and range errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Postgres(err) => is_transient_sqlx(err),
            _ => false,
        }
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| is_transient_sqlstate(&code)),
        _ => false,
    }
}

/// Serialization failure, deadlock, connection exceptions (class `08`), and
/// server shutdown or startup (`57P01`..`57P03`).
fn is_transient_sqlstate(code: &str) -> bool {
    matches!(code, "40001" | "40P01" | "57P01" | "57P02" | "57P03") || code.starts_with("08")
}

/// A broken precondition of the transactional store.
///
/// These signal a caller bug or a corrupted store, never a business-rule
/// outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// `set_tick` was called on a transaction that already has a tick.
    #[error("tick already set to {current}, refusing {attempted}")]
    TickAlreadySet {
        /// The tick the transaction is bound to.
        current: u64,
        /// The tick the caller tried to set.
        attempted: u64,
    },

    /// An operation needing a tick ran before `set_tick`.
    #[error("no tick set on this transaction")]
    TickNotSet,

    /// A tick marker for this tick already exists.
    #[error("tick {tick} already has a marker")]
    DuplicateTick {
        /// The duplicated tick.
        tick: u64,
    },

    /// An event slot was skipped or repeated.
    #[error("tick {tick}: expected slot {expected}, got {got}")]
    NonContiguousSlot {
        /// The tick being written.
        tick: u64,
        /// The slot that had to come next.
        expected: u32,
        /// The slot the caller supplied.
        got: u32,
    },

    /// An event row for this `(tick, slot)` already exists.
    #[error("event ({tick}, {slot}) already recorded")]
    DuplicateEvent {
        /// The tick of the duplicated row.
        tick: u64,
        /// The slot of the duplicated row.
        slot: u32,
    },

    /// A write was attempted before any event of the tick was recorded.
    #[error("tick {tick}: object write before any event was recorded")]
    NoEventRecorded {
        /// The tick being written.
        tick: u64,
    },

    /// A second write to the same object within one slot.
    #[error("object {key} written twice in ({tick}, {slot})")]
    DoubleWrite {
        /// The tick of the offending write.
        tick: u64,
        /// The slot of the offending write.
        slot: u32,
        /// The object written twice.
        key: ObjectKey,
    },

    /// The local store holds more ticks than the upstream authority.
    #[error("local tick {local} is ahead of upstream tick {upstream}")]
    AheadOfUpstream {
        /// Highest tick applied locally.
        local: u64,
        /// Current tick reported by the upstream authority.
        upstream: u64,
    },
}

/// Convert a tick number to its `BIGINT` column value.
pub(crate) fn db_tick(tick: u64) -> Result<i64, DbError> {
    i64::try_from(tick).map_err(|e| DbError::OutOfRange(format!("tick {tick}: {e}")))
}

/// Convert a slot number to its `INTEGER` column value.
pub(crate) fn db_slot(slot: u32) -> Result<i32, DbError> {
    i32::try_from(slot).map_err(|e| DbError::OutOfRange(format!("slot {slot}: {e}")))
}

/// Convert a `BIGINT` tick column value back to a tick number.
pub(crate) fn tick_from_db(tick: i64) -> Result<u64, DbError> {
    u64::try_from(tick).map_err(|e| DbError::OutOfRange(format!("stored tick {tick}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_is_not_transient() {
        let err = DbError::from(InvariantViolation::TickNotSet);
        assert!(!err.is_transient());
        assert_eq!(err.invariant(), Some(&InvariantViolation::TickNotSet));
    }

    #[test]
    fn pool_failure_is_transient() {
        let err = DbError::from(sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
        assert!(err.invariant().is_none());
    }

    #[test]
    fn connection_loss_is_transient() {
        let err = DbError::from(sqlx::Error::Io(std::io::Error::from(
            std::io::ErrorKind::ConnectionReset,
        )));
        assert!(err.is_transient());
        assert!(DbError::from(sqlx::Error::PoolClosed).is_transient());
    }

    #[test]
    fn decode_failures_are_not_transient() {
        assert!(!DbError::from(sqlx::Error::ColumnNotFound("payload".to_owned())).is_transient());
        assert!(!DbError::from(sqlx::Error::RowNotFound).is_transient());
        assert!(!DbError::Config("bad url".to_owned()).is_transient());
        assert!(!DbError::OutOfRange("tick".to_owned()).is_transient());
    }

    #[test]
    fn only_conflict_and_connection_sqlstates_are_transient() {
        for code in ["40001", "40P01", "08006", "08001", "57P01"] {
            assert!(is_transient_sqlstate(code), "{code}");
        }
        for code in ["23505", "23503", "23514", "22P05", "28P01", "42P01"] {
            assert!(!is_transient_sqlstate(code), "{code}");
        }
    }

    #[test]
    fn double_write_names_the_object() {
        let err = InvariantViolation::DoubleWrite {
            tick: 4,
            slot: 1,
            key: ObjectKey::new("counter", "ping"),
        };
        assert_eq!(err.to_string(), "object counter/ping written twice in (4, 1)");
    }

    #[test]
    fn tick_conversion_rejects_overflow() {
        assert!(db_tick(u64::MAX).is_err());
        assert_eq!(db_tick(7).ok(), Some(7));
        assert!(tick_from_db(-1).is_err());
    }
}
