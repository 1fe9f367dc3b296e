//! The replication loop: the single writer of the object store.
//!
//! Startup reads the local tick `L` and the upstream tick `R`, refuses to
//! run if `L > R`, then applies ticks `L+1..=R` one at a time and signals
//! that it has caught up. After that it keeps pulling and applying the next
//! tick forever. Exactly one tick transaction is open at any time.
//!
//! Applying a tick writes its marker, records each event at its slot, runs
//! the rules for that event, publishes the tick, and commits. Any failure
//! rolls the whole tick back, so re-applying it from scratch is always safe.
//!
//! # Failure handling
//!
//! | Failure                         | Handling                                  |
//! |---------------------------------|-------------------------------------------|
//! | upstream transport error        | retry forever after `retry_delay_ms`      |
//! | upstream malformed response     | retry, or stop under `malformed: fatal`   |
//! | store I/O error                 | roll back, retry the tick                 |
//! | invariant violation             | stop                                      |
//! | event rejected by the rules     | stop, or quarantine the event             |

use std::collections::BTreeMap;

use objectdb_db::{DbError, InvariantViolation, TickBackend, TickStore, TickTransaction};
use objectdb_rules::{InterpretError, process_event};
use objectdb_types::EventEnvelope;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::{PoisonPolicy, ReplicationConfig};
use crate::upstream::{RetryPolicy, Upstream, UpstreamError, retrying};

/// A condition that stops replication.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// The upstream returned a response that will not be retried.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// A store precondition was broken.
    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),

    /// A non-retryable store failure.
    #[error("store failure at tick {tick}: {source}")]
    Store {
        /// Tick being applied.
        tick: u64,
        /// The underlying error.
        source: DbError,
    },

    /// The rules refused an event and the policy is to halt.
    #[error("tick {tick} slot {slot}: event {event_type} rejected: {reason}")]
    Rejected {
        /// Tick of the event.
        tick: u64,
        /// Slot of the event.
        slot: u32,
        /// Type of the event.
        event_type: String,
        /// Reason given by the rules.
        reason: String,
    },
}

/// Why one attempt at applying a tick failed.
#[derive(Debug)]
enum ApplyError {
    Store(DbError),
    Rejected {
        slot: u32,
        event_type: String,
        reason: String,
    },
}

impl From<DbError> for ApplyError {
    fn from(e: DbError) -> Self {
        Self::Store(e)
    }
}

/// Pulls ticks from `U` and applies them to `S`.
#[derive(Debug)]
pub struct ReplicationLoop<U, S> {
    upstream: U,
    store: S,
    config: ReplicationConfig,
    retry: RetryPolicy,
}

impl<U: Upstream, S: TickStore> ReplicationLoop<U, S> {
    /// Create a loop over `upstream` and `store`.
    pub const fn new(upstream: U, store: S, config: ReplicationConfig, retry: RetryPolicy) -> Self {
        Self {
            upstream,
            store,
            config,
            retry,
        }
    }

    /// Catch up, send the reached tick on `caught_up`, then follow upstream
    /// forever.
    ///
    /// Returns only when replication must stop.
    pub async fn run(self, caught_up: oneshot::Sender<u64>) -> Result<(), ReplicationError> {
        let mut local = self.catch_up().await?;
        if caught_up.send(local).is_err() {
            debug!(tick = local, "nobody waiting for catch-up");
        }
        loop {
            local = self.step(local).await?;
            info!(tick = local, "tick applied");
        }
    }

    /// Apply every tick between the local and the upstream tick. Returns
    /// the tick reached.
    pub async fn catch_up(&self) -> Result<u64, ReplicationError> {
        let mut local = self.local_tick().await?;
        let upstream = retrying(self.retry, "event-t", || self.upstream.current_tick()).await?;
        if local > upstream {
            error!(local, upstream, "local store is ahead of upstream");
            return Err(InvariantViolation::AheadOfUpstream { local, upstream }.into());
        }

        info!(local, upstream, "catching up");
        while local < upstream {
            local = self.step(local).await?;
            if local.checked_rem(self.config.progress_log_interval) == Some(0) {
                info!(tick = local, upstream, "catch-up progress");
            }
        }
        info!(tick = local, "caught up");
        Ok(local)
    }

    /// Fetch and apply the tick after `local`. Returns the new local tick.
    pub async fn step(&self, local: u64) -> Result<u64, ReplicationError> {
        let tick = local.saturating_add(1);
        let events = retrying(self.retry, "get-events", || self.upstream.events(tick)).await?;
        self.apply(tick, &events).await?;
        Ok(tick)
    }

    /// Apply one tick, retrying transient store failures and handling
    /// rejected events according to the poison policy.
    pub async fn apply(&self, tick: u64, events: &[EventEnvelope]) -> Result<(), ReplicationError> {
        let mut quarantined = BTreeMap::new();
        loop {
            match self.attempt(tick, events, &quarantined).await {
                Ok(()) => {
                    debug!(tick, events = events.len(), "tick committed");
                    return Ok(());
                }
                Err(ApplyError::Store(DbError::Invariant(violation))) => {
                    error!(tick, error = %violation, "store invariant violated");
                    return Err(violation.into());
                }
                Err(ApplyError::Store(e)) if e.is_transient() => {
                    warn!(tick, error = %e, "tick rolled back, retrying");
                    tokio::time::sleep(self.config.store_retry_delay()).await;
                }
                Err(ApplyError::Store(source)) => {
                    error!(tick, error = %source, "store failure");
                    return Err(ReplicationError::Store { tick, source });
                }
                Err(ApplyError::Rejected {
                    slot,
                    event_type,
                    reason,
                }) => match self.config.poison_events {
                    PoisonPolicy::Halt => {
                        error!(tick, slot, event_type = %event_type, reason = %reason, "event rejected");
                        return Err(ReplicationError::Rejected {
                            tick,
                            slot,
                            event_type,
                            reason,
                        });
                    }
                    PoisonPolicy::Quarantine => {
                        warn!(tick, slot, event_type = %event_type, reason = %reason, "event rejected, quarantining");
                        quarantined.insert(slot, reason);
                    }
                },
            }
        }
    }

    /// One transaction for `tick`. Slots in `quarantined` are recorded but
    /// not interpreted.
    async fn attempt(
        &self,
        tick: u64,
        events: &[EventEnvelope],
        quarantined: &BTreeMap<u32, String>,
    ) -> Result<(), ApplyError> {
        let mut trx = self.store.begin().await?;
        match write_tick(&mut trx, tick, events, quarantined).await {
            Ok(()) => Ok(trx.commit().await?),
            Err(e) => {
                if let Err(rollback) = trx.rollback().await {
                    warn!(tick, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// The committed local tick, retrying transient store failures.
    async fn local_tick(&self) -> Result<u64, ReplicationError> {
        loop {
            match self.store.local_tick().await {
                Ok(tick) => return Ok(tick),
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "cannot read local tick, retrying");
                    tokio::time::sleep(self.config.store_retry_delay()).await;
                }
                Err(DbError::Invariant(violation)) => return Err(violation.into()),
                Err(source) => return Err(ReplicationError::Store { tick: 0, source }),
            }
        }
    }
}

async fn write_tick<B: TickBackend>(
    trx: &mut TickTransaction<B>,
    tick: u64,
    events: &[EventEnvelope],
    quarantined: &BTreeMap<u32, String>,
) -> Result<(), ApplyError> {
    trx.set_tick(tick).await?;
    for (slot, event) in (0_u32..).zip(events) {
        trx.record_event(slot, event).await?;
        if let Some(reason) = quarantined.get(&slot) {
            trx.quarantine(&event.event_type, reason).await?;
            continue;
        }
        debug!(tick, slot, event_type = %event.event_type, "applying event");
        match process_event(event, trx).await {
            Ok(()) => {}
            Err(InterpretError::Store(e)) => return Err(ApplyError::Store(e)),
            Err(InterpretError::Rejected { event_type, reason }) => {
                return Err(ApplyError::Rejected {
                    slot,
                    event_type,
                    reason,
                });
            }
        }
    }
    trx.publish().await?;
    Ok(())
}
