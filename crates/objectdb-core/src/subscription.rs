//! `PostgreSQL` LISTEN subscription feeding the [`ChangeMonitor`].
//!
//! Each session opens a dedicated listener connection, subscribes to the
//! tick channel, then queries the baseline tick so nothing published
//! between connect and subscribe is missed. While the session lives, every
//! notification and every periodic resync is fed to the monitor. A lost
//! connection ends the session and a new one starts after a short delay.

use std::time::Duration;

use objectdb_db::{DbError, ObjectReader};
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::monitor::{ChangeMonitor, MonitorStopped};

/// Why a subscription session ended.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// The listener connection failed.
    #[error("listener failed: {0}")]
    Listen(#[from] sqlx::Error),

    /// The baseline query failed.
    #[error("baseline query failed: {0}")]
    Baseline(#[from] DbError),

    /// The monitor is gone; nothing left to feed.
    #[error(transparent)]
    Stopped(#[from] MonitorStopped),
}

/// Keeps a [`ChangeMonitor`] in sync with ticks committed to `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct TickSubscription {
    pool: PgPool,
    reader: ObjectReader,
    config: MonitorConfig,
    monitor: ChangeMonitor,
}

impl TickSubscription {
    /// Create a subscription that feeds `monitor`.
    pub fn new(pool: PgPool, config: MonitorConfig, monitor: ChangeMonitor) -> Self {
        Self {
            reader: ObjectReader::Postgres(pool.clone()),
            pool,
            config,
            monitor,
        }
    }

    /// Run sessions until the monitor stops.
    ///
    /// Connection failures are logged and retried after
    /// `monitor.reconnect_delay_ms`, without limit.
    pub async fn run(self) -> MonitorStopped {
        loop {
            match self.session().await {
                Err(SubscriptionError::Stopped(stopped)) => return stopped,
                Err(e) => warn!(error = %e, channel = %self.config.channel, "tick subscription failed"),
                Ok(()) => warn!(channel = %self.config.channel, "tick subscription connection lost"),
            }
            tokio::time::sleep(self.config.reconnect_delay()).await;
        }
    }

    /// One listener connection, from subscribe until it is lost.
    async fn session(&self) -> Result<(), SubscriptionError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&self.config.channel).await?;
        info!(channel = %self.config.channel, "subscribed to tick notifications");
        self.resync().await?;

        let period = self.config.resync_interval().max(Duration::from_millis(1));
        let mut resync = tokio::time::interval(period);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the baseline was just read.
        resync.tick().await;
        loop {
            tokio::select! {
                received = listener.try_recv() => {
                    let Some(notification) = received? else {
                        return Ok(());
                    };
                    match notification.payload().trim().parse::<u64>() {
                        Ok(tick) => {
                            debug!(tick, "tick notification");
                            self.monitor.observe(tick)?;
                        }
                        Err(e) => warn!(
                            payload = notification.payload(),
                            error = %e,
                            "ignoring notification that is not a tick"
                        ),
                    }
                }
                _ = resync.tick() => self.resync().await?,
            }
        }
    }

    /// Feed the committed baseline tick to the monitor.
    async fn resync(&self) -> Result<(), SubscriptionError> {
        let tick = self.reader.local_tick().await?;
        debug!(tick, "baseline tick");
        self.monitor.observe(tick)?;
        Ok(())
    }
}
