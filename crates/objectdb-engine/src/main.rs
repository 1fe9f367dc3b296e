//! ObjectDB engine binary.
//!
//! Wires the replication loop, the change monitor and its `PostgreSQL`
//! subscription, and the HTTP read surface into one process.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `objectdb-config.yaml` (or `OBJECTDB_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `PostgreSQL`, retrying while it is unreachable
//! 4. Run migrations
//! 5. Start the change monitor and its LISTEN subscription
//! 6. Start the replication loop and wait for it to catch up
//! 7. Start the read surface
//! 8. Run until replication stops (exit 1) or `Ctrl-C` (exit 0)

mod error;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use objectdb_core::config::{DatabaseConfig, LoggingConfig};
use objectdb_core::{
    ChangeMonitor, HttpUpstream, LogFormat, ObjectDbConfig, ReplicationError, ReplicationLoop,
    RetryPolicy, TickSubscription,
};
use objectdb_db::{ObjectReader, PostgresConfig, PostgresPool};
use objectdb_observer::{AppState, ServerConfig, ServerError, start_server};
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ObjectDbConfig::load() {
        Ok(config) => config,
        Err(e) => {
            init_logging(&LoggingConfig::default());
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging);
    info!("objectdb-engine starting");

    match run(config).await {
        Ok(()) => {
            info!("objectdb-engine stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "objectdb-engine failed");
            ExitCode::FAILURE
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn run(config: ObjectDbConfig) -> Result<(), EngineError> {
    let store = connect(&config).await?;
    store.run_migrations().await?;

    let (monitor, _monitor_task) = ChangeMonitor::start();
    let subscription = TickSubscription::new(
        store.pool().clone(),
        config.monitor.clone(),
        monitor.clone(),
    );
    let subscription_task = tokio::spawn(subscription.run());

    let upstream = HttpUpstream::new(&config.upstream)?;
    let replication = ReplicationLoop::new(
        upstream,
        store.clone(),
        config.replication.clone(),
        RetryPolicy::from_config(&config.upstream),
    );
    let (caught_up_tx, caught_up) = oneshot::channel();
    let mut replication_task = tokio::spawn(replication.run(caught_up_tx));

    let startup = tokio::select! {
        reached = caught_up => reached.map_or(Startup::Stopped, Startup::CaughtUp),
        () = interrupted() => Startup::Interrupted,
    };
    let outcome = match startup {
        Startup::CaughtUp(tick) => {
            info!(tick, "replication caught up, starting read surface");
            let state = Arc::new(AppState::new(
                monitor,
                ObjectReader::Postgres(store.pool().clone()),
            ));
            serve(&config, state, &mut replication_task).await
        }
        Startup::Stopped => replication_outcome((&mut replication_task).await),
        Startup::Interrupted => Ok(()),
    };

    replication_task.abort();
    subscription_task.abort();
    store.close().await;
    outcome
}

/// How the wait for initial catch-up ended.
enum Startup {
    CaughtUp(u64),
    /// Replication returned before catching up.
    Stopped,
    Interrupted,
}

/// Run the read surface alongside replication until either stops or the
/// process is interrupted.
async fn serve(
    config: &ObjectDbConfig,
    state: Arc<AppState>,
    replication_task: &mut JoinHandle<Result<(), ReplicationError>>,
) -> Result<(), EngineError> {
    let (stop, stopped) = watch::channel(false);
    let server_config = ServerConfig::from(&config.observer);
    let mut server_task = tokio::spawn(async move {
        start_server(&server_config, state, wait_for_stop(stopped)).await
    });

    let outcome = tokio::select! {
        result = &mut *replication_task => replication_outcome(result),
        result = &mut server_task => server_outcome(result),
        () = interrupted() => Ok(()),
    };

    if stop.send(true).is_err() {
        warn!("read surface already stopped");
    }
    if !server_task.is_finished() {
        match tokio::time::timeout(Duration::from_secs(5), server_task).await {
            Ok(result) => server_outcome(result)?,
            Err(e) => warn!(error = %e, "read surface did not stop in time"),
        }
    }
    outcome
}

/// Connect to `PostgreSQL`, retrying transient failures.
async fn connect(config: &ObjectDbConfig) -> Result<PostgresPool, EngineError> {
    let pg = postgres_config(&config.database, &config.monitor.channel);
    loop {
        match PostgresPool::connect(&pg).await {
            Ok(pool) => return Ok(pool),
            Err(e) if e.is_transient() => {
                warn!(error = %e, "cannot connect to PostgreSQL, retrying");
                tokio::time::sleep(config.replication.store_retry_delay()).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn postgres_config(database: &DatabaseConfig, channel: &str) -> PostgresConfig {
    PostgresConfig::new(&database.url)
        .with_max_connections(database.max_connections)
        .with_connect_timeout(Duration::from_millis(database.connect_timeout_ms))
        .with_idle_timeout(Duration::from_millis(database.idle_timeout_ms))
        .with_notify_channel(channel)
}

fn replication_outcome(
    result: Result<Result<(), ReplicationError>, JoinError>,
) -> Result<(), EngineError> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(EngineError::Task {
            task: "replication",
            message: e.to_string(),
        }),
    }
}

fn server_outcome(result: Result<Result<(), ServerError>, JoinError>) -> Result<(), EngineError> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(EngineError::Task {
            task: "observer",
            message: e.to_string(),
        }),
    }
}

/// Resolves on `Ctrl-C`. If the handler cannot be installed, never
/// resolves.
async fn interrupted() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("interrupted, shutting down"),
        Err(e) => {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

async fn wait_for_stop(mut stopped: watch::Receiver<bool>) {
    if stopped.wait_for(|stop| *stop).await.is_err() {
        warn!("shutdown signal dropped");
    }
}
