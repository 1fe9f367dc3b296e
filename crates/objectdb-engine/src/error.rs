//! Error types for the engine binary.

/// Top-level error for the engine binary.
///
/// Each variant wraps a subsystem error so `run` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Connecting to or migrating the store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: objectdb_db::DbError,
    },

    /// The upstream client could not be built.
    #[error("upstream error: {source}")]
    Upstream {
        /// The underlying upstream error.
        #[from]
        source: objectdb_core::UpstreamError,
    },

    /// Replication stopped.
    #[error("replication stopped: {source}")]
    Replication {
        /// The condition that stopped replication.
        #[from]
        source: objectdb_core::ReplicationError,
    },

    /// The read surface failed.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying server error.
        #[from]
        source: objectdb_observer::ServerError,
    },

    /// A background task panicked or was cancelled.
    #[error("task {task} ended abnormally: {message}")]
    Task {
        /// Which task.
        task: &'static str,
        /// The join error.
        message: String,
    },
}
