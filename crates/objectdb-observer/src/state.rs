//! Shared application state for the read surface.

use objectdb_core::ChangeMonitor;
use objectdb_db::ObjectReader;

/// What every handler reads from.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Known-tick tracking and tick waiters.
    pub monitor: ChangeMonitor,
    /// Committed object state.
    pub reader: ObjectReader,
}

impl AppState {
    /// Bundle a monitor and a reader.
    pub const fn new(monitor: ChangeMonitor, reader: ObjectReader) -> Self {
        Self { monitor, reader }
    }
}
