//! Endpoint handlers for the read surface.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness |
//! | `GET` | `/object-apis/event-t` | Current tick, once known |
//! | `GET` | `/object-apis/wait-t?t=N` | Block until tick `N` has committed |
//! | `GET` | `/object-apis/revisions?t=N` | Object revisions written at tick `N` |
//! | `GET` | `/object-apis/events?t=N` | Events recorded at tick `N` |
//! | `GET` | `/object-apis/objects/{type}/{id}` | Latest value of one object |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use objectdb_types::ObjectKey;
use serde_json::Value;

use crate::error::ObserverError;
use crate::state::AppState;

/// Query parameters carrying a tick.
#[derive(Debug, serde::Deserialize)]
pub struct TickQuery {
    /// The tick, as a decimal string.
    pub t: Option<String>,
}

impl TickQuery {
    /// Parse `t` as a non-negative decimal integer.
    pub fn tick(&self) -> Result<u64, ObserverError> {
        let raw = self.t.as_deref().unwrap_or_default();
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ObserverError::InvalidQuery(format!("invalid t {raw:?}")));
        }
        raw.parse()
            .map_err(|e| ObserverError::InvalidQuery(format!("invalid t {raw:?}: {e}")))
    }
}

/// `GET /health`.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// `GET /object-apis/event-t`: the current tick, waiting until one is known.
pub async fn event_t(State(state): State<Arc<AppState>>) -> Result<Json<u64>, ObserverError> {
    Ok(Json(state.monitor.current_tick().await?))
}

/// `GET /object-apis/wait-t?t=N`: answers `ok` once tick `N` has committed.
pub async fn wait_t(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TickQuery>,
) -> Result<&'static str, ObserverError> {
    let tick = query.tick()?;
    state.monitor.wait_for(tick).await?;
    Ok("ok")
}

/// `GET /object-apis/revisions?t=N`: revision rows of tick `N`, by slot.
pub async fn revisions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TickQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let rows = state.reader.revisions_at(query.tick()?).await?;
    Ok(Json(rows))
}

/// `GET /object-apis/events?t=N`: event rows of tick `N`, by slot.
pub async fn events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TickQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let rows = state.reader.events_at(query.tick()?).await?;
    Ok(Json(rows))
}

/// `GET /object-apis/objects/{type}/{id}`: latest materialized value.
pub async fn object(
    State(state): State<Arc<AppState>>,
    Path((object_type, object_id)): Path<(String, String)>,
) -> Result<Json<Value>, ObserverError> {
    let key = ObjectKey::new(object_type, object_id);
    state
        .reader
        .latest_value(&key)
        .await?
        .map(Json)
        .ok_or_else(|| ObserverError::NotFound(format!("object {key}")))
}
