//! Client for the upstream event authority.
//!
//! The authority exposes two reads: its current tick, and the ordered event
//! batch of one tick. [`Upstream`] is the seam the replication loop depends
//! on; [`HttpUpstream`] is the production implementation over `reqwest`.
//! [`retrying`] wraps either read in the fixed-delay retry policy.

use std::future::Future;
use std::time::Duration;

use objectdb_types::EventEnvelope;
use serde_json::Value;
use tracing::warn;

use crate::config::{MalformedPolicy, UpstreamConfig};

/// Path of the current-tick endpoint, relative to the base URL.
pub const EVENT_T_PATH: &str = "/event-apis/event-t";

/// Path of the event batch endpoint, relative to the base URL.
pub const GET_EVENTS_PATH: &str = "/event-apis/get-events";

/// A failed upstream read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// The request did not complete or returned a non-success status.
    #[error("upstream unavailable: {0}")]
    Transport(String),

    /// A success response whose body is not the expected shape.
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// Whether the authority answered, but with the wrong shape.
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

/// Read access to the upstream event authority.
pub trait Upstream: Send + Sync {
    /// The authority's current tick.
    fn current_tick(&self) -> impl Future<Output = Result<u64, UpstreamError>> + Send;

    /// The ordered event batch of `tick`.
    fn events(
        &self,
        tick: u64,
    ) -> impl Future<Output = Result<Vec<EventEnvelope>, UpstreamError>> + Send;
}

/// Fixed-delay retry policy for upstream reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between attempts.
    pub delay: Duration,
    /// Whether malformed responses are retried or returned.
    pub malformed: MalformedPolicy,
}

impl RetryPolicy {
    /// Build the policy from upstream configuration.
    pub const fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            delay: config.retry_delay(),
            malformed: config.malformed_response,
        }
    }
}

/// Run `op` until it succeeds, sleeping `policy.delay` between attempts.
///
/// Transport failures are retried forever. Malformed responses are retried
/// too unless the policy is [`MalformedPolicy::Fatal`], in which case the
/// error is returned.
pub async fn retrying<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, UpstreamError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, UpstreamError>> + Send,
{
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_malformed() && policy.malformed == MalformedPolicy::Fatal => {
                return Err(e);
            }
            Err(e) => {
                warn!(what, error = %e, delay_ms = policy.delay.as_millis(), "upstream read failed, retrying");
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

/// [`Upstream`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUpstream {
    /// Build a client for the authority described by `config`.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| UpstreamError::Transport(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// GET `url` and decode the body as JSON.
    async fn get_json(&self, url: &str) -> Result<Value, UpstreamError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Transport(format!("GET {url} returned {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Transport(format!("GET {url} body read failed: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| UpstreamError::Malformed(format!("GET {url} is not JSON: {e}")))
    }
}

impl Upstream for HttpUpstream {
    async fn current_tick(&self) -> Result<u64, UpstreamError> {
        let url = format!("{}{EVENT_T_PATH}", self.base_url);
        let body = self.get_json(&url).await?;
        parse_tick(&body)
    }

    async fn events(&self, tick: u64) -> Result<Vec<EventEnvelope>, UpstreamError> {
        let url = format!("{}{GET_EVENTS_PATH}?event_t={tick}", self.base_url);
        let body = self.get_json(&url).await?;
        parse_events(body)
    }
}

/// Decode a current-tick body: a non-negative JSON integer.
fn parse_tick(body: &Value) -> Result<u64, UpstreamError> {
    body.as_u64()
        .ok_or_else(|| UpstreamError::Malformed(format!("tick is not a non-negative integer: {body}")))
}

/// Decode an event batch body: a JSON array of `{type, payload}` objects.
fn parse_events(body: Value) -> Result<Vec<EventEnvelope>, UpstreamError> {
    if !body.is_array() {
        return Err(UpstreamError::Malformed(format!("events is not an array: {body}")));
    }
    serde_json::from_value(body)
        .map_err(|e| UpstreamError::Malformed(format!("event batch has a bad element: {e}")))
}
