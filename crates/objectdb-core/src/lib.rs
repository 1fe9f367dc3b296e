//! Runtime core of ObjectDB.
//!
//! - [`config`] -- Typed configuration and its loader
//! - [`upstream`] -- Client for the upstream event authority
//! - [`replication`] -- The single-writer replication loop
//! - [`monitor`] -- Known-tick tracking and tick waiters
//! - [`subscription`] -- `PostgreSQL` LISTEN feed for the monitor

pub mod config;
pub mod monitor;
pub mod replication;
pub mod subscription;
pub mod upstream;

pub use config::{ConfigError, LogFormat, MalformedPolicy, ObjectDbConfig, PoisonPolicy};
pub use monitor::{ChangeMonitor, MonitorStopped, TickTracker};
pub use replication::{ReplicationError, ReplicationLoop};
pub use subscription::{SubscriptionError, TickSubscription};
pub use upstream::{HttpUpstream, RetryPolicy, Upstream, UpstreamError};
