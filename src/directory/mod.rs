//! Directory service backends.
//!
//! A [`Directory`] answers blocking queries for the instances of a service.
//! Calls are keyed by a monotonic index: with a `wait_index` of zero the
//! directory answers immediately, otherwise it may hold the call open until
//! its data moves past that index.

use crate::Instance;
use async_trait::async_trait;
use std::time::Duration;

#[cfg(feature = "consul")]
pub mod consul;

/// A single blocking query against a [`Directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query<'a> {
    /// Name of the service to look up.
    pub service: &'a str,
    /// Only instances carrying all of these tags are returned.
    pub tags: &'a [String],
    /// Only instances passing their health checks are returned.
    pub healthy_only: bool,
    /// Datacenter to query. `None` means the directory agent's local datacenter.
    pub datacenter: Option<&'a str>,
    /// Index of the last snapshot seen; zero for a non-blocking query.
    pub wait_index: u64,
    /// How long the directory may hold the call open, if not its default.
    pub wait_time: Option<Duration>,
    /// Whether any directory server (not only the leader) may answer.
    pub allow_stale: bool,
}

/// The instances of a service at a point in the directory's history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Instances matching the query.
    pub instances: Vec<Instance>,
    /// Index the snapshot was taken at.
    pub index: u64,
}

/// Source of service instance snapshots.
#[async_trait]
pub trait Directory: Send + Sync + 'static {
    /// Errors produced by the directory. These are logged and retried, never
    /// surfaced to resolver callers.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs a blocking query.
    async fn query(&self, query: &Query<'_>) -> Result<Snapshot, Self::Error>;
}
