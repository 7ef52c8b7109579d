//! Traits at the two edges of the sampling core.

use crate::error::Result;
use crate::metrics::data::{CpuPercent, DiskUsage, HostIdentity, MemoryUsage, NetworkInfo, Snapshot};
use crate::metrics::sampler::SamplerHealth;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Point-in-time platform readings, one call per metric kind.
///
/// Every method is blocking. Callers are expected to run them off the async
/// runtime and to bound them with a timeout. A failure in one call says
/// nothing about the others.
pub trait MetricSource: Send + Sync + 'static {
    /// Measure CPU utilization over `window`. Blocks for at least that long.
    fn read_cpu_percent(&self, window: Duration) -> Result<CpuPercent>;

    /// Read virtual memory usage.
    fn read_memory(&self) -> Result<MemoryUsage>;

    /// Read usage of the filesystem holding `path`.
    fn read_disk(&self, path: &Path) -> Result<DiskUsage>;

    /// Count network interfaces and active sockets.
    fn read_network(&self) -> Result<NetworkInfo>;

    /// Static host identity. Never fails; unknown fields read "unknown".
    fn read_host_identity(&self) -> HostIdentity;
}

/// What the presentation layer may ask of the sampling core.
///
/// `latest` and `history` only return cached data; `trigger_refresh` is the
/// single way to force a fresh sample.
#[async_trait]
pub trait MetricsPresenter: Send + Sync {
    /// The most recent complete snapshot, or `NoSnapshotYet`.
    fn latest(&self) -> Result<Arc<Snapshot>>;

    /// CPU trend, oldest first.
    fn history(&self) -> Vec<f32>;

    /// Configured capacity of the CPU trend buffer.
    fn history_capacity(&self) -> usize;

    /// Current sampler health.
    fn health(&self) -> SamplerHealth;

    /// Receive every snapshot published from now on.
    fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>>;

    /// Force one out-of-band tick and return its snapshot.
    async fn trigger_refresh(&self) -> Result<Arc<Snapshot>>;
}
