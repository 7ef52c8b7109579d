//! # sysdash - host metrics sampling service
//!
//! A background sampler reads CPU, memory, disk, network and OS identity
//! through a pluggable [`MetricSource`], assembles immutable [`Snapshot`]s and
//! publishes them to a [`SnapshotStore`]. The web module serves the store over
//! HTTP and WebSocket together with a single-page dashboard.
//!
//! ## Features
//!
//! - **Failure isolation**: one metric failing or timing out leaves the rest of the snapshot intact
//! - **Non-blocking reads**: readers never wait on the sampler
//! - **CPU trend**: bounded history of recent CPU readings
//! - **Manual refresh**: force an out-of-band sample on demand
//! - **Degraded signal**: reported when no metric can be read for several ticks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sysdash::{MetricsPresenter, Sampler, SamplerConfig, SnapshotStore, SystemCollector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SamplerConfig::default();
//!     let store = Arc::new(SnapshotStore::new(config.history_capacity));
//!     let sampler = Sampler::new(Arc::new(SystemCollector::new()?), store, config)?;
//!     let (handle, task) = sampler.spawn();
//!
//!     let snapshot = handle.trigger_refresh().await?;
//!     println!("cpu: {:?}", snapshot.cpu_percent());
//!
//!     task.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod metrics;
pub mod web;

// Re-export public API
pub use error::{Result, SystemError};
pub use metrics::{
    collector::SystemCollector,
    config::SamplerConfig,
    data::{MetricKind, MetricSlot, Reading, SampleError, SampleErrorKind, Snapshot},
    sampler::{Sampler, SamplerHandle, SamplerHealth, SamplerTask},
    store::SnapshotStore,
    traits::{MetricSource, MetricsPresenter},
};

pub use web::{start_web_server, WebConfig};

/// The default sampling interval in milliseconds
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// The default CPU measurement window in milliseconds
pub const DEFAULT_CPU_WINDOW_MS: u64 = 500;

/// The default upper bound for one metric read in milliseconds
pub const DEFAULT_METRIC_TIMEOUT_MS: u64 = 2000;

/// The default number of CPU readings kept for the trend
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// The default number of all-failed ticks before the sampler reports degraded
pub const DEFAULT_DEGRADED_AFTER_TICKS: u32 = 3;

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 8080;
