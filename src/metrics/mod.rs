//! Host metrics sampling core.
//!
//! A [`Sampler`] pulls readings from a [`MetricSource`] on a fixed cadence,
//! isolates per-metric failures, and publishes immutable [`Snapshot`]s to a
//! [`SnapshotStore`] that any number of readers can query without blocking.

pub mod collector;
pub mod config;
pub mod data;
pub mod fake;
pub mod history;
pub mod sampler;
pub mod store;
pub mod traits;

// Re-export commonly used items
pub use collector::SystemCollector;
pub use config::SamplerConfig;
pub use data::{MetricKind, MetricSlot, Reading, SampleError, Snapshot};
pub use history::History;
pub use sampler::{Sampler, SamplerHandle, SamplerHealth, SamplerTask};
pub use store::SnapshotStore;
pub use traits::{MetricSource, MetricsPresenter};
