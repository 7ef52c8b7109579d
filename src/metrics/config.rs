//! Sampler configuration.

use crate::error::{Result, SystemError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Number of platform reads in one tick besides CPU.
const NON_CPU_READS: u32 = 3;

/// Configuration for the background sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Period between scheduled ticks in milliseconds
    pub interval_ms: u64,
    /// Window the CPU read measures over in milliseconds
    pub cpu_window_ms: u64,
    /// Upper bound for a single metric read in milliseconds
    pub metric_timeout_ms: u64,
    /// Path whose filesystem usage is reported
    pub disk_path: PathBuf,
    /// Number of CPU readings kept for the trend
    pub history_capacity: usize,
    /// Consecutive all-failed ticks before the sampler reports degraded
    pub degraded_after_ticks: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: crate::DEFAULT_INTERVAL_MS,
            cpu_window_ms: crate::DEFAULT_CPU_WINDOW_MS,
            metric_timeout_ms: crate::DEFAULT_METRIC_TIMEOUT_MS,
            disk_path: PathBuf::from("/"),
            history_capacity: crate::DEFAULT_HISTORY_CAPACITY,
            degraded_after_ticks: crate::DEFAULT_DEGRADED_AFTER_TICKS,
        }
    }
}

impl SamplerConfig {
    /// Set the tick period.
    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Set the CPU measurement window.
    pub fn with_cpu_window_ms(mut self, cpu_window_ms: u64) -> Self {
        self.cpu_window_ms = cpu_window_ms;
        self
    }

    /// Set the per-metric read bound.
    pub fn with_metric_timeout_ms(mut self, metric_timeout_ms: u64) -> Self {
        self.metric_timeout_ms = metric_timeout_ms;
        self
    }

    /// Set the path whose disk usage is sampled.
    pub fn with_disk_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.disk_path = path.into();
        self
    }

    /// Set the CPU history capacity.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set how many failed ticks in a row mark the sampler degraded.
    pub fn with_degraded_after_ticks(mut self, ticks: u32) -> Self {
        self.degraded_after_ticks = ticks;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn cpu_window(&self) -> Duration {
        Duration::from_millis(self.cpu_window_ms)
    }

    pub fn metric_timeout(&self) -> Duration {
        Duration::from_millis(self.metric_timeout_ms)
    }

    /// The CPU read blocks for its window on top of the normal bound.
    pub fn cpu_timeout(&self) -> Duration {
        self.cpu_window() + self.metric_timeout()
    }

    /// Worst case for one whole tick.
    pub fn tick_budget(&self) -> Duration {
        self.cpu_timeout() + self.metric_timeout() * NON_CPU_READS
    }

    /// A manual refresh may wait for an in-flight tick before running its own.
    pub fn refresh_timeout(&self) -> Duration {
        self.tick_budget() * 2
    }

    /// Check that the values can drive a sampler.
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(SystemError::config_error("interval must be greater than zero"));
        }
        if self.metric_timeout_ms == 0 {
            return Err(SystemError::config_error(
                "metric timeout must be greater than zero",
            ));
        }
        if self.history_capacity == 0 {
            return Err(SystemError::config_error(
                "history capacity must be at least 1",
            ));
        }
        if self.degraded_after_ticks == 0 {
            return Err(SystemError::config_error(
                "degraded threshold must be at least 1 tick",
            ));
        }
        if self.disk_path.as_os_str().is_empty() {
            return Err(SystemError::config_error("disk path must not be empty"));
        }
        Ok(())
    }
}
