//! Scriptable metric source for tests and benchmarks.

use crate::error::{Result, SystemError};
use crate::metrics::data::{
    CpuPercent, DiskUsage, HostIdentity, MemoryUsage, MetricKind, NetworkInfo,
};
use crate::metrics::traits::MetricSource;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// How one metric kind responds when read.
#[derive(Debug, Clone, PartialEq)]
pub enum Behavior {
    Succeed,
    Fail(String),
    /// Sleep, then succeed.
    Slow(Duration),
}

/// A [`MetricSource`] whose responses are set by the test.
pub struct ScriptedSource {
    behaviors: Mutex<HashMap<MetricKind, Behavior>>,
    cpu_values: Mutex<VecDeque<f32>>,
    default_cpu: f32,
    calls: HashMap<MetricKind, AtomicUsize>,
    cpu_in_flight: AtomicUsize,
    max_cpu_in_flight: AtomicUsize,
}

impl ScriptedSource {
    /// Every kind succeeds; CPU reads return `default_cpu`.
    pub fn new(default_cpu: f32) -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            cpu_values: Mutex::new(VecDeque::new()),
            default_cpu,
            calls: MetricKind::ALL
                .iter()
                .map(|kind| (*kind, AtomicUsize::new(0)))
                .collect(),
            cpu_in_flight: AtomicUsize::new(0),
            max_cpu_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_behavior(self, kind: MetricKind, behavior: Behavior) -> Self {
        self.set_behavior(kind, behavior);
        self
    }

    /// CPU values returned in order before falling back to the default.
    pub fn with_cpu_values(self, values: impl IntoIterator<Item = f32>) -> Self {
        self.cpu_values
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend(values);
        self
    }

    pub fn set_behavior(&self, kind: MetricKind, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(kind, behavior);
    }

    /// Number of times `kind` has been read.
    pub fn calls(&self, kind: MetricKind) -> usize {
        self.calls
            .get(&kind)
            .map(|count| count.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Highest number of CPU reads ever running at once.
    pub fn max_concurrent_cpu_reads(&self) -> usize {
        self.max_cpu_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, kind: MetricKind) -> Result<()> {
        if let Some(count) = self.calls.get(&kind) {
            count.fetch_add(1, Ordering::SeqCst);
        }
        let behavior = self
            .behaviors
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&kind)
            .cloned()
            .unwrap_or(Behavior::Succeed);

        match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(message) => Err(SystemError::unavailable(kind, message)),
            Behavior::Slow(delay) => {
                std::thread::sleep(delay);
                Ok(())
            }
        }
    }
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self::new(25.0)
    }
}

impl MetricSource for ScriptedSource {
    fn read_cpu_percent(&self, window: Duration) -> Result<CpuPercent> {
        let in_flight = self.cpu_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_cpu_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        std::thread::sleep(window);
        let result = self.enter(MetricKind::Cpu).and_then(|()| {
            let value = self
                .cpu_values
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .pop_front()
                .unwrap_or(self.default_cpu);
            CpuPercent::new(value)
        });

        self.cpu_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn read_memory(&self) -> Result<MemoryUsage> {
        self.enter(MetricKind::Memory)?;
        MemoryUsage::from_bytes(4 << 30, 16 << 30)
    }

    fn read_disk(&self, path: &Path) -> Result<DiskUsage> {
        self.enter(MetricKind::Disk)?;
        DiskUsage::from_bytes(path.to_string_lossy(), 120 << 30, 500 << 30)
    }

    fn read_network(&self) -> Result<NetworkInfo> {
        self.enter(MetricKind::Network)?;
        Ok(NetworkInfo {
            interface_count: 3,
            active_connections: 42,
        })
    }

    fn read_host_identity(&self) -> HostIdentity {
        if let Some(count) = self.calls.get(&MetricKind::Host) {
            count.fetch_add(1, Ordering::SeqCst);
        }
        HostIdentity {
            os: "TestOS".to_string(),
            version: "1.0".to_string(),
            release: "6.1.0-test".to_string(),
            arch: "x86_64".to_string(),
            processor: "Test CPU @ 2.40GHz".to_string(),
            hostname: "test-host".to_string(),
        }
    }
}
