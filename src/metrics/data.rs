//! Data structures for sampled metrics.

use crate::error::{Result, SystemError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Current wall clock as a Unix timestamp in milliseconds.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// The metric kinds a snapshot carries, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Cpu,
    Memory,
    Disk,
    Network,
    Host,
}

impl MetricKind {
    /// Every kind, in map order.
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Cpu,
        MetricKind::Memory,
        MetricKind::Disk,
        MetricKind::Network,
        MetricKind::Host,
    ];

    /// Kinds read from the platform on every tick. Host identity is read once.
    pub const SAMPLED: [MetricKind; 4] = [
        MetricKind::Cpu,
        MetricKind::Memory,
        MetricKind::Disk,
        MetricKind::Network,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::Disk => "disk",
            MetricKind::Network => "network",
            MetricKind::Host => "host",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU utilization over one sampling window, always within 0.0..=100.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct CpuPercent(f32);

impl CpuPercent {
    pub fn new(value: f32) -> Result<Self> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(SystemError::invalid_reading(format!(
                "cpu percent {} outside 0..=100",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl TryFrom<f32> for CpuPercent {
    type Error = SystemError;

    fn try_from(value: f32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CpuPercent> for f32 {
    fn from(cpu: CpuPercent) -> f32 {
        cpu.0
    }
}

fn usage_percent(used: u64, total: u64) -> f32 {
    if total > 0 {
        (used as f64 / total as f64 * 100.0) as f32
    } else {
        0.0
    }
}

/// Wire form of [`MemoryUsage`]; the percentage is recomputed on the way in.
#[derive(Deserialize)]
struct RawMemoryUsage {
    used_bytes: u64,
    total_bytes: u64,
}

/// Virtual memory usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMemoryUsage")]
pub struct MemoryUsage {
    used_bytes: u64,
    total_bytes: u64,
    percent: f32,
}

impl MemoryUsage {
    /// Build from used/total byte counts; the percentage is derived.
    pub fn from_bytes(used_bytes: u64, total_bytes: u64) -> Result<Self> {
        if used_bytes > total_bytes {
            return Err(SystemError::invalid_reading(format!(
                "memory used {} exceeds total {}",
                used_bytes, total_bytes
            )));
        }
        Ok(Self {
            used_bytes,
            total_bytes,
            percent: usage_percent(used_bytes, total_bytes),
        })
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn percent(&self) -> f32 {
        self.percent
    }
}

impl TryFrom<RawMemoryUsage> for MemoryUsage {
    type Error = SystemError;

    fn try_from(raw: RawMemoryUsage) -> Result<Self> {
        Self::from_bytes(raw.used_bytes, raw.total_bytes)
    }
}

#[derive(Deserialize)]
struct RawDiskUsage {
    path: String,
    used_bytes: u64,
    total_bytes: u64,
}

/// Usage of the filesystem holding a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDiskUsage")]
pub struct DiskUsage {
    path: String,
    used_bytes: u64,
    total_bytes: u64,
    percent: f32,
}

impl DiskUsage {
    pub fn from_bytes(path: impl Into<String>, used_bytes: u64, total_bytes: u64) -> Result<Self> {
        let path = path.into();
        if used_bytes > total_bytes {
            return Err(SystemError::invalid_reading(format!(
                "disk {} used {} exceeds total {}",
                path, used_bytes, total_bytes
            )));
        }
        Ok(Self {
            percent: usage_percent(used_bytes, total_bytes),
            path,
            used_bytes,
            total_bytes,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn percent(&self) -> f32 {
        self.percent
    }
}

impl TryFrom<RawDiskUsage> for DiskUsage {
    type Error = SystemError;

    fn try_from(raw: RawDiskUsage) -> Result<Self> {
        Self::from_bytes(raw.path, raw.used_bytes, raw.total_bytes)
    }
}

/// Network interface and socket counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub interface_count: usize,
    pub active_connections: usize,
}

/// Static identity of the host and operating system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentity {
    /// Operating system name (e.g., "Ubuntu", "Darwin")
    pub os: String,
    /// Operating system version
    pub version: String,
    /// Kernel release
    pub release: String,
    /// Machine architecture (e.g., "x86_64", "aarch64")
    pub arch: String,
    /// CPU brand string
    pub processor: String,
    pub hostname: String,
}

/// One metric's value at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reading {
    CpuPercent(CpuPercent),
    MemoryUsage(MemoryUsage),
    DiskUsage(DiskUsage),
    NetworkInfo(NetworkInfo),
    HostIdentity(HostIdentity),
}

impl Reading {
    /// The slot this reading belongs in.
    pub fn kind(&self) -> MetricKind {
        match self {
            Reading::CpuPercent(_) => MetricKind::Cpu,
            Reading::MemoryUsage(_) => MetricKind::Memory,
            Reading::DiskUsage(_) => MetricKind::Disk,
            Reading::NetworkInfo(_) => MetricKind::Network,
            Reading::HostIdentity(_) => MetricKind::Host,
        }
    }
}

/// Why a slot holds an error instead of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleErrorKind {
    MetricUnavailable,
    MetricTimeout,
}

/// Failure record replacing a reading for one metric in one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleError {
    pub kind: MetricKind,
    pub error: SampleErrorKind,
    pub message: String,
    /// Unix timestamp in milliseconds when the failure was observed
    pub timestamp: u64,
}

impl SampleError {
    pub fn from_error(kind: MetricKind, err: &SystemError, timestamp: u64) -> Self {
        let error = match err {
            SystemError::MetricTimeout { .. } => SampleErrorKind::MetricTimeout,
            _ => SampleErrorKind::MetricUnavailable,
        };
        Self {
            kind,
            error,
            message: err.to_string(),
            timestamp,
        }
    }
}

/// Contents of one metric slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSlot {
    Reading(Reading),
    Error(SampleError),
}

impl MetricSlot {
    pub fn is_reading(&self) -> bool {
        matches!(self, MetricSlot::Reading(_))
    }
}

/// An immutable bundle of every metric slot captured in one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    sequence: u64,
    /// Unix timestamp in milliseconds
    timestamp: u64,
    slots: BTreeMap<MetricKind, MetricSlot>,
}

impl Snapshot {
    pub fn builder(sequence: u64, timestamp: u64) -> SnapshotBuilder {
        SnapshotBuilder {
            sequence,
            timestamp,
            slots: BTreeMap::new(),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn slots(&self) -> &BTreeMap<MetricKind, MetricSlot> {
        &self.slots
    }

    pub fn slot(&self, kind: MetricKind) -> Option<&MetricSlot> {
        self.slots.get(&kind)
    }

    pub fn reading(&self, kind: MetricKind) -> Option<&Reading> {
        match self.slots.get(&kind) {
            Some(MetricSlot::Reading(reading)) => Some(reading),
            _ => None,
        }
    }

    pub fn error(&self, kind: MetricKind) -> Option<&SampleError> {
        match self.slots.get(&kind) {
            Some(MetricSlot::Error(err)) => Some(err),
            _ => None,
        }
    }

    pub fn cpu_percent(&self) -> Option<f32> {
        match self.reading(MetricKind::Cpu) {
            Some(Reading::CpuPercent(cpu)) => Some(cpu.value()),
            _ => None,
        }
    }

    pub fn memory(&self) -> Option<&MemoryUsage> {
        match self.reading(MetricKind::Memory) {
            Some(Reading::MemoryUsage(memory)) => Some(memory),
            _ => None,
        }
    }

    pub fn disk(&self) -> Option<&DiskUsage> {
        match self.reading(MetricKind::Disk) {
            Some(Reading::DiskUsage(disk)) => Some(disk),
            _ => None,
        }
    }

    pub fn network(&self) -> Option<&NetworkInfo> {
        match self.reading(MetricKind::Network) {
            Some(Reading::NetworkInfo(network)) => Some(network),
            _ => None,
        }
    }

    pub fn host(&self) -> Option<&HostIdentity> {
        match self.reading(MetricKind::Host) {
            Some(Reading::HostIdentity(host)) => Some(host),
            _ => None,
        }
    }

    /// Number of per-tick metrics that produced a reading.
    pub fn sampled_successes(&self) -> usize {
        MetricKind::SAMPLED
            .iter()
            .filter(|kind| self.reading(**kind).is_some())
            .count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &SampleError> {
        self.slots.values().filter_map(|slot| match slot {
            MetricSlot::Error(err) => Some(err),
            MetricSlot::Reading(_) => None,
        })
    }
}

/// Collects slot results during a tick and seals them into a [`Snapshot`].
#[derive(Debug)]
pub struct SnapshotBuilder {
    sequence: u64,
    timestamp: u64,
    slots: BTreeMap<MetricKind, MetricSlot>,
}

impl SnapshotBuilder {
    /// Record the outcome of one read. A reading of the wrong kind becomes an error.
    pub fn record(&mut self, kind: MetricKind, result: Result<Reading>) -> &mut Self {
        let slot = match result {
            Ok(reading) if reading.kind() == kind => MetricSlot::Reading(reading),
            Ok(reading) => {
                let err = SystemError::unavailable(
                    kind,
                    format!("source returned a {} reading", reading.kind()),
                );
                MetricSlot::Error(SampleError::from_error(kind, &err, self.timestamp))
            }
            Err(err) => MetricSlot::Error(SampleError::from_error(kind, &err, self.timestamp)),
        };
        self.slots.insert(kind, slot);
        self
    }

    /// Seal the snapshot. Kinds never recorded are filled with an error.
    pub fn build(self) -> Snapshot {
        let mut slots = self.slots;
        for kind in MetricKind::ALL {
            slots.entry(kind).or_insert_with(|| {
                let err = SystemError::unavailable(kind, "not sampled");
                MetricSlot::Error(SampleError::from_error(kind, &err, self.timestamp))
            });
        }
        Snapshot {
            sequence: self.sequence,
            timestamp: self.timestamp,
            slots,
        }
    }
}
