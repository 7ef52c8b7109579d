//! Platform metric source backed by sysinfo and direct /proc access.

use crate::error::{Result, SystemError};
use crate::metrics::data::{
    CpuPercent, DiskUsage, HostIdentity, MemoryUsage, MetricKind, NetworkInfo,
};
use crate::metrics::traits::MetricSource;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use sysinfo::{Disks, Networks, System};

/// Socket tables counted for the active connection figure.
const SOCKET_TABLES: [&str; 4] = [
    "/proc/net/tcp",
    "/proc/net/tcp6",
    "/proc/net/udp",
    "/proc/net/udp6",
];

/// System metrics collector using sysinfo and direct /proc access.
///
/// Each metric kind owns its own sysinfo handle so a CPU window in progress
/// never holds up a memory or disk read.
pub struct SystemCollector {
    cpu: Mutex<System>,
    memory: Mutex<System>,
    disks: Mutex<Disks>,
    networks: Mutex<Networks>,
}

impl SystemCollector {
    /// Create a new system collector instance.
    pub fn new() -> Result<Self> {
        let mut cpu = System::new();
        cpu.refresh_cpu_usage();
        let mut memory = System::new();
        memory.refresh_memory();

        Ok(Self {
            cpu: Mutex::new(cpu),
            memory: Mutex::new(memory),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
        })
    }
}

impl SystemCollector {
    fn processor_brand(&self) -> String {
        let brand = self.cpu.lock().ok().and_then(|system| {
            system
                .cpus()
                .first()
                .map(|cpu| cpu.brand().trim().to_string())
        });
        unknown_if_none(brand)
    }
}

fn lock<T>(mutex: &Mutex<T>, kind: MetricKind) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| SystemError::unavailable(kind, "collector state poisoned by an earlier panic"))
}

/// Count socket entries in a /proc/net table, skipping the header row.
fn count_socket_entries(table: &str) -> usize {
    table
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .count()
}

fn unknown_if_none(value: Option<String>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

impl MetricSource for SystemCollector {
    fn read_cpu_percent(&self, window: Duration) -> Result<CpuPercent> {
        let mut system = lock(&self.cpu, MetricKind::Cpu)?;

        // sysinfo needs two refreshes at least MINIMUM_CPU_UPDATE_INTERVAL apart
        system.refresh_cpu_usage();
        std::thread::sleep(window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
        system.refresh_cpu_usage();

        let cpus = system.cpus();
        if cpus.is_empty() {
            return Err(SystemError::unavailable(
                MetricKind::Cpu,
                "No CPU information available",
            ));
        }

        let usage = cpus.iter().map(|cpu| cpu.cpu_usage()).sum::<f32>() / cpus.len() as f32;
        if !usage.is_finite() {
            return Err(SystemError::unavailable(
                MetricKind::Cpu,
                "CPU usage is not a number",
            ));
        }
        CpuPercent::new(usage.clamp(0.0, 100.0))
    }

    fn read_memory(&self) -> Result<MemoryUsage> {
        let mut system = lock(&self.memory, MetricKind::Memory)?;
        system.refresh_memory();

        let total_bytes = system.total_memory();
        if total_bytes == 0 {
            return Err(SystemError::unavailable(
                MetricKind::Memory,
                "total memory reported as zero",
            ));
        }
        MemoryUsage::from_bytes(system.used_memory().min(total_bytes), total_bytes)
    }

    fn read_disk(&self, path: &Path) -> Result<DiskUsage> {
        let mut disks = lock(&self.disks, MetricKind::Disk)?;
        disks.refresh_list();

        // The filesystem holding `path` is the one with the deepest matching mount point.
        let disk = disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().components().count())
            .ok_or_else(|| {
                SystemError::unavailable(
                    MetricKind::Disk,
                    format!("no mounted filesystem holds {}", path.display()),
                )
            })?;

        let total_bytes = disk.total_space();
        let used_bytes = total_bytes.saturating_sub(disk.available_space());
        DiskUsage::from_bytes(path.to_string_lossy(), used_bytes, total_bytes)
    }

    fn read_network(&self) -> Result<NetworkInfo> {
        let interface_count = {
            let mut networks = lock(&self.networks, MetricKind::Network)?;
            networks.refresh_list();
            networks.list().len()
        };

        let mut readable = 0;
        let mut active_connections = 0;
        for table in SOCKET_TABLES {
            if let Ok(content) = fs::read_to_string(table) {
                readable += 1;
                active_connections += count_socket_entries(&content);
            }
        }

        if readable == 0 {
            return Err(SystemError::unavailable(
                MetricKind::Network,
                "no socket table readable under /proc/net",
            ));
        }

        Ok(NetworkInfo {
            interface_count,
            active_connections,
        })
    }

    fn read_host_identity(&self) -> HostIdentity {
        HostIdentity {
            os: unknown_if_none(System::name()),
            version: unknown_if_none(System::os_version()),
            release: unknown_if_none(System::kernel_version()),
            arch: std::env::consts::ARCH.to_string(),
            processor: self.processor_brand(),
            hostname: unknown_if_none(System::host_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCP_TABLE: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:0277 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 20355 1 0000000000000000 100 0 0 10 0
   1: 0F02000A:0016 0202000A:C5B8 01 00000000:00000000 02:0009E4D8 00000000     0        0 41213 2 0000000000000000 20 4 31 10 -1
";

    #[test]
    fn test_count_socket_entries_skips_header() {
        assert_eq!(count_socket_entries(TCP_TABLE), 2);
        assert_eq!(count_socket_entries("header only\n"), 0);
        assert_eq!(count_socket_entries(""), 0);
    }

    #[test]
    fn test_system_collector_creation() {
        let collector = SystemCollector::new();
        assert!(collector.is_ok());
    }

    #[test]
    fn test_host_identity_never_empty() {
        let collector = SystemCollector::new().unwrap();
        let host = collector.read_host_identity();
        assert!(!host.os.is_empty());
        assert!(!host.hostname.is_empty());
        assert_eq!(host.arch, std::env::consts::ARCH);
        assert!(!host.processor.is_empty());
    }

    #[test]
    fn test_cpu_read_is_in_range() {
        let collector = SystemCollector::new().unwrap();
        let cpu = collector
            .read_cpu_percent(Duration::from_millis(50))
            .unwrap();
        assert!((0.0..=100.0).contains(&cpu.value()));
    }

    #[test]
    fn test_memory_read() {
        let collector = SystemCollector::new().unwrap();
        let memory = collector.read_memory().unwrap();
        assert!(memory.total_bytes() > 0);
        assert!(memory.used_bytes() <= memory.total_bytes());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_root_disk_read() {
        let collector = SystemCollector::new().unwrap();
        match collector.read_disk(Path::new("/")) {
            Ok(disk) => {
                assert_eq!(disk.path(), "/");
                assert!(disk.percent() <= 100.0);
            }
            // Minimal containers may expose no mount table at all
            Err(err) => assert!(err.is_metric_failure()),
        }
    }
}
