use std::sync::Arc;
use sysdash::{
    error::SystemError,
    metrics::{
        data::{CpuPercent, DiskUsage, HostIdentity, MemoryUsage, NetworkInfo},
        History,
    },
    MetricKind, MetricSlot, Reading, SampleErrorKind, SamplerConfig, Snapshot, SnapshotStore,
    WebConfig,
};

fn sample_snapshot(sequence: u64, timestamp: u64, cpu: f32) -> Snapshot {
    let mut builder = Snapshot::builder(sequence, timestamp);
    builder
        .record(MetricKind::Cpu, CpuPercent::new(cpu).map(Reading::CpuPercent))
        .record(
            MetricKind::Memory,
            MemoryUsage::from_bytes(4 << 30, 8 << 30).map(Reading::MemoryUsage),
        )
        .record(
            MetricKind::Disk,
            Err(SystemError::unavailable(MetricKind::Disk, "permission denied")),
        )
        .record(
            MetricKind::Network,
            Ok(Reading::NetworkInfo(NetworkInfo {
                interface_count: 2,
                active_connections: 7,
            })),
        )
        .record(
            MetricKind::Host,
            Ok(Reading::HostIdentity(HostIdentity {
                os: "Linux".to_string(),
                version: "22.04".to_string(),
                release: "6.5.0".to_string(),
                arch: "aarch64".to_string(),
                processor: "Cortex-A72".to_string(),
                hostname: "web-01".to_string(),
            })),
        );
    builder.build()
}

/// A snapshot serializes every slot, readings and errors alike.
#[test]
fn test_snapshot_serialization() {
    let snapshot = sample_snapshot(3, 1_700_000_000_000, 25.5);
    let json = serde_json::to_value(&snapshot).expect("Should serialize snapshot");

    assert_eq!(json["sequence"], 3);
    assert_eq!(json["timestamp"], 1_700_000_000_000u64);
    assert_eq!(json["slots"]["cpu"]["reading"]["kind"], "cpu_percent");
    assert_eq!(json["slots"]["cpu"]["reading"]["value"], 25.5);
    assert_eq!(
        json["slots"]["memory"]["reading"]["value"]["total_bytes"],
        8u64 << 30
    );
    assert_eq!(json["slots"]["disk"]["error"]["error"], "metric_unavailable");
    assert_eq!(json["slots"]["host"]["reading"]["value"]["hostname"], "web-01");

    let decoded: Snapshot = serde_json::from_str(&json.to_string()).expect("Should deserialize");
    assert_eq!(decoded, snapshot);
}

#[test]
fn test_snapshot_accessors() {
    let snapshot = sample_snapshot(1, 10, 40.0);

    assert_eq!(snapshot.cpu_percent(), Some(40.0));
    assert_eq!(snapshot.memory().map(|m| m.percent()), Some(50.0));
    assert!(snapshot.disk().is_none());
    assert_eq!(snapshot.network().map(|n| n.active_connections), Some(7));
    assert_eq!(snapshot.sampled_successes(), 3);

    let errors: Vec<_> = snapshot.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, MetricKind::Disk);
    assert_eq!(errors[0].error, SampleErrorKind::MetricUnavailable);
    assert_eq!(errors[0].timestamp, 10);
}

/// Every kind has a slot even when the tick never recorded it.
#[test]
fn test_unrecorded_kinds_become_errors() {
    let mut builder = Snapshot::builder(1, 5);
    builder.record(MetricKind::Cpu, Ok(Reading::CpuPercent(CpuPercent::new(1.0).unwrap())));
    let snapshot = builder.build();

    assert_eq!(snapshot.slots().len(), MetricKind::ALL.len());
    for kind in [MetricKind::Memory, MetricKind::Disk, MetricKind::Network, MetricKind::Host] {
        assert!(matches!(snapshot.slot(kind), Some(MetricSlot::Error(_))));
    }
}

#[test]
fn test_mismatched_reading_is_rejected() {
    let mut builder = Snapshot::builder(1, 5);
    builder.record(
        MetricKind::Memory,
        Ok(Reading::CpuPercent(CpuPercent::new(10.0).unwrap())),
    );
    let snapshot = builder.build();
    assert!(snapshot.memory().is_none());
    assert!(snapshot.error(MetricKind::Memory).is_some());
}

#[test]
fn test_reading_validation() {
    assert!(CpuPercent::new(0.0).is_ok());
    assert!(CpuPercent::new(100.0).is_ok());
    assert!(CpuPercent::new(-0.1).is_err());
    assert!(CpuPercent::new(100.5).is_err());
    assert!(CpuPercent::new(f32::NAN).is_err());

    assert!(MemoryUsage::from_bytes(9, 8).is_err());
    assert!(DiskUsage::from_bytes("/", 1, 0).is_err());

    let disk = DiskUsage::from_bytes("/data", 0, 0).unwrap();
    assert_eq!(disk.percent(), 0.0);

    // CPU values outside the valid range never deserialize.
    assert!(serde_json::from_str::<CpuPercent>("101.0").is_err());
}

#[test]
fn test_history_keeps_most_recent() {
    let mut history = History::with_capacity(3);
    for value in [1.0, 2.0, 3.0, 4.0] {
        history.push(value);
    }
    assert_eq!(history.to_vec(), vec![2.0, 3.0, 4.0]);
    assert_eq!(history.len(), 3);
}

#[test]
fn test_store_publishes_in_order() {
    let store = SnapshotStore::new(2);
    assert!(store.latest().is_none());
    assert!(store.history().is_empty());

    store.publish(Arc::new(sample_snapshot(1, 100, 10.0))).unwrap();
    store.publish(Arc::new(sample_snapshot(2, 200, 20.0))).unwrap();
    store.publish(Arc::new(sample_snapshot(3, 300, 30.0))).unwrap();

    assert_eq!(store.latest().map(|s| s.sequence()), Some(3));
    assert_eq!(store.history(), vec![20.0, 30.0]);
    assert_eq!(store.publish_count(), 3);

    let err = store
        .publish(Arc::new(sample_snapshot(4, 250, 40.0)))
        .unwrap_err();
    assert!(matches!(err, SystemError::StaleSnapshot { offered: 250, latest: 300 }));
    assert_eq!(store.latest().map(|s| s.sequence()), Some(3));
}

/// A snapshot without a CPU reading leaves the trend untouched.
#[test]
fn test_store_skips_history_without_cpu() {
    let store = SnapshotStore::new(5);
    let mut builder = Snapshot::builder(1, 1);
    builder.record(
        MetricKind::Cpu,
        Err(SystemError::MetricTimeout {
            kind: MetricKind::Cpu,
            timeout_ms: 2500,
        }),
    );
    store.publish(Arc::new(builder.build())).unwrap();

    assert!(store.history().is_empty());
    let latest = store.latest().unwrap();
    assert_eq!(
        latest.error(MetricKind::Cpu).map(|e| e.error),
        Some(SampleErrorKind::MetricTimeout)
    );
}

#[test]
fn test_sampler_config_defaults() {
    let config = SamplerConfig::default();
    assert_eq!(config.interval_ms, 1000);
    assert_eq!(config.cpu_window_ms, 500);
    assert_eq!(config.metric_timeout_ms, 2000);
    assert_eq!(config.history_capacity, 10);
    assert_eq!(config.degraded_after_ticks, 3);
    assert_eq!(config.disk_path, std::path::PathBuf::from("/"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_sampler_config_validation() {
    assert!(SamplerConfig::default().with_interval_ms(0).validate().is_err());
    assert!(SamplerConfig::default().with_metric_timeout_ms(0).validate().is_err());
    assert!(SamplerConfig::default().with_history_capacity(0).validate().is_err());
    assert!(SamplerConfig::default().with_degraded_after_ticks(0).validate().is_err());
    assert!(SamplerConfig::default().with_disk_path("").validate().is_err());
}

#[test]
fn test_web_config() {
    let config = WebConfig::default();
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, sysdash::DEFAULT_WEB_PORT);
    assert!(config.validate().is_ok());

    let config = WebConfig::new("0.0.0.0", 9000)
        .with_cors(false)
        .with_dashboard_dir(Some("/srv/www"))
        .with_max_websocket_connections(5);
    assert_eq!(config.bind_address(), "0.0.0.0:9000");
    assert!(!config.enable_cors);
    assert_eq!(config.dashboard_dir, Some(std::path::PathBuf::from("/srv/www")));
    assert_eq!(config.max_websocket_connections, 5);

    assert!(WebConfig::default()
        .with_max_websocket_connections(0)
        .validate()
        .is_err());
}

#[test]
fn test_error_display() {
    let err = SystemError::RefreshTimeout(5000);
    assert_eq!(err.to_string(), "refresh did not complete within 5000ms");

    let err = SystemError::config_error("bad port");
    assert_eq!(err.to_string(), "Configuration error: bad port");

    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: SystemError = io.into();
    assert!(matches!(err, SystemError::Io(_)));
}
