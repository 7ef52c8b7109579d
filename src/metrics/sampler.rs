//! Background sampler: reads every metric on a fixed cadence and publishes
//! snapshots to the store.
//!
//! Each tick starts the CPU read first, since it blocks for its whole
//! measurement window, then reads memory, disk and network one after another
//! while the CPU window elapses. Every read runs on the blocking pool under its
//! own timeout; a failure or timeout fills that slot with a `SampleError` and
//! the tick carries on. A read that timed out keeps its kind's gate until it
//! actually returns, so a hung platform call occupies at most one blocking
//! thread. Cancellation is checked between reads and before publishing, so a
//! cancelled tick never publishes.

use crate::error::{Result, SystemError};
use crate::metrics::config::SamplerConfig;
use crate::metrics::data::{now_millis, HostIdentity, MetricKind, Reading, Snapshot};
use crate::metrics::store::SnapshotStore;
use crate::metrics::traits::{MetricSource, MetricsPresenter};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

const REFRESH_QUEUE_DEPTH: usize = 8;

type RefreshReply = oneshot::Sender<Option<Arc<Snapshot>>>;

/// Liveness of the sampler as seen by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SamplerHealth {
    /// No tick has completed yet
    Starting,
    /// The last tick produced at least one reading
    Healthy,
    /// This many ticks in a row produced no reading at all
    Degraded { failed_ticks: u32 },
    /// The sampler task has exited
    Stopped,
}

/// One gate per metric kind, held by the blocking read for as long as it runs.
#[derive(Default)]
struct ReadGates {
    cpu: Arc<Mutex<()>>,
    memory: Arc<Mutex<()>>,
    disk: Arc<Mutex<()>>,
    network: Arc<Mutex<()>>,
    host: Arc<Mutex<()>>,
}

impl ReadGates {
    fn get(&self, kind: MetricKind) -> &Arc<Mutex<()>> {
        match kind {
            MetricKind::Cpu => &self.cpu,
            MetricKind::Memory => &self.memory,
            MetricKind::Disk => &self.disk,
            MetricKind::Network => &self.network,
            MetricKind::Host => &self.host,
        }
    }
}

/// Drives a [`MetricSource`] and publishes into a [`SnapshotStore`].
pub struct Sampler {
    source: Arc<dyn MetricSource>,
    store: Arc<SnapshotStore>,
    config: SamplerConfig,
    host: HostIdentity,
    gates: ReadGates,
    sequence: u64,
    last_timestamp: u64,
    failed_ticks: u32,
    health: watch::Sender<SamplerHealth>,
}

impl Sampler {
    /// Create a sampler. Host identity is read once here.
    pub fn new(
        source: Arc<dyn MetricSource>,
        store: Arc<SnapshotStore>,
        config: SamplerConfig,
    ) -> Result<Self> {
        config.validate()?;
        if store.history_capacity() != config.history_capacity {
            return Err(SystemError::config_error(format!(
                "store keeps {} CPU readings but the config asks for {}",
                store.history_capacity(),
                config.history_capacity
            )));
        }
        let host = source.read_host_identity();
        debug!("Host identity: {} {} on {}", host.os, host.release, host.hostname);

        let (health, _) = watch::channel(SamplerHealth::Starting);
        Ok(Self {
            source,
            store,
            config,
            host,
            gates: ReadGates::default(),
            sequence: 0,
            last_timestamp: 0,
            failed_ticks: 0,
            health,
        })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn health(&self) -> SamplerHealth {
        *self.health.borrow()
    }

    /// Run one read-assemble-publish cycle.
    ///
    /// Returns `None` if `cancel` fired before the snapshot was published.
    pub async fn tick(&mut self, cancel: &CancellationToken) -> Option<Arc<Snapshot>> {
        if cancel.is_cancelled() {
            return None;
        }
        let started = Instant::now();
        let timestamp = now_millis().max(self.last_timestamp);

        let mut cpu = self.spawn_cpu_read();
        let mut results = Vec::with_capacity(MetricKind::ALL.len());

        for kind in [MetricKind::Memory, MetricKind::Disk, MetricKind::Network] {
            if cancel.is_cancelled() {
                cpu.abort();
                debug!("Tick cancelled before {} read", kind);
                return None;
            }
            let result = match kind {
                MetricKind::Memory => {
                    self.read_bounded(kind, |source| {
                        source.read_memory().map(Reading::MemoryUsage)
                    })
                    .await
                }
                MetricKind::Disk => {
                    let path = self.config.disk_path.clone();
                    self.read_bounded(kind, move |source| {
                        source.read_disk(&path).map(Reading::DiskUsage)
                    })
                    .await
                }
                _ => {
                    self.read_bounded(kind, |source| {
                        source.read_network().map(Reading::NetworkInfo)
                    })
                    .await
                }
            };
            results.push((kind, result));
        }

        let cpu_result = tokio::select! {
            joined = &mut cpu => joined.unwrap_or_else(|err| {
                Err(SystemError::unavailable(MetricKind::Cpu, format!("read task failed: {}", err)))
            }),
            _ = cancel.cancelled() => {
                cpu.abort();
                debug!("Tick cancelled while waiting for the CPU window");
                return None;
            }
        };
        results.push((MetricKind::Cpu, cpu_result.map(Reading::CpuPercent)));
        results.push((MetricKind::Host, Ok(Reading::HostIdentity(self.host.clone()))));

        if cancel.is_cancelled() {
            return None;
        }

        self.sequence += 1;
        let mut builder = Snapshot::builder(self.sequence, timestamp);
        for (kind, result) in results {
            if let Err(err) = &result {
                debug!("{} sample failed: {}", kind, err);
            }
            builder.record(kind, result);
        }
        let snapshot = Arc::new(builder.build());

        if let Err(err) = self.store.publish(Arc::clone(&snapshot)) {
            error!("Failed to publish snapshot {}: {}", snapshot.sequence(), err);
            return None;
        }
        self.last_timestamp = timestamp;
        self.update_health(&snapshot);

        trace!(
            "Tick {} took {:?} ({} of {} metrics sampled)",
            snapshot.sequence(),
            started.elapsed(),
            snapshot.sampled_successes(),
            MetricKind::SAMPLED.len()
        );
        Some(snapshot)
    }

    /// Start the CPU read in the background.
    ///
    /// The gate is held by the blocking read until it returns, even after the
    /// timeout gave up on it, so two CPU windows never overlap.
    fn spawn_cpu_read(&self) -> JoinHandle<Result<crate::metrics::data::CpuPercent>> {
        let gate = Arc::clone(self.gates.get(MetricKind::Cpu));
        let source = Arc::clone(&self.source);
        let window = self.config.cpu_window();
        let bound = self.config.cpu_timeout();

        tokio::spawn(async move {
            let read = async move {
                let permit = gate.lock_owned().await;
                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    source.read_cpu_percent(window)
                })
                .await
            };
            match time::timeout(bound, read).await {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => Err(SystemError::unavailable(
                    MetricKind::Cpu,
                    format!("read task failed: {}", err),
                )),
                Err(_) => Err(timeout_error(MetricKind::Cpu, bound)),
            }
        })
    }

    async fn read_bounded<F>(&self, kind: MetricKind, read: F) -> Result<Reading>
    where
        F: FnOnce(&dyn MetricSource) -> Result<Reading> + Send + 'static,
    {
        // A previous read of this kind that timed out may still be running.
        let Ok(permit) = Arc::clone(self.gates.get(kind)).try_lock_owned() else {
            return Err(SystemError::unavailable(kind, "previous read still running"));
        };

        let source = Arc::clone(&self.source);
        let bound = self.config.metric_timeout();
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            read(source.as_ref())
        });

        match time::timeout(bound, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => Err(SystemError::unavailable(
                kind,
                format!("read task failed: {}", err),
            )),
            Err(_) => Err(timeout_error(kind, bound)),
        }
    }

    fn update_health(&mut self, snapshot: &Snapshot) {
        if snapshot.sampled_successes() > 0 {
            if self.failed_ticks >= self.config.degraded_after_ticks {
                info!(
                    "Sampler recovered after {} failed ticks",
                    self.failed_ticks
                );
            }
            self.failed_ticks = 0;
            self.health.send_replace(SamplerHealth::Healthy);
            return;
        }

        self.failed_ticks = self.failed_ticks.saturating_add(1);
        if self.failed_ticks >= self.config.degraded_after_ticks {
            if self.failed_ticks == self.config.degraded_after_ticks {
                warn!(
                    "Sampler degraded: no metric could be read for {} consecutive ticks",
                    self.failed_ticks
                );
            }
            self.health.send_replace(SamplerHealth::Degraded {
                failed_ticks: self.failed_ticks,
            });
        }
    }

    /// Move the sampler onto its own task.
    pub fn spawn(self) -> (SamplerHandle, SamplerTask) {
        let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_QUEUE_DEPTH);
        let cancel = CancellationToken::new();

        let handle = SamplerHandle {
            store: Arc::clone(&self.store),
            refresh_tx,
            health: self.health.subscribe(),
            refresh_timeout: self.config.refresh_timeout(),
        };

        let join = tokio::spawn(self.run(refresh_rx, cancel.clone()));
        (handle, SamplerTask { cancel, join })
    }

    async fn run(mut self, mut refresh_rx: mpsc::Receiver<RefreshReply>, cancel: CancellationToken) {
        info!(
            "Sampler started: every {}ms, cpu window {}ms, metric timeout {}ms",
            self.config.interval_ms, self.config.cpu_window_ms, self.config.metric_timeout_ms
        );

        let mut ticker = time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(first) = refresh_rx.recv() => {
                    // Requests already queued share this tick.
                    let mut waiting = vec![first];
                    while let Ok(reply) = refresh_rx.try_recv() {
                        waiting.push(reply);
                    }
                    debug!("Manual refresh requested by {} callers", waiting.len());

                    let snapshot = self.tick(&cancel).await;
                    for reply in waiting {
                        let _ = reply.send(snapshot.clone());
                    }
                    ticker.reset();
                }
                _ = ticker.tick() => {
                    self.tick(&cancel).await;
                }
            }
        }

        self.health.send_replace(SamplerHealth::Stopped);
        info!("Sampler stopped after {} snapshots", self.sequence);
    }
}

fn timeout_error(kind: MetricKind, bound: Duration) -> SystemError {
    SystemError::MetricTimeout {
        kind,
        timeout_ms: bound.as_millis() as u64,
    }
}

/// Cloneable read side of a running sampler.
#[derive(Clone)]
pub struct SamplerHandle {
    store: Arc<SnapshotStore>,
    refresh_tx: mpsc::Sender<RefreshReply>,
    health: watch::Receiver<SamplerHealth>,
    refresh_timeout: Duration,
}

impl SamplerHandle {
    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Watch health transitions.
    pub fn health_changes(&self) -> watch::Receiver<SamplerHealth> {
        self.health.clone()
    }
}

#[async_trait]
impl MetricsPresenter for SamplerHandle {
    fn latest(&self) -> Result<Arc<Snapshot>> {
        self.store.latest().ok_or(SystemError::NoSnapshotYet)
    }

    fn history(&self) -> Vec<f32> {
        self.store.history()
    }

    fn history_capacity(&self) -> usize {
        self.store.history_capacity()
    }

    fn health(&self) -> SamplerHealth {
        *self.health.borrow()
    }

    fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.store.subscribe()
    }

    async fn trigger_refresh(&self) -> Result<Arc<Snapshot>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = async {
            self.refresh_tx
                .send(reply_tx)
                .await
                .map_err(|_| SystemError::SamplerStopped)?;
            match reply_rx.await {
                Ok(Some(snapshot)) => Ok(snapshot),
                Ok(None) | Err(_) => Err(SystemError::SamplerStopped),
            }
        };

        time::timeout(self.refresh_timeout, request)
            .await
            .map_err(|_| SystemError::RefreshTimeout(self.refresh_timeout.as_millis() as u64))?
    }
}

/// Owner of the sampler task; stops it on request.
pub struct SamplerTask {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl SamplerTask {
    /// Token that stops the sampler when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signal the sampler to stop and wait for its task to exit.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.join
            .await
            .map_err(|err| SystemError::system_error(format!("sampler task failed: {}", err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::fake::{Behavior, ScriptedSource};

    fn fast_config() -> SamplerConfig {
        SamplerConfig::default()
            .with_interval_ms(20)
            .with_cpu_window_ms(5)
            .with_metric_timeout_ms(100)
            .with_history_capacity(3)
            .with_degraded_after_ticks(2)
    }

    fn sampler(source: ScriptedSource, config: SamplerConfig) -> (Arc<ScriptedSource>, Sampler) {
        let source = Arc::new(source);
        let store = Arc::new(SnapshotStore::new(config.history_capacity));
        let sampler = Sampler::new(source.clone(), store, config).unwrap();
        (source, sampler)
    }

    #[tokio::test]
    async fn test_tick_fills_every_slot() {
        let (_, mut sampler) = sampler(ScriptedSource::new(37.5), fast_config());
        let snapshot = sampler.tick(&CancellationToken::new()).await.unwrap();

        assert_eq!(snapshot.sequence(), 1);
        assert_eq!(snapshot.cpu_percent(), Some(37.5));
        assert!(snapshot.memory().is_some());
        assert_eq!(snapshot.disk().unwrap().path(), "/");
        assert_eq!(snapshot.network().unwrap().active_connections, 42);
        assert_eq!(snapshot.host().unwrap().hostname, "test-host");
        assert_eq!(sampler.health(), SamplerHealth::Healthy);
    }

    #[test]
    fn test_rejects_store_with_other_capacity() {
        let store = Arc::new(SnapshotStore::new(10));
        let config = fast_config().with_history_capacity(3);
        let err = Sampler::new(Arc::new(ScriptedSource::default()), store, config)
            .err()
            .unwrap();
        assert!(matches!(err, SystemError::Config(_)));
    }

    #[tokio::test]
    async fn test_host_identity_read_once() {
        let (source, mut sampler) = sampler(ScriptedSource::default(), fast_config());
        let cancel = CancellationToken::new();
        sampler.tick(&cancel).await.unwrap();
        sampler.tick(&cancel).await.unwrap();
        assert_eq!(source.calls(MetricKind::Host), 1);
        assert_eq!(source.calls(MetricKind::Memory), 2);
    }

    #[tokio::test]
    async fn test_slow_read_becomes_timeout() {
        let source = ScriptedSource::default()
            .with_behavior(MetricKind::Disk, Behavior::Slow(Duration::from_millis(400)));
        let (_, mut sampler) = sampler(source, fast_config());

        let snapshot = sampler.tick(&CancellationToken::new()).await.unwrap();
        let err = snapshot.error(MetricKind::Disk).unwrap();
        assert_eq!(err.error, crate::metrics::data::SampleErrorKind::MetricTimeout);
        assert!(snapshot.memory().is_some());
        assert!(snapshot.network().is_some());
    }

    #[tokio::test]
    async fn test_hung_read_is_not_restarted() {
        let source = ScriptedSource::default()
            .with_behavior(MetricKind::Disk, Behavior::Slow(Duration::from_millis(400)));
        let (source, mut sampler) = sampler(source, fast_config());
        let cancel = CancellationToken::new();

        sampler.tick(&cancel).await.unwrap();
        let snapshot = sampler.tick(&cancel).await.unwrap();

        let err = snapshot.error(MetricKind::Disk).unwrap();
        assert_eq!(err.error, crate::metrics::data::SampleErrorKind::MetricUnavailable);
        assert!(err.message.contains("still running"));
        assert_eq!(source.calls(MetricKind::Disk), 1);
        assert!(snapshot.memory().is_some());
    }

    #[tokio::test]
    async fn test_cancelled_tick_publishes_nothing() {
        let (_, mut sampler) = sampler(ScriptedSource::default(), fast_config());
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(sampler.tick(&cancel).await.is_none());
        assert_eq!(sampler.store().publish_count(), 0);
    }

    #[tokio::test]
    async fn test_degrades_and_recovers() {
        let source = ScriptedSource::default();
        for kind in MetricKind::SAMPLED {
            source.set_behavior(kind, Behavior::Fail("down".to_string()));
        }
        let (source, mut sampler) = sampler(source, fast_config());
        let cancel = CancellationToken::new();

        sampler.tick(&cancel).await.unwrap();
        assert_eq!(sampler.health(), SamplerHealth::Starting);
        sampler.tick(&cancel).await.unwrap();
        assert_eq!(sampler.health(), SamplerHealth::Degraded { failed_ticks: 2 });
        sampler.tick(&cancel).await.unwrap();
        assert_eq!(sampler.health(), SamplerHealth::Degraded { failed_ticks: 3 });

        source.set_behavior(MetricKind::Memory, Behavior::Succeed);
        sampler.tick(&cancel).await.unwrap();
        assert_eq!(sampler.health(), SamplerHealth::Healthy);
    }

    #[tokio::test]
    async fn test_timestamps_never_decrease() {
        let (_, mut sampler) = sampler(ScriptedSource::default(), fast_config());
        let cancel = CancellationToken::new();
        let mut last = 0;
        for _ in 0..5 {
            let snapshot = sampler.tick(&cancel).await.unwrap();
            assert!(snapshot.timestamp() >= last);
            last = snapshot.timestamp();
        }
    }
}
