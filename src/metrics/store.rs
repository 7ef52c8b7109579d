//! Latest snapshot and CPU history shared between the sampler and readers.
//!
//! The store keeps one immutable `StoreState` behind an [`ArcSwap`]. A publish
//! builds the next state and swaps the pointer, so a reader sees either the
//! previous state or the new one and never waits on the writer.

use crate::error::{Result, SystemError};
use crate::metrics::data::Snapshot;
use crate::metrics::history::History;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, trace};

const UPDATE_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug)]
struct StoreState {
    latest: Option<Arc<Snapshot>>,
    history: History,
}

/// Concurrency-safe holder of the latest snapshot and the CPU trend.
pub struct SnapshotStore {
    state: ArcSwap<StoreState>,
    // Serializes publishers only; readers never touch it.
    write_lock: Mutex<()>,
    publishes: AtomicU64,
    updates: broadcast::Sender<Arc<Snapshot>>,
}

impl SnapshotStore {
    pub fn new(history_capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            state: ArcSwap::from_pointee(StoreState {
                latest: None,
                history: History::with_capacity(history_capacity),
            }),
            write_lock: Mutex::new(()),
            publishes: AtomicU64::new(0),
            updates,
        }
    }

    /// Replace the latest snapshot and append its CPU reading, if any, to history.
    ///
    /// Rejects a snapshot older than the current latest.
    pub fn publish(&self, snapshot: Arc<Snapshot>) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let current = self.state.load();
        if let Some(latest) = &current.latest {
            if snapshot.timestamp() < latest.timestamp() {
                return Err(SystemError::StaleSnapshot {
                    offered: snapshot.timestamp(),
                    latest: latest.timestamp(),
                });
            }
        }

        let mut history = current.history.clone();
        if let Some(cpu) = snapshot.cpu_percent() {
            history.push(cpu);
        }

        self.state.store(Arc::new(StoreState {
            latest: Some(Arc::clone(&snapshot)),
            history,
        }));
        let count = self.publishes.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(
            "Published snapshot #{} at {}",
            snapshot.sequence(),
            snapshot.timestamp()
        );

        // Nobody listening is fine.
        if let Ok(receivers) = self.updates.send(snapshot) {
            debug!("Snapshot {} pushed to {} subscribers", count, receivers);
        }
        Ok(())
    }

    /// The most recent snapshot, `None` before the first publish.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.state.load().latest.clone()
    }

    /// Copy of the CPU trend, oldest first.
    pub fn history(&self) -> Vec<f32> {
        self.state.load().history.to_vec()
    }

    /// Latest snapshot and history taken from the same published state.
    pub fn view(&self) -> (Option<Arc<Snapshot>>, Vec<f32>) {
        let state = self.state.load();
        (state.latest.clone(), state.history.to_vec())
    }

    pub fn history_capacity(&self) -> usize {
        self.state.load().history.capacity()
    }

    /// Total successful publishes.
    pub fn publish_count(&self) -> u64 {
        self.publishes.load(Ordering::Acquire)
    }

    /// Receive every snapshot published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.updates.subscribe()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(crate::DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::{CpuPercent, MetricKind, Reading};
    use std::thread;

    fn snapshot(sequence: u64, cpu: f32) -> Arc<Snapshot> {
        let mut builder = Snapshot::builder(sequence, sequence * 10);
        builder.record(MetricKind::Cpu, CpuPercent::new(cpu).map(Reading::CpuPercent));
        Arc::new(builder.build())
    }

    #[test]
    fn test_empty_store() {
        let store = SnapshotStore::new(3);
        assert!(store.latest().is_none());
        assert!(store.history().is_empty());
        assert_eq!(store.publish_count(), 0);
    }

    #[test]
    fn test_publish_replaces_latest_and_bounds_history() {
        let store = SnapshotStore::new(3);
        for (seq, cpu) in [(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0)] {
            store.publish(snapshot(seq, cpu)).unwrap();
        }
        assert_eq!(store.latest().unwrap().sequence(), 4);
        assert_eq!(store.history(), vec![2.0, 3.0, 4.0]);
        assert_eq!(store.publish_count(), 4);
    }

    #[test]
    fn test_failed_cpu_slot_skips_history() {
        let store = SnapshotStore::new(3);
        store.publish(snapshot(1, 10.0)).unwrap();
        store
            .publish(Arc::new(Snapshot::builder(2, 20).build()))
            .unwrap();
        assert_eq!(store.history(), vec![10.0]);
        assert_eq!(store.latest().unwrap().sequence(), 2);
    }

    #[test]
    fn test_rejects_older_snapshot() {
        let store = SnapshotStore::new(3);
        store.publish(snapshot(5, 1.0)).unwrap();
        let err = store.publish(snapshot(4, 1.0)).unwrap_err();
        assert!(matches!(err, SystemError::StaleSnapshot { .. }));
        assert_eq!(store.latest().unwrap().sequence(), 5);
    }

    #[tokio::test]
    async fn test_subscribers_receive_publishes() {
        let store = SnapshotStore::new(3);
        let mut rx = store.subscribe();
        store.publish(snapshot(1, 42.0)).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.cpu_percent(), Some(42.0));
    }

    #[test]
    fn test_readers_never_observe_torn_snapshots() {
        const PUBLISHES: u64 = 2_000;
        let store = Arc::new(SnapshotStore::new(10));

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mut last_seen = 0;
                    while last_seen < PUBLISHES {
                        if let Some(snap) = store.latest() {
                            // Every published snapshot has cpu == sequence % 100
                            // and timestamp == sequence * 10.
                            let seq = snap.sequence();
                            assert_eq!(snap.timestamp(), seq * 10);
                            assert_eq!(snap.cpu_percent(), Some((seq % 100) as f32));
                            assert_eq!(snap.slots().len(), MetricKind::ALL.len());
                            assert!(seq >= last_seen, "sequence went backwards");
                            last_seen = seq;
                        }
                        let history = store.history();
                        assert!(history.len() <= 10);
                    }
                })
            })
            .collect();

        for seq in 1..=PUBLISHES {
            store.publish(snapshot(seq, (seq % 100) as f32)).unwrap();
        }

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.publish_count(), PUBLISHES);
    }
}
