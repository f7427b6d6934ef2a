//! Broadcast engine
//!
//! Periodically copies every camera's buffer out of the registry, encodes the
//! copy once, and queues the same `Bytes` to every display. Queues are
//! bounded and filled with `try_send`, so a slow display loses snapshots
//! instead of stalling the cameras.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::protocol::encode_snapshot;
use crate::registry::SessionRegistry;
use crate::stats::RelayStats;

/// Which buffered frames each snapshot carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotMode {
    /// Each camera's most recent frame
    #[default]
    Latest,
    /// Each camera's whole buffer since its last persist
    All,
}

/// Outcome of one broadcast cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Displays the snapshot was queued to
    pub delivered: usize,
    /// Displays skipped because their queue was full
    pub dropped: usize,
    /// Displays found disconnected and removed from the registry
    pub removed: usize,
}

/// Pushes snapshots of the camera registry to displays
pub struct BroadcastEngine {
    registry: Arc<SessionRegistry>,
    stats: Arc<RelayStats>,
    mode: SnapshotMode,
    interval: Duration,
}

impl BroadcastEngine {
    pub fn new(
        registry: Arc<SessionRegistry>,
        stats: Arc<RelayStats>,
        mode: SnapshotMode,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            stats,
            mode,
            interval,
        }
    }

    /// Run until cancelled
    ///
    /// A cycle runs on every tick and whenever a camera appends a frame.
    /// Frames arriving while a cycle is running collapse into a single
    /// follow-up cycle. Cycles where nothing changed since the last complete
    /// delivery are skipped.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_version = None;

        tracing::debug!(interval_ms = self.interval.as_millis() as u64, mode = ?self.mode, "Broadcast engine started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.registry.frame_added() => {
                    ticker.reset();
                }
            }

            let version = self.registry.version();
            if last_version == Some(version) {
                continue;
            }

            let report = self.broadcast_once().await;
            // A display that missed this state gets it again on the next tick
            if report.dropped == 0 {
                last_version = Some(version);
            }
            if report.removed > 0 || report.dropped > 0 {
                tracing::debug!(
                    delivered = report.delivered,
                    dropped = report.dropped,
                    removed = report.removed,
                    "Broadcast cycle"
                );
            }
        }

        tracing::debug!("Broadcast engine stopped");
    }

    /// Run one broadcast cycle now
    pub async fn broadcast_once(&self) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        let displays = self.registry.list_displays().await;
        if displays.is_empty() {
            return report;
        }

        let snapshot = self.registry.snapshot_cameras().await;
        let snapshot = match self.mode {
            SnapshotMode::Latest => snapshot.latest_only(),
            SnapshotMode::All => snapshot,
        };
        let payload = encode_snapshot(&snapshot);

        let mut gone = Vec::new();
        for (id, sender) in displays {
            match sender.try_send(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    tracing::debug!(peer = %id, "Display queue full, snapshot dropped");
                }
                Err(TrySendError::Closed(_)) => gone.push(id),
            }
        }

        // Removal happens after the fan-out so one dead display never delays the rest
        for id in gone {
            if self.registry.unregister(&id).await.is_some() {
                report.removed += 1;
                tracing::info!(peer = %id, "Display disconnected, removed during broadcast");
            }
        }

        self.stats.snapshots_sent(report.delivered, report.dropped);
        report
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::protocol::{decode_snapshot, Dimensions};

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn engine(registry: &Arc<SessionRegistry>, mode: SnapshotMode) -> BroadcastEngine {
        BroadcastEngine::new(
            Arc::clone(registry),
            Arc::new(RelayStats::new()),
            mode,
            Duration::from_millis(10),
        )
    }

    /// Strip the length header the display writer would send
    fn body(payload: Bytes) -> Bytes {
        payload.slice(8..)
    }

    #[tokio::test]
    async fn test_no_displays_is_a_noop() {
        let registry = Arc::new(SessionRegistry::new());
        let report = engine(&registry, SnapshotMode::Latest).broadcast_once().await;
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_display_receives_camera_frame() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, mut rx) = mpsc::channel(4);
        registry.register_display(peer(6000), tx).await.unwrap();

        let camera = registry
            .register_camera(peer(5000), Dimensions::new(640, 480))
            .await
            .unwrap();
        camera.push_frame(Bytes::from_static(b"frame-1")).await;

        let report = engine(&registry, SnapshotMode::Latest).broadcast_once().await;
        assert_eq!(report.delivered, 1);

        let snapshot = decode_snapshot(body(rx.recv().await.unwrap())).unwrap();
        let cam = snapshot.camera(&peer(5000)).unwrap();
        assert_eq!(cam.frames, vec![Bytes::from_static(b"frame-1")]);
        assert_eq!((cam.width, cam.height), (640, 480));
    }

    #[tokio::test]
    async fn test_latest_versus_all() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, mut rx) = mpsc::channel(4);
        registry.register_display(peer(6000), tx).await.unwrap();

        let camera = registry
            .register_camera(peer(5000), Dimensions::new(1, 1))
            .await
            .unwrap();
        camera.push_frame(Bytes::from_static(b"a")).await;
        camera.push_frame(Bytes::from_static(b"b")).await;

        engine(&registry, SnapshotMode::Latest).broadcast_once().await;
        let latest = decode_snapshot(body(rx.recv().await.unwrap())).unwrap();
        assert_eq!(latest.frame_count(), 1);
        assert_eq!(latest.cameras[0].frames[0], Bytes::from_static(b"b"));

        engine(&registry, SnapshotMode::All).broadcast_once().await;
        let all = decode_snapshot(body(rx.recv().await.unwrap())).unwrap();
        assert_eq!(all.frame_count(), 2);
    }

    #[tokio::test]
    async fn test_closed_display_removed_others_still_served() {
        let registry = Arc::new(SessionRegistry::new());

        let (dead_tx, dead_rx) = mpsc::channel(4);
        let (live_tx, mut live_rx) = mpsc::channel(4);
        registry.register_display(peer(6000), dead_tx).await.unwrap();
        registry.register_display(peer(6001), live_tx).await.unwrap();
        drop(dead_rx);

        let report = engine(&registry, SnapshotMode::Latest).broadcast_once().await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.removed, 1);
        assert!(live_rx.recv().await.is_some());
        assert_eq!(registry.display_count().await, 1);
        assert!(registry.role_of(&peer(6000)).await.is_none());
    }

    #[tokio::test]
    async fn test_full_display_is_skipped() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, mut rx) = mpsc::channel(1);
        registry.register_display(peer(6000), tx).await.unwrap();

        let engine = engine(&registry, SnapshotMode::Latest);
        assert_eq!(engine.broadcast_once().await.delivered, 1);

        let report = engine.broadcast_once().await;
        assert_eq!(report.dropped, 1);
        assert_eq!(report.removed, 0);

        // Still registered, and the first snapshot is intact
        assert_eq!(registry.display_count().await, 1);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_run_resends_state_missed_by_full_display() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, mut rx) = mpsc::channel(1);
        registry.register_display(peer(6000), tx.clone()).await.unwrap();

        // Queue already full when the only frame arrives
        tx.try_send(Bytes::from_static(b"stale")).unwrap();
        drop(tx);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(engine(&registry, SnapshotMode::Latest).run(cancel.clone()));

        let camera = registry
            .register_camera(peer(5000), Dimensions::new(1, 1))
            .await
            .unwrap();
        camera.push_frame(Bytes::from_static(b"idle")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"stale"));

        let snapshot = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let snapshot = decode_snapshot(body(rx.recv().await.unwrap())).unwrap();
                if snapshot.frame_count() == 1 {
                    return snapshot;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(
            snapshot.camera(&peer(5000)).unwrap().frames,
            vec![Bytes::from_static(b"idle")]
        );

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_delivers_and_stops_on_cancel() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, mut rx) = mpsc::channel(16);
        registry.register_display(peer(6000), tx).await.unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(engine(&registry, SnapshotMode::Latest).run(cancel.clone()));

        let camera = registry
            .register_camera(peer(5000), Dimensions::new(1, 1))
            .await
            .unwrap();
        camera.push_frame(Bytes::from_static(b"live")).await;

        let received = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let payload = rx.recv().await.unwrap();
                let snapshot = decode_snapshot(body(payload)).unwrap();
                if snapshot.frame_count() == 1 {
                    return snapshot;
                }
            }
        })
        .await
        .unwrap();
        assert!(received.camera(&peer(5000)).is_some());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
