//! Statistics for the relay
//!
//! Counters are atomics shared by every session task and the broadcast
//! engine; [`RelayStats::snapshot`] reads them into a plain struct.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
    snapshots_sent: AtomicU64,
    snapshots_dropped: AtomicU64,
    videos_stored: AtomicU64,
    persist_failures: AtomicU64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            snapshots_sent: AtomicU64::new(0),
            snapshots_dropped: AtomicU64::new(0),
            videos_stored: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
        }
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        // Never below zero
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn frame_received(&self, bytes: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshots_sent(&self, delivered: usize, dropped: usize) {
        self.snapshots_sent.fetch_add(delivered as u64, Ordering::Relaxed);
        self.snapshots_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn video_stored(&self) {
        self.videos_stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn persist_failed(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            snapshots_sent: self.snapshots_sent.load(Ordering::Relaxed),
            snapshots_dropped: self.snapshots_dropped.load(Ordering::Relaxed),
            videos_stored: self.videos_stored.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Total connections ever
    pub total_connections: u64,
    /// Current active connections
    pub active_connections: u64,
    /// Frames accepted from cameras
    pub frames_received: u64,
    /// Frame payload bytes accepted from cameras
    pub bytes_received: u64,
    /// Snapshots queued to displays
    pub snapshots_sent: u64,
    /// Snapshots skipped because a display's queue was full
    pub snapshots_dropped: u64,
    /// Videos persisted
    pub videos_stored: u64,
    /// Video sink failures
    pub persist_failures: u64,
    /// Time since the stats were created
    pub uptime: Duration,
}

impl StatsSnapshot {
    /// Average ingest rate in bits per second
    pub fn ingest_bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.bytes_received * 8) / secs
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = RelayStats::new().snapshot();
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.frames_received, 0);
        assert_eq!(stats.videos_stored, 0);
    }

    #[test]
    fn test_connection_counts() {
        let stats = RelayStats::new();
        stats.connection_opened();
        stats.connection_opened();
        stats.connection_closed();
        stats.connection_closed();
        stats.connection_closed();

        let snap = stats.snapshot();
        assert_eq!(snap.total_connections, 2);
        assert_eq!(snap.active_connections, 0);
    }

    #[test]
    fn test_frame_and_broadcast_counts() {
        let stats = RelayStats::new();
        stats.frame_received(100);
        stats.frame_received(50);
        stats.snapshots_sent(3, 1);
        stats.video_stored();
        stats.persist_failed();

        let snap = stats.snapshot();
        assert_eq!(snap.frames_received, 2);
        assert_eq!(snap.bytes_received, 150);
        assert_eq!(snap.snapshots_sent, 3);
        assert_eq!(snap.snapshots_dropped, 1);
        assert_eq!(snap.videos_stored, 1);
        assert_eq!(snap.persist_failures, 1);
    }

    #[test]
    fn test_ingest_bitrate() {
        let snap = StatsSnapshot {
            bytes_received: 1_000_000,
            uptime: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(snap.ingest_bitrate(), 800_000);

        let zero = StatsSnapshot {
            bytes_received: 1_000_000,
            ..Default::default()
        };
        assert_eq!(zero.ingest_bitrate(), 0);
    }
}
