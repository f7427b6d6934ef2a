//! Snapshot types
//!
//! A frame is the serialized raw image exactly as received, held as `Bytes`
//! so copying a camera's buffer into a snapshot only bumps reference counts.
//! Its width and height are the owning camera's declared dimensions.

use std::net::SocketAddr;
use std::time::SystemTime;

use bytes::Bytes;

/// Identity of a live connection (its remote address)
pub type SessionId = SocketAddr;

/// One camera's state as copied out of the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSnapshot {
    pub id: SessionId,
    pub width: u32,
    pub height: u32,
    /// Buffered frames in arrival order
    pub frames: Vec<Bytes>,
}

impl CameraSnapshot {
    /// Keep only the most recent frame
    pub fn latest_only(mut self) -> Self {
        if self.frames.len() > 1 {
            let last = self.frames.split_off(self.frames.len() - 1);
            self.frames = last;
        }
        self
    }
}

/// Point-in-time copy of every camera's buffered frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastSnapshot {
    pub taken_at: SystemTime,
    /// Cameras ordered by id
    pub cameras: Vec<CameraSnapshot>,
}

impl BroadcastSnapshot {
    pub fn new(cameras: Vec<CameraSnapshot>) -> Self {
        Self {
            taken_at: SystemTime::now(),
            cameras,
        }
    }

    /// Look up a camera by id
    pub fn camera(&self, id: &SessionId) -> Option<&CameraSnapshot> {
        self.cameras.iter().find(|c| &c.id == id)
    }

    /// Total number of frames across all cameras
    pub fn frame_count(&self) -> usize {
        self.cameras.iter().map(|c| c.frames.len()).sum()
    }

    /// Reduce every camera to its latest frame
    pub fn latest_only(self) -> Self {
        Self {
            taken_at: self.taken_at,
            cameras: self
                .cameras
                .into_iter()
                .map(CameraSnapshot::latest_only)
                .collect(),
        }
    }
}
