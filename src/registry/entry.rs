//! Camera and display entries
//!
//! A camera entry is shared between the registry (read by the broadcast
//! engine) and the owning session's [`CameraHandle`] (the only writer).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::{mpsc, Notify, RwLock};

use crate::protocol::Dimensions;

use super::frame::{CameraSnapshot, SessionId};

/// Outbound queue of encoded snapshots for one display
pub type DisplaySender = mpsc::Sender<Bytes>;

/// Buffered state of a camera session
#[derive(Debug)]
pub struct CameraEntry {
    /// Declared frame size, fixed at registration
    pub dimensions: Dimensions,

    /// Frames since the last successful persist, in arrival order
    pub(super) frames: Vec<Bytes>,

    /// Frames received over the session's lifetime
    pub total_frames: u64,

    /// Payload bytes received over the session's lifetime
    pub total_bytes: u64,

    /// When the camera registered
    pub joined_at: Instant,
}

impl CameraEntry {
    pub(super) fn new(dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            frames: Vec::new(),
            total_frames: 0,
            total_bytes: 0,
            joined_at: Instant::now(),
        }
    }

    /// Copy this entry out for a broadcast snapshot
    pub(super) fn snapshot(&self, id: SessionId) -> CameraSnapshot {
        CameraSnapshot {
            id,
            width: self.dimensions.width,
            height: self.dimensions.height,
            frames: self.frames.clone(),
        }
    }
}

/// A registered display's output channel
#[derive(Debug, Clone)]
pub struct DisplayEntry {
    pub sender: DisplaySender,
    pub joined_at: Instant,
}

impl DisplayEntry {
    pub(super) fn new(sender: DisplaySender) -> Self {
        Self {
            sender,
            joined_at: Instant::now(),
        }
    }
}

/// What a session asks to be registered as
#[derive(Debug)]
pub enum SessionRegistration {
    Camera(Dimensions),
    Display(DisplaySender),
}

/// What a successful registration hands back
#[derive(Debug)]
pub enum Registration {
    /// Write access to the new camera's buffer
    Camera(CameraHandle),
    Display,
}

/// Write access to one camera's frame buffer
///
/// Handed out once by `register_camera`; the session that owns it is the
/// only code that appends to or clears the buffer.
#[derive(Debug)]
pub struct CameraHandle {
    id: SessionId,
    dimensions: Dimensions,
    entry: Arc<RwLock<CameraEntry>>,
    version: Arc<AtomicU64>,
    notify: Arc<Notify>,
}

impl CameraHandle {
    pub(super) fn new(
        id: SessionId,
        dimensions: Dimensions,
        entry: Arc<RwLock<CameraEntry>>,
        version: Arc<AtomicU64>,
        notify: Arc<Notify>,
    ) -> Self {
        Self {
            id,
            dimensions,
            entry,
            version,
            notify,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Append a frame and wake the broadcast engine
    pub async fn push_frame(&self, data: Bytes) {
        {
            let mut entry = self.entry.write().await;
            entry.total_frames += 1;
            entry.total_bytes += data.len() as u64;
            entry.frames.push(data);
        }
        self.version.fetch_add(1, Ordering::Release);
        self.notify.notify_one();
    }

    /// Copy of the current buffer, in arrival order
    pub async fn buffered_frames(&self) -> Vec<Bytes> {
        self.entry.read().await.frames.clone()
    }

    /// Number of buffered frames
    pub async fn len(&self) -> usize {
        self.entry.read().await.frames.len()
    }

    /// Drop the first `count` frames after they were persisted
    ///
    /// Returns the number of frames still buffered.
    pub async fn clear_persisted(&self, count: usize) -> usize {
        let remaining = {
            let mut entry = self.entry.write().await;
            let count = count.min(entry.frames.len());
            entry.frames.drain(..count);
            entry.frames.len()
        };
        self.version.fetch_add(1, Ordering::Release);
        remaining
    }

    /// Lifetime counters: (frames, bytes)
    pub async fn totals(&self) -> (u64, u64) {
        let entry = self.entry.read().await;
        (entry.total_frames, entry.total_bytes)
    }
}
