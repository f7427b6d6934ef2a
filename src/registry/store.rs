//! Session registry implementation
//!
//! The registry maps connection identities to camera or display entries. Both
//! maps live behind one `RwLock`, so an identity can never be in both and
//! readers never observe a half-applied registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, RwLock};

use crate::protocol::Dimensions;
use crate::session::SessionRole;

use super::entry::{
    CameraEntry, CameraHandle, DisplayEntry, DisplaySender, Registration, SessionRegistration,
};
use super::error::RegistryError;
use super::frame::{BroadcastSnapshot, SessionId};

#[derive(Default)]
struct Sessions {
    cameras: HashMap<SessionId, Arc<RwLock<CameraEntry>>>,
    displays: HashMap<SessionId, DisplayEntry>,
}

impl Sessions {
    fn contains(&self, id: &SessionId) -> bool {
        self.cameras.contains_key(id) || self.displays.contains_key(id)
    }
}

/// Central registry of camera and display sessions
pub struct SessionRegistry {
    sessions: RwLock<Sessions>,

    /// Bumped on every registration change and every buffer mutation
    version: Arc<AtomicU64>,

    /// Signalled whenever a camera appends a frame
    frame_notify: Arc<Notify>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(Sessions::default()),
            version: Arc::new(AtomicU64::new(0)),
            frame_notify: Arc::new(Notify::new()),
        }
    }

    /// Register a session under `id`
    ///
    /// Fails with `DuplicateRegistration` if `id` is already registered in
    /// either role.
    pub async fn register(
        &self,
        id: SessionId,
        registration: SessionRegistration,
    ) -> Result<Registration, RegistryError> {
        match registration {
            SessionRegistration::Camera(dimensions) => self
                .register_camera(id, dimensions)
                .await
                .map(Registration::Camera),
            SessionRegistration::Display(sender) => self
                .register_display(id, sender)
                .await
                .map(|()| Registration::Display),
        }
    }

    /// Register a camera session
    ///
    /// Returns the handle through which the session appends to its buffer.
    pub async fn register_camera(
        &self,
        id: SessionId,
        dimensions: Dimensions,
    ) -> Result<CameraHandle, RegistryError> {
        let mut sessions = self.sessions.write().await;

        if sessions.contains(&id) {
            return Err(RegistryError::DuplicateRegistration(id));
        }

        let entry = Arc::new(RwLock::new(CameraEntry::new(dimensions)));
        sessions.cameras.insert(id, Arc::clone(&entry));
        self.bump();

        tracing::info!(
            peer = %id,
            dimensions = %dimensions,
            cameras = sessions.cameras.len(),
            "Camera registered"
        );

        Ok(CameraHandle::new(
            id,
            dimensions,
            entry,
            Arc::clone(&self.version),
            Arc::clone(&self.frame_notify),
        ))
    }

    /// Register a display session with its output channel
    pub async fn register_display(
        &self,
        id: SessionId,
        sender: DisplaySender,
    ) -> Result<(), RegistryError> {
        let mut sessions = self.sessions.write().await;

        if sessions.contains(&id) {
            return Err(RegistryError::DuplicateRegistration(id));
        }

        sessions.displays.insert(id, DisplayEntry::new(sender));
        self.bump();

        tracing::info!(
            peer = %id,
            displays = sessions.displays.len(),
            "Display registered"
        );

        Ok(())
    }

    /// Remove a session from whichever map holds it
    ///
    /// Unregistering an absent identity is a no-op and returns `None`, so
    /// error paths may race to clean up the same session.
    pub async fn unregister(&self, id: &SessionId) -> Option<SessionRole> {
        let mut sessions = self.sessions.write().await;

        let role = if sessions.cameras.remove(id).is_some() {
            SessionRole::Camera
        } else if sessions.displays.remove(id).is_some() {
            SessionRole::Display
        } else {
            return None;
        };
        self.bump();

        tracing::info!(peer = %id, role = %role, "Session unregistered");
        Some(role)
    }

    /// Copy every camera's buffered frames
    ///
    /// Each entry is read under its own lock, so a concurrent clear is seen
    /// either entirely or not at all. The registry lock is held throughout so
    /// a removed camera never appears in a later snapshot.
    pub async fn snapshot_cameras(&self) -> BroadcastSnapshot {
        let sessions = self.sessions.read().await;

        let mut cameras = Vec::with_capacity(sessions.cameras.len());
        for (id, entry) in sessions.cameras.iter() {
            cameras.push(entry.read().await.snapshot(*id));
        }
        cameras.sort_by_key(|c| c.id);

        BroadcastSnapshot::new(cameras)
    }

    /// Current display output channels
    pub async fn list_displays(&self) -> Vec<(SessionId, DisplaySender)> {
        let sessions = self.sessions.read().await;
        sessions
            .displays
            .iter()
            .map(|(id, entry)| (*id, entry.sender.clone()))
            .collect()
    }

    /// Role an identity is registered under, if any
    pub async fn role_of(&self, id: &SessionId) -> Option<SessionRole> {
        let sessions = self.sessions.read().await;
        if sessions.cameras.contains_key(id) {
            Some(SessionRole::Camera)
        } else if sessions.displays.contains_key(id) {
            Some(SessionRole::Display)
        } else {
            None
        }
    }

    pub async fn camera_count(&self) -> usize {
        self.sessions.read().await.cameras.len()
    }

    pub async fn display_count(&self) -> usize {
        self.sessions.read().await.displays.len()
    }

    /// Change counter; equal values mean nothing the broadcast depends on moved
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Wait until some camera appends a frame
    pub async fn frame_added(&self) {
        self.frame_notify.notified().await;
    }

    fn bump(&self) {
        self.version.fetch_add(1, Ordering::Release);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
