//! Session state machine
//!
//! Tracks a connection's role from accept to close. The role leaves
//! `Unregistered` at most once and never goes back.

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use crate::protocol::Dimensions;

/// What a connection registered as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    /// Connected, no join command yet
    Unregistered,
    /// Supplies frames
    Camera,
    /// Receives broadcast snapshots
    Display,
}

impl SessionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionRole::Unregistered => "unregistered",
            SessionRole::Camera => "camera",
            SessionRole::Display => "display",
        }
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Reading commands
    Open,
    /// Leave processed, error hit, or shutdown; terminal
    Closed,
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Remote peer address, the session's identity
    pub peer_addr: SocketAddr,

    /// Current role
    pub role: SessionRole,

    /// Current phase
    pub phase: SessionPhase,

    /// Declared frame size (cameras only)
    pub dimensions: Option<Dimensions>,

    /// Connection start time
    pub connected_at: Instant,

    /// Time the role was assigned
    pub registered_at: Option<Instant>,

    /// Frames received (cameras only)
    pub frames_received: u64,

    /// Videos persisted (cameras only)
    pub videos_stored: u64,

    /// Motion flag reported on leave
    pub motion_detected: Option<bool>,
}

impl SessionState {
    pub fn new(peer_addr: SocketAddr) -> Self {
        Self {
            peer_addr,
            role: SessionRole::Unregistered,
            phase: SessionPhase::Open,
            dimensions: None,
            connected_at: Instant::now(),
            registered_at: None,
            frames_received: 0,
            videos_stored: 0,
            motion_detected: None,
        }
    }

    /// Become a camera; returns false if a role was already assigned
    pub fn become_camera(&mut self, dimensions: Dimensions) -> bool {
        if self.role != SessionRole::Unregistered {
            return false;
        }
        self.role = SessionRole::Camera;
        self.dimensions = Some(dimensions);
        self.registered_at = Some(Instant::now());
        true
    }

    /// Become a display; returns false if a role was already assigned
    pub fn become_display(&mut self) -> bool {
        if self.role != SessionRole::Unregistered {
            return false;
        }
        self.role = SessionRole::Display;
        self.registered_at = Some(Instant::now());
        true
    }

    /// Count a received frame
    pub fn on_frame(&mut self) {
        self.frames_received += 1;
    }

    /// Count a persisted video
    pub fn on_video_stored(&mut self) {
        self.videos_stored += 1;
    }

    /// Enter the terminal phase
    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    pub fn is_open(&self) -> bool {
        self.phase == SessionPhase::Open
    }

    pub fn is_camera(&self) -> bool {
        self.role == SessionRole::Camera
    }

    pub fn is_display(&self) -> bool {
        self.role == SessionRole::Display
    }

    /// Time since accept
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}
