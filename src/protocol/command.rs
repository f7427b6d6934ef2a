//! Text command parsing
//!
//! Commands, dimensions and motion flags all travel in fixed-size text
//! slots. This module turns the decoded slot text into typed values.

use std::fmt;

use crate::error::ProtocolError;

use super::constants::*;

/// A command token sent by a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register as a camera; a dimensions slot follows
    CameraJoin,
    /// Register as a display
    DisplayJoin,
    /// Display is leaving
    DisplayLeave,
    /// Camera is leaving; a motion flag slot follows
    CameraLeave,
    /// Persist the camera's buffered frames
    StoreVideo,
    /// A binary frame follows
    Stream,
    /// Anything else
    Unknown(String),
}

impl Command {
    /// Parse a trimmed token
    pub fn parse(token: &str) -> Self {
        match token {
            CMD_CAMERA_JOIN => Command::CameraJoin,
            CMD_DISPLAY_JOIN => Command::DisplayJoin,
            CMD_DISPLAY_LEAVE => Command::DisplayLeave,
            CMD_CAMERA_LEAVE => Command::CameraLeave,
            CMD_STORE_VIDEO => Command::StoreVideo,
            CMD_STREAM => Command::Stream,
            other => Command::Unknown(other.to_string()),
        }
    }

    /// Wire token for this command
    pub fn as_str(&self) -> &str {
        match self {
            Command::CameraJoin => CMD_CAMERA_JOIN,
            Command::DisplayJoin => CMD_DISPLAY_JOIN,
            Command::DisplayLeave => CMD_DISPLAY_LEAVE,
            Command::CameraLeave => CMD_CAMERA_LEAVE,
            Command::StoreVideo => CMD_STORE_VIDEO,
            Command::Stream => CMD_STREAM,
            Command::Unknown(token) => token,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared camera frame size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse `"<width>x<height>"`; both sides must be positive
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidDimensions(text.to_string());

        let (w, h) = text
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;

        if width == 0 || height == 0 {
            return Err(invalid());
        }

        Ok(Self { width, height })
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parse the motion flag sent after `camera_leave`
pub fn parse_motion_flag(text: &str) -> Result<bool, ProtocolError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ProtocolError::InvalidMotionFlag(text.to_string())),
    }
}
