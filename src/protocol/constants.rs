//! Wire protocol constants

/// Size of every text slot (commands, dimensions, motion flag)
pub const TEXT_SLOT_SIZE: usize = 64;

/// Size of the binary frame length header (a 64-bit machine word)
pub const LENGTH_HEADER_SIZE: usize = 8;

/// Default upper bound for a single binary frame payload (64 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Type byte preceding a text slot in tagged framing
pub const TAG_TEXT: u8 = 0x01;

/// Type byte preceding a binary frame in tagged framing
pub const TAG_BINARY: u8 = 0x02;

// Command tokens
pub const CMD_CAMERA_JOIN: &str = "camera_join";
pub const CMD_DISPLAY_JOIN: &str = "display_join";
pub const CMD_DISPLAY_LEAVE: &str = "display_leave";
pub const CMD_CAMERA_LEAVE: &str = "camera_leave";
pub const CMD_STORE_VIDEO: &str = "store_video";
pub const CMD_STREAM: &str = "stream";
