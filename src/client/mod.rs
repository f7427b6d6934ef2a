//! Relay client implementation
//!
//! Speaks the relay wire protocol from the other side of the socket:
//! - [`CameraClient`] registers with its frame size, streams frames and asks
//!   the relay to persist them
//! - [`DisplayClient`] registers as a viewer and reads broadcast snapshots
//!
//! Both are thin wrappers over the codec and are mainly used by tests and
//! tooling that drives a running relay.

pub mod camera;
pub mod display;

pub use camera::CameraClient;
pub use display::DisplayClient;
