//! Session registry
//!
//! Tracks which connections are cameras and which are displays, and owns
//! the camera frame buffers the broadcast engine reads.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<SessionRegistry>
//!                  ┌─────────────────────────────┐
//!                  │ RwLock<                     │
//!                  │   cameras:  id -> Arc<RwLock<CameraEntry>>
//!                  │   displays: id -> DisplayEntry { tx }
//!                  │ >                           │
//!                  └──────┬───────────────┬──────┘
//!                         │               │
//!         CameraHandle ◄──┘               └──► snapshot_cameras()
//!         push_frame()                         list_displays()
//!         clear_persisted()                         │
//!                                                   ▼
//!                                           BroadcastEngine ──► displays
//! ```
//!
//! Frames are `bytes::Bytes`, so a snapshot copies reference counts, not
//! image data.

pub mod entry;
pub mod error;
pub mod frame;
pub mod store;

pub use entry::{
    CameraEntry, CameraHandle, DisplayEntry, DisplaySender, Registration, SessionRegistration,
};
pub use error::RegistryError;
pub use frame::{BroadcastSnapshot, CameraSnapshot, SessionId};
pub use store::SessionRegistry;
