//! Camera frame relay
//!
//! A TCP server sitting between cameras and displays:
//!
//! - Cameras register with their frame size, stream raw frames, and ask the
//!   relay to persist what it has buffered as a video file
//! - Displays register and receive periodic snapshots of every camera's
//!   buffered frames
//!
//! ```text
//!  camera ──frames──► Connection ──► SessionRegistry ◄── BroadcastEngine ──► display queues
//!                          │
//!                          └── store_video ──► VideoSink ──► output_dir
//! ```
//!
//! # Example
//! ```no_run
//! use camrelay::{RelayServer, ServerConfig};
//!
//! # async fn example() -> camrelay::error::Result<()> {
//! let config = ServerConfig::default().output_dir("/var/lib/camrelay");
//! let server = RelayServer::with_raw_sink(config);
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use media::{RawVideoSink, UniqueFilenames, VideoRequest, VideoSink};
pub use registry::{BroadcastSnapshot, CameraSnapshot, SessionRegistry};
pub use server::{EnvSource, RelayServer, ServerConfig, SnapshotMode};
