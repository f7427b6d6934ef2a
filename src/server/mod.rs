//! Relay server
//!
//! [`RelayServer`] accepts connections and gives each its own
//! [`Connection`] task. A single [`BroadcastEngine`] pushes camera snapshots
//! to every registered display.

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod context;
pub mod env;
pub mod listener;

pub use broadcast::{BroadcastEngine, BroadcastReport, SnapshotMode};
pub use config::ServerConfig;
pub use connection::Connection;
pub use context::RelayContext;
pub use env::EnvSource;
pub use listener::RelayServer;
