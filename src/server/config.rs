//! Server configuration

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::protocol::constants::DEFAULT_MAX_FRAME_SIZE;
use crate::protocol::Framing;

use super::broadcast::SnapshotMode;
use super::env::{EnvSource, OUTPUT_KEYFRAMES, SERVER_ADDRESS, SERVER_PORT};

/// Frame rate used when `OUTPUT_KEYFRAMES` is not set
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Directory persisted videos are written to
    pub output_dir: PathBuf,

    /// Frame rate written into persisted videos
    pub frame_rate: u32,

    /// Wire framing expected from clients
    pub framing: Framing,

    /// Largest accepted binary frame payload
    pub max_frame_size: usize,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Longest time between broadcast cycles
    pub broadcast_interval: Duration,

    /// Which buffered frames go into each broadcast
    pub snapshot_mode: SnapshotMode,

    /// Snapshots queued per display before new ones are dropped
    pub display_queue_capacity: usize,

    /// Upper bound for writing one snapshot to a display
    pub write_timeout: Duration,

    /// How long sessions may drain after a shutdown request
    pub shutdown_grace: Duration,

    /// Persist non-empty camera buffers when shutting down
    pub persist_on_shutdown: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8485)),
            output_dir: PathBuf::from("."),
            frame_rate: DEFAULT_FRAME_RATE,
            framing: Framing::Legacy,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_connections: 0, // Unlimited
            tcp_nodelay: true,
            broadcast_interval: Duration::from_millis(100),
            snapshot_mode: SnapshotMode::Latest,
            display_queue_capacity: 4,
            write_timeout: Duration::from_secs(2),
            shutdown_grace: Duration::from_secs(10),
            persist_on_shutdown: true,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Build from `SERVER_ADDRESS`, `SERVER_PORT` and `OUTPUT_KEYFRAMES`
    ///
    /// Address and port are required; the frame rate defaults to 30.
    pub fn from_env(env: &EnvSource, output_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let address = env.require(SERVER_ADDRESS)?;
        let port: u16 = env.parse(SERVER_PORT)?;
        let bind_addr = resolve(address, port)?;

        let frame_rate: u32 = env.parse_or(OUTPUT_KEYFRAMES, DEFAULT_FRAME_RATE)?;
        if frame_rate == 0 {
            return Err(ConfigError::InvalidValue {
                key: OUTPUT_KEYFRAMES,
                value: "0".into(),
            });
        }

        Ok(Self {
            bind_addr,
            output_dir: output_dir.into(),
            frame_rate,
            ..Default::default()
        })
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the output directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the persisted video frame rate (at least 1)
    pub fn frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = fps.max(1);
        self
    }

    /// Set the wire framing
    pub fn framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Set the largest accepted frame payload
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the broadcast cadence
    pub fn broadcast_interval(mut self, interval: Duration) -> Self {
        self.broadcast_interval = interval;
        self
    }

    /// Set the snapshot mode
    pub fn snapshot_mode(mut self, mode: SnapshotMode) -> Self {
        self.snapshot_mode = mode;
        self
    }

    /// Set the per-display queue capacity (at least 1)
    pub fn display_queue_capacity(mut self, capacity: usize) -> Self {
        self.display_queue_capacity = capacity.max(1);
        self
    }

    /// Set the display write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the shutdown drain period
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Do not persist camera buffers on shutdown
    pub fn disable_persist_on_shutdown(mut self) -> Self {
        self.persist_on_shutdown = false;
        self
    }
}

fn resolve(address: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    (address, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::InvalidValue {
            key: SERVER_ADDRESS,
            value: address.to_string(),
        })
}
