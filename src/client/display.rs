//! Display-side client

use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::Result;
use crate::protocol::constants::{CMD_DISPLAY_JOIN, CMD_DISPLAY_LEAVE, DEFAULT_MAX_FRAME_SIZE};
use crate::protocol::{encode_text, FrameReader, Framing};
use crate::registry::BroadcastSnapshot;

/// Receives broadcast snapshots from a relay
pub struct DisplayClient {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    framing: Framing,
    local_addr: SocketAddr,
}

impl DisplayClient {
    /// Connect to a relay
    pub async fn connect<A: ToSocketAddrs>(addr: A, framing: Framing) -> Result<Self> {
        Self::connect_with_limit(addr, framing, DEFAULT_MAX_FRAME_SIZE).await
    }

    /// Connect, accepting snapshots up to `max_snapshot_size` bytes
    pub async fn connect_with_limit<A: ToSocketAddrs>(
        addr: A,
        framing: Framing,
        max_snapshot_size: usize,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let local_addr = stream.local_addr()?;

        let (read_half, writer) = stream.into_split();

        Ok(Self {
            reader: FrameReader::new(read_half, framing, max_snapshot_size),
            writer,
            framing,
            local_addr,
        })
    }

    /// Address the relay identifies this display by
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Register as a display
    pub async fn join(&mut self) -> Result<()> {
        self.writer
            .write_all(&encode_text(CMD_DISPLAY_JOIN, self.framing))
            .await?;
        Ok(())
    }

    /// Wait for the next snapshot
    pub async fn next_snapshot(&mut self) -> Result<BroadcastSnapshot> {
        self.reader.read_snapshot().await
    }

    /// Leave and close the connection
    pub async fn leave(mut self) -> Result<()> {
        self.writer
            .write_all(&encode_text(CMD_DISPLAY_LEAVE, self.framing))
            .await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}
