//! Camera-side client

use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::Result;
use crate::protocol::constants::{CMD_CAMERA_JOIN, CMD_CAMERA_LEAVE, CMD_STORE_VIDEO, CMD_STREAM};
use crate::protocol::{encode_binary, encode_text, Dimensions, Framing};

/// Streams frames to a relay as a camera
///
/// # Example
/// ```no_run
/// use camrelay::client::CameraClient;
/// use camrelay::protocol::{Dimensions, Framing};
///
/// # async fn example() -> camrelay::error::Result<()> {
/// let mut camera = CameraClient::connect("127.0.0.1:8485", Framing::Legacy).await?;
/// camera.join(Dimensions::new(640, 480)).await?;
/// camera.send_frame(b"...jpeg bytes...").await?;
/// camera.store_video().await?;
/// camera.leave(false).await?;
/// # Ok(())
/// # }
/// ```
pub struct CameraClient {
    stream: TcpStream,
    framing: Framing,
    local_addr: SocketAddr,
}

impl CameraClient {
    /// Connect to a relay
    pub async fn connect<A: ToSocketAddrs>(addr: A, framing: Framing) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let local_addr = stream.local_addr()?;

        Ok(Self {
            stream,
            framing,
            local_addr,
        })
    }

    /// Address the relay identifies this camera by
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Register as a camera producing frames of `dimensions`
    pub async fn join(&mut self, dimensions: Dimensions) -> Result<()> {
        self.send_command(CMD_CAMERA_JOIN).await?;
        self.send_command(&dimensions.to_string()).await
    }

    /// Send one frame, announced with `stream`
    pub async fn send_frame(&mut self, data: &[u8]) -> Result<()> {
        let mut out = Vec::with_capacity(data.len() + 96);
        out.extend_from_slice(&encode_text(CMD_STREAM, self.framing));
        out.extend_from_slice(&encode_binary(data, self.framing));
        self.stream.write_all(&out).await?;
        Ok(())
    }

    /// Send one frame without the `stream` announcement
    pub async fn send_raw_frame(&mut self, data: &[u8]) -> Result<()> {
        self.stream
            .write_all(&encode_binary(data, self.framing))
            .await?;
        Ok(())
    }

    /// Ask the relay to persist everything buffered so far
    pub async fn store_video(&mut self) -> Result<()> {
        self.send_command(CMD_STORE_VIDEO).await
    }

    /// Leave, telling the relay whether motion was seen
    pub async fn leave(mut self, motion: bool) -> Result<()> {
        self.send_command(CMD_CAMERA_LEAVE).await?;
        self.send_command(if motion { "true" } else { "false" })
            .await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Send an arbitrary text slot
    pub async fn send_command(&mut self, text: &str) -> Result<()> {
        self.stream
            .write_all(&encode_text(text, self.framing))
            .await?;
        Ok(())
    }
}
