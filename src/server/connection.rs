//! Per-connection session state machine
//!
//! ```text
//!                 camera_join + "WxH"
//!   Unregistered ─────────────────────► Camera ──┐ stream / binary frame: append
//!        │                                 │  ◄──┘ store_video: persist, clear
//!        │ display_join                    │
//!        ▼                                 │ camera_leave + motion flag
//!     Display ───── display_leave ────► Closed ◄── EOF / I/O error / shutdown
//! ```
//!
//! Each connection runs this loop on its own task. The camera buffer is only
//! written from here; everything other sessions can see goes through the
//! registry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ProtocolError, Result};
use crate::media::{persist, VideoRequest};
use crate::protocol::{parse_motion_flag, Command, Dimensions, FrameReader, Message};
use crate::registry::CameraHandle;
use crate::session::{SessionRole, SessionState};

use super::context::RelayContext;

/// Whether the read loop keeps going after a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// One client connection
pub struct Connection {
    state: SessionState,
    reader: FrameReader<OwnedReadHalf>,
    /// Held until the session becomes a display
    writer: Option<OwnedWriteHalf>,
    ctx: Arc<RelayContext>,
    camera: Option<CameraHandle>,
    display_task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Connection {
    pub fn new(
        socket: TcpStream,
        peer_addr: SocketAddr,
        ctx: Arc<RelayContext>,
        cancel: CancellationToken,
    ) -> Self {
        let (read_half, write_half) = socket.into_split();
        let reader = FrameReader::new(read_half, ctx.config.framing, ctx.config.max_frame_size);

        Self {
            state: SessionState::new(peer_addr),
            reader,
            writer: Some(write_half),
            ctx,
            camera: None,
            display_task: None,
            cancel,
        }
    }

    pub fn role(&self) -> SessionRole {
        self.state.role
    }

    /// Run the session to completion
    ///
    /// Whatever the exit path, the registry entry this session owns is removed.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.read_loop().await;
        self.close().await;

        match result {
            Err(Error::ConnectionClosed) => {
                tracing::debug!(peer = %self.state.peer_addr, "Peer closed connection");
                Ok(())
            }
            other => other,
        }
    }

    async fn read_loop(&mut self) -> Result<()> {
        loop {
            let message = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.on_shutdown().await;
                    return Ok(());
                }
                message = self.reader.read_message() => message,
            };

            let flow = match message {
                Ok(message) => self.dispatch(message).await,
                Err(e) => Err(e),
            };

            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => return Ok(()),
                Err(e @ Error::Persistence(_)) => {
                    tracing::error!(peer = %self.state.peer_addr, error = %e, "Failed to store video");
                }
                Err(e) if !e.is_fatal() => {
                    tracing::warn!(
                        peer = %self.state.peer_addr,
                        role = %self.state.role,
                        error = %e,
                        "Message ignored"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn dispatch(&mut self, message: Message) -> Result<Flow> {
        match message {
            Message::Text(token) => self.handle_command(Command::parse(&token)).await,
            Message::Binary(data) => {
                if self.state.is_camera() {
                    self.on_frame(data).await;
                    Ok(Flow::Continue)
                } else {
                    Err(self.unexpected("binary frame"))
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> Result<Flow> {
        tracing::debug!(peer = %self.state.peer_addr, command = %command, "Command");

        match (self.state.role, command) {
            (SessionRole::Unregistered, Command::CameraJoin) => {
                self.on_camera_join().await?;
                Ok(Flow::Continue)
            }
            (SessionRole::Unregistered, Command::DisplayJoin) => {
                self.on_display_join().await?;
                Ok(Flow::Continue)
            }
            (SessionRole::Camera, Command::Stream) => {
                let data = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        self.on_shutdown().await;
                        return Ok(Flow::Close);
                    }
                    data = self.reader.read_binary() => data?,
                };
                self.on_frame(data).await;
                Ok(Flow::Continue)
            }
            (SessionRole::Camera, Command::StoreVideo) => {
                self.store_video().await?;
                Ok(Flow::Continue)
            }
            (SessionRole::Camera, Command::CameraLeave) => {
                self.on_camera_leave().await;
                Ok(Flow::Close)
            }
            (SessionRole::Display, Command::DisplayLeave) => {
                tracing::info!(peer = %self.state.peer_addr, "Display leaving");
                Ok(Flow::Close)
            }
            (_, Command::Unknown(token)) => {
                if !token.is_empty() {
                    tracing::warn!(
                        peer = %self.state.peer_addr,
                        token = %token,
                        "Unrecognized command"
                    );
                }
                Ok(Flow::Continue)
            }
            (_, command) => {
                // Consume the command's operand so the stream stays aligned
                match command {
                    Command::CameraJoin | Command::CameraLeave => {
                        self.reader.read_text().await?;
                    }
                    Command::Stream => {
                        self.reader.read_binary().await?;
                    }
                    _ => {}
                }
                Err(self.unexpected(command.as_str()))
            }
        }
    }

    async fn on_camera_join(&mut self) -> Result<()> {
        let text = self.reader.read_text().await?;
        let dimensions = Dimensions::parse(&text)?;

        let handle = self
            .ctx
            .registry
            .register_camera(self.state.peer_addr, dimensions)
            .await?;

        self.state.become_camera(dimensions);
        self.camera = Some(handle);
        Ok(())
    }

    async fn on_display_join(&mut self) -> Result<()> {
        let capacity = self.ctx.config.display_queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);

        self.ctx
            .registry
            .register_display(self.state.peer_addr, tx)
            .await?;

        if let Some(writer) = self.writer.take() {
            self.display_task = Some(tokio::spawn(write_snapshots(
                writer,
                rx,
                self.ctx.config.write_timeout,
                self.state.peer_addr,
            )));
        }

        self.state.become_display();
        Ok(())
    }

    async fn on_frame(&mut self, data: Bytes) {
        let Some(camera) = self.camera.as_ref() else {
            return;
        };

        self.ctx.stats.frame_received(data.len());
        self.state.on_frame();
        camera.push_frame(data).await;

        tracing::trace!(
            peer = %self.state.peer_addr,
            frames = self.state.frames_received,
            "Frame buffered"
        );
    }

    async fn on_camera_leave(&mut self) {
        let motion = match self.reader.read_text().await {
            Ok(text) => parse_motion_flag(&text).unwrap_or_else(|e| {
                tracing::warn!(peer = %self.state.peer_addr, error = %e, "Treating motion flag as false");
                false
            }),
            Err(e) => {
                tracing::debug!(peer = %self.state.peer_addr, error = %e, "No motion flag received");
                false
            }
        };
        self.state.motion_detected = Some(motion);

        tracing::info!(
            peer = %self.state.peer_addr,
            motion = motion,
            frames = self.state.frames_received,
            "Camera leaving"
        );

        if motion {
            if let Err(e) = self.store_video().await {
                tracing::error!(peer = %self.state.peer_addr, error = %e, "Failed to store video on leave");
            }
        }
    }

    async fn on_shutdown(&mut self) {
        tracing::debug!(peer = %self.state.peer_addr, role = %self.state.role, "Shutdown requested");

        if self.state.is_camera() && self.ctx.config.persist_on_shutdown {
            if let Err(e) = self.store_video().await {
                tracing::error!(peer = %self.state.peer_addr, error = %e, "Failed to store video on shutdown");
            }
        }
    }

    /// Persist the buffer through the video sink and clear it on success
    ///
    /// On failure the buffer is left untouched.
    async fn store_video(&mut self) -> Result<()> {
        let Some(camera) = self.camera.as_ref() else {
            return Ok(());
        };

        let frames = camera.buffered_frames().await;
        if frames.is_empty() {
            tracing::info!(peer = %self.state.peer_addr, "No buffered frames to store");
            return Ok(());
        }

        let dimensions = camera.dimensions();
        let filename = self
            .ctx
            .names
            .generate(&format!("camera_{}", self.state.peer_addr));
        let path = self.ctx.config.output_dir.join(filename);
        let count = frames.len();

        tracing::info!(
            peer = %self.state.peer_addr,
            path = %path.display(),
            frames = count,
            "Storing video"
        );

        let request = VideoRequest {
            frames,
            width: dimensions.width,
            height: dimensions.height,
            frame_rate: self.ctx.config.frame_rate,
            path: path.clone(),
        };

        if let Err(e) = persist(Arc::clone(&self.ctx.sink), request).await {
            self.ctx.stats.persist_failed();
            return Err(e.into());
        }

        let remaining = camera.clear_persisted(count).await;
        self.ctx.stats.video_stored();
        self.state.on_video_stored();

        tracing::info!(
            peer = %self.state.peer_addr,
            path = %path.display(),
            frames = count,
            remaining = remaining,
            "Video stored"
        );
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(camera) = self.camera.take() {
            let (frames, bytes) = camera.totals().await;
            let discarded = camera.len().await;
            tracing::info!(
                peer = %self.state.peer_addr,
                frames = frames,
                bytes = bytes,
                videos = self.state.videos_stored,
                discarded = discarded,
                "Camera session ended"
            );
        }

        // An unregistered session owns no entry; the id may belong to someone else
        if self.state.role != SessionRole::Unregistered {
            self.ctx.registry.unregister(&self.state.peer_addr).await;
        }

        if let Some(task) = self.display_task.take() {
            task.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }

        self.state.close();
        tracing::debug!(
            peer = %self.state.peer_addr,
            role = %self.state.role,
            duration_ms = self.state.duration().as_millis() as u64,
            "Session closed"
        );
    }

    fn unexpected(&self, command: &str) -> Error {
        ProtocolError::UnexpectedCommand {
            command: command.to_string(),
            role: self.state.role.as_str(),
        }
        .into()
    }
}

/// Drain a display's snapshot queue onto its socket
///
/// Exits on the first failed or timed-out write; dropping the receiver makes
/// the next broadcast see the display as gone.
async fn write_snapshots(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Bytes>,
    write_timeout: Duration,
    peer: SocketAddr,
) {
    while let Some(payload) = rx.recv().await {
        match tokio::time::timeout(write_timeout, writer.write_all(&payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(peer = %peer, error = %e, "Display write failed");
                break;
            }
            Err(_) => {
                tracing::warn!(peer = %peer, timeout_ms = write_timeout.as_millis() as u64, "Display write timed out");
                break;
            }
        }
    }

    let _ = writer.shutdown().await;
}
