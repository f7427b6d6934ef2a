//! Relay server listener
//!
//! Handles the TCP accept loop, spawns connection handlers, and runs the
//! broadcast engine alongside them.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{Error, Result};
use crate::media::{FilenameGenerator, RawVideoSink, UniqueFilenames, VideoSink};
use crate::registry::SessionRegistry;
use crate::server::broadcast::BroadcastEngine;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::context::RelayContext;
use crate::stats::RelayStats;

/// Camera relay server
pub struct RelayServer {
    ctx: Arc<RelayContext>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RelayServer {
    /// Create a server writing videos through `sink`, named by `names`
    pub fn new(
        config: ServerConfig,
        sink: Arc<dyn VideoSink>,
        names: Arc<dyn FilenameGenerator>,
    ) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            ctx: Arc::new(RelayContext::new(config, sink, names)),
            connection_semaphore,
        }
    }

    /// Create a server with the built-in raw video sink
    pub fn with_raw_sink(config: ServerConfig) -> Self {
        let sink = RawVideoSink::new();
        let names = UniqueFilenames::new(sink.extension());
        Self::new(config, Arc::new(sink), Arc::new(names))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.ctx.config
    }

    /// Get a reference to the session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.ctx.registry
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.ctx.stats
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.ctx.config.bind_addr
    }

    /// Bind the configured address and serve until `shutdown` completes
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.ctx.config.bind_addr).await?;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let serve = self.serve(listener, cancel);
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => return result,
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                trigger.cancel();
            }
        }

        serve.await
    }

    /// Serve connections on an already bound listener until `cancel` fires
    ///
    /// After cancellation no new connections are accepted, camera sessions
    /// persist their buffers, and open sessions get `shutdown_grace` to
    /// finish before the call returns.
    pub async fn serve(&self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Camera relay listening");

        let broadcast_cancel = CancellationToken::new();
        let engine = BroadcastEngine::new(
            Arc::clone(&self.ctx.registry),
            Arc::clone(&self.ctx.stats),
            self.ctx.config.snapshot_mode,
            self.ctx.config.broadcast_interval,
        );
        let broadcast = tokio::spawn(engine.run(broadcast_cancel.clone()));

        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => {
                        self.handle_connection(socket, peer_addr, &tracker, &cancel);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        drop(listener);
        tracker.close();

        tracing::info!(
            sessions = tracker.len(),
            grace_ms = self.ctx.config.shutdown_grace.as_millis() as u64,
            "Draining sessions"
        );
        if tokio::time::timeout(self.ctx.config.shutdown_grace, tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(sessions = tracker.len(), "Shutdown grace period elapsed");
        }

        broadcast_cancel.cancel();
        let _ = broadcast.await;

        let stats = self.ctx.stats.snapshot();
        tracing::info!(
            connections = stats.total_connections,
            frames = stats.frames_received,
            videos = stats.videos_stored,
            "Camera relay stopped"
        );
        Ok(())
    }

    fn handle_connection(
        &self,
        socket: TcpStream,
        peer_addr: SocketAddr,
        tracker: &TaskTracker,
        cancel: &CancellationToken,
    ) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        tracing::debug!(peer = %peer_addr, "New connection");

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(peer = %peer_addr, error = %e, "Failed to configure socket");
            return;
        }

        let ctx = Arc::clone(&self.ctx);
        let cancel = cancel.child_token();

        tracker.spawn(async move {
            let _permit = permit;
            ctx.stats.connection_opened();

            let mut connection = Connection::new(socket, peer_addr, Arc::clone(&ctx), cancel);
            match connection.run().await {
                Ok(()) => {}
                Err(e @ Error::Registry(_)) => {
                    tracing::error!(peer = %peer_addr, error = %e, "Registration rejected");
                }
                Err(e) => {
                    tracing::warn!(
                        peer = %peer_addr,
                        role = %connection.role(),
                        error = %e,
                        "Connection error"
                    );
                }
            }

            ctx.stats.connection_closed();
            tracing::debug!(peer = %peer_addr, "Connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.ctx.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}
