//! Camera relay binary
//!
//! ```bash
//! # Videos land in ./videos, address and port come from .env
//! camrelay ./videos
//!
//! # With the operator console and debug logging
//! camrelay --cli --verbose ./videos
//!
//! # Explicit env file
//! camrelay --env-file /etc/camrelay.env /var/lib/camrelay
//! ```
//!
//! `.env` keys: `SERVER_ADDRESS`, `SERVER_PORT`, `OUTPUT_KEYFRAMES` (frame
//! rate of stored videos, default 30). Process environment overrides the file.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use camrelay::{EnvSource, RelayServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "camrelay", version, about = "Relay camera frames to displays and store them as videos")]
struct Cli {
    /// Directory stored videos are written to (created if missing)
    video_path: PathBuf,

    /// Enable the operator console on stdin (version, stats, quit)
    #[arg(short = 'c', long = "cli")]
    console: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("camrelay={}", level).parse()?),
        )
        .init();

    let env = EnvSource::load(&cli.env_file).context("Failed to load configuration")?;
    let config = ServerConfig::from_env(&env, &cli.video_path).context("Invalid configuration")?;

    std::fs::create_dir_all(&cli.video_path).with_context(|| {
        format!("Failed to create video directory {}", cli.video_path.display())
    })?;

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %config.bind_addr,
        output = %config.output_dir.display(),
        frame_rate = config.frame_rate,
        "Starting camera relay"
    );

    let server = Arc::new(RelayServer::with_raw_sink(config));
    let cancel = CancellationToken::new();

    tokio::spawn(handle_signals(cancel.clone()));
    if cli.console {
        tokio::spawn(run_console(Arc::clone(&server), cancel.clone()));
    }

    server.serve(listener, cancel).await?;
    Ok(())
}

/// First Ctrl+C shuts down gracefully, a second one exits immediately
async fn handle_signals(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tracing::info!("Interrupt received, shutting down (press Ctrl+C again to force)");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("Forced exit");
        std::process::exit(130);
    }
}

async fn run_console(server: Arc<RelayServer>, cancel: CancellationToken) {
    // Stdin is read on a plain thread so a pending read never holds up runtime shutdown
    let (tx, mut rx) = mpsc::channel::<String>(8);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("camrelay {} console: version, stats, quit", env!("CARGO_PKG_VERSION"));

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = rx.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        match line.trim() {
            "" => {}
            "version" => println!("camrelay {}", env!("CARGO_PKG_VERSION")),
            "stats" => {
                let stats = server.stats().snapshot();
                let cameras = server.registry().camera_count().await;
                let displays = server.registry().display_count().await;
                println!(
                    "cameras={} displays={} connections={}/{} frames={} bytes={} bitrate={}bps snapshots={} dropped={} videos={} failures={} uptime={}s",
                    cameras,
                    displays,
                    stats.active_connections,
                    stats.total_connections,
                    stats.frames_received,
                    stats.bytes_received,
                    stats.ingest_bitrate(),
                    stats.snapshots_sent,
                    stats.snapshots_dropped,
                    stats.videos_stored,
                    stats.persist_failures,
                    stats.uptime.as_secs(),
                );
            }
            "quit" | "exit" => {
                tracing::info!("Shutdown requested from console");
                cancel.cancel();
                break;
            }
            other => println!("Unknown command: {}", other),
        }
    }
}
