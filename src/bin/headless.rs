//! Connect to a canvas server and keep a view in sync without a display.
//!
//! Run with: cargo run --bin mural-headless -- --server ws://host:port --room main

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn};

use mural_client::{CanvasEvent, ClientConfig, HeadlessBackend, Session};

#[derive(Parser, Debug)]
#[command(name = "mural-headless", about = "Headless shared-canvas sync client")]
struct Cli {
    #[arg(long, default_value = "ws://127.0.0.1:9000")]
    server: String,

    #[arg(long, default_value = "main")]
    room: String,

    #[arg(long)]
    nick: Option<String>,

    /// Optional JSON config file; command line flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Slowly pan the viewport to exercise tile and preview sync.
    #[arg(long)]
    wander: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    config.server_url = cli.server;
    config.room = cli.room;
    config.nickname = cli
        .nick
        .unwrap_or_else(|| format!("watcher-{}", std::process::id() % 10000));
    config.canvas_width = cli.width;
    config.canvas_height = cli.height;

    let mut session = Session::connect(config).await?;
    let mut backend = HeadlessBackend::new();
    let mut last_status = Instant::now();

    while !session.is_closed() {
        let frame_started = Instant::now();

        session
            .poll_network(Duration::from_millis(4), &mut backend)
            .await?;
        if session.is_closed() {
            break;
        }

        if cli.wander {
            session.pan_by(1.5, 0.6);
        }
        session.frame(&mut backend);
        session.flush_cadences(&mut backend).await?;

        for event in session.drain_events() {
            match event {
                CanvasEvent::Ready { user_id } => info!(user_id, "session ready"),
                CanvasEvent::Chat { text, .. } => info!(%text, "chat"),
                CanvasEvent::StatusText { text } => info!(%text, "server status"),
                CanvasEvent::UserJoined { id, nickname } => info!(id, %nickname, "user joined"),
                CanvasEvent::UserLeft { id } => info!(id, "user left"),
                CanvasEvent::Kicked { reason } => warn!(%reason, "kicked"),
                CanvasEvent::Disconnected => warn!("disconnected"),
                CanvasEvent::UserCursor { .. } => {}
            }
        }

        if last_status.elapsed() >= Duration::from_secs(5) {
            last_status = Instant::now();
            info!(
                tiles = session.tiles().len(),
                users = session.users().len(),
                chunks = session.chunks_received(),
                textures = backend.live_textures(),
                "sync status"
            );
        }

        if let Some(idle) = Duration::from_millis(16).checked_sub(frame_started.elapsed()) {
            tokio::time::sleep(idle).await;
        }
    }

    info!("session ended");
    Ok(())
}
