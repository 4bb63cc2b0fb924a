//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p sync_client -- [--addr 127.0.0.1:40100] [--entity hero-1] [--config sync.json]
//!
//! Drives one sync engine from stdin and prints every local render.
//!
//! Console commands:
//!   up | down | left | right - Step one grid cell
//!   move <x> <y>             - Move to an arbitrary position
//!   status                   - Show engine status
//!   flush                    - Force a best-effort flush
//!   hide | show              - Simulate visibility changes
//!   quit                     - Unload (flush + destroy) and exit

use std::env;
use std::io::{BufRead, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use sync_client::{
    grid::{self, Direction},
    lifecycle::{spawn_lifecycle_watcher, LifecycleSignal},
    transport::{TcpPositionTransport, UdpBeaconTransport},
    SyncEngine,
};
use sync_shared::{
    config::SyncConfig,
    math::Position,
    net::EntityId,
    render::{NullSink, PositionSink},
};
use tokio::sync::mpsc;
use tracing::info;

struct Args {
    cfg: SyncConfig,
    entity: EntityId,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();
    let mut cfg = SyncConfig::default();
    let mut addr = None;
    let mut entity = EntityId::from("hero-1");
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                let raw = std::fs::read_to_string(&args[i + 1])
                    .with_context(|| format!("read config {}", args[i + 1]))?;
                cfg = SyncConfig::from_json_str(&raw).context("parse config")?;
                i += 2;
            }
            "--addr" if i + 1 < args.len() => {
                addr = Some(args[i + 1].clone());
                i += 2;
            }
            "--entity" if i + 1 < args.len() => {
                entity = EntityId::new(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }
    if let Some(addr) = addr {
        cfg.server_addr = addr;
    }
    Ok(Args { cfg, entity })
}

/// Sink that prints renders to the terminal.
struct TerminalSink {
    inner: NullSink,
}

impl PositionSink for TerminalSink {
    fn apply_position(&self, position: Position) {
        println!("  hero at {position}");
        self.inner.apply_position(position);
    }

    fn set_moving(&self, moving: bool) {
        self.inner.set_moving(moving);
    }

    fn current_position(&self) -> Option<Position> {
        self.inner.current_position()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let Args { cfg, entity } = parse_args()?;
    info!(server = %cfg.server_addr, entity = %entity, "Starting client");

    let server_addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
    let transport = Arc::new(TcpPositionTransport::from_config(&cfg)?);
    let beacon = Arc::new(
        UdpBeaconTransport::connect(server_addr)
            .await
            .context("beacon socket")?,
    );
    let sink = Arc::new(TerminalSink {
        inner: NullSink::at(grid::cell_center(&cfg.grid, (0, 0))),
    });

    let engine = SyncEngine::new(entity, cfg, sink, transport, beacon)?;
    let (lifecycle_tx, lifecycle_rx) = mpsc::channel(8);
    let watcher = spawn_lifecycle_watcher(engine.clone(), lifecycle_rx);

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Client ready. Type 'up/down/left/right', 'move <x> <y>', 'status', 'quit'.");
    println!();

    while let Some(line) = console_rx.recv().await {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["move", x, y] => match (x.parse::<f32>(), y.parse::<f32>()) {
                (Ok(x), Ok(y)) => engine.submit_local_move(Position::new(x, y)),
                _ => println!("Usage: move <x> <y>"),
            },
            ["status"] => {
                println!("Entity: {}", engine.entity());
                println!("Status: {:?}", engine.status());
                println!("Connected: {}", engine.is_connected());
                if let Some(p) = engine.pending() {
                    println!("Pending: {p}");
                }
                if let Some(p) = engine.last_sent() {
                    println!("Last sent: {p}");
                }
            }
            ["flush"] => {
                if !engine.force_flush() {
                    println!("Nothing pending");
                }
            }
            ["hide"] => lifecycle_tx.send(LifecycleSignal::Hidden).await?,
            ["show"] => lifecycle_tx.send(LifecycleSignal::Visible).await?,
            ["quit"] | ["exit"] => break,
            [word] => match word.parse::<Direction>() {
                Ok(direction) => {
                    if engine.handle_discrete_step(direction).is_none() {
                        println!("Blocked by grid edge");
                    }
                }
                Err(e) => println!("{e}"),
            },
            _ => println!("Unknown command: {line}"),
        }
    }

    lifecycle_tx.send(LifecycleSignal::Unload).await?;
    watcher.await.context("lifecycle watcher")?;
    info!("Client exiting");
    Ok(())
}
