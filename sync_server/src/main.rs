//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p sync_server -- [--addr 127.0.0.1:40100]
//!
//! Accepts position updates over TCP and beacons over UDP on the same address
//! and logs every stored write.

use std::env;
use std::net::SocketAddr;

use anyhow::Context;
use sync_server::PositionServer;
use sync_shared::config::SyncConfig;
use tracing::info;

fn parse_args() -> SyncConfig {
    let mut cfg = SyncConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args();
    let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
    info!(%addr, "Starting server");

    let server = PositionServer::bind(addr).await.context("bind server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening (tcp requests, udp beacons)");

    server.run().await
}
