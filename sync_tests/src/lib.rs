//! Helpers shared by the integration tests.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use sync_client::{
    transport::{TcpPositionTransport, UdpBeaconTransport},
    SyncEngine,
};
use sync_server::{server::SharedStore, PositionServer};
use sync_shared::{config::SyncConfig, math::Position, net::EntityId, render::NullSink};

/// Installs a test-friendly subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Spawns a server on an ephemeral port and returns its address and store.
pub async fn spawn_server() -> anyhow::Result<(SocketAddr, SharedStore)> {
    let server = PositionServer::bind_ephemeral().await?;
    let addr = server.local_addr()?;
    let store = server.store();
    tokio::spawn(server.run());
    Ok((addr, store))
}

/// Config with short timers so tests finish quickly.
pub fn fast_config(addr: SocketAddr) -> SyncConfig {
    SyncConfig {
        server_addr: addr.to_string(),
        debounce_ms: 50,
        moving_flag_ms: 30,
        retry_delay_ms: 200,
        request_timeout_ms: 1000,
        ..SyncConfig::default()
    }
}

/// Engine wired to real TCP/UDP transports, starting at cell (0, 0).
pub async fn connect_engine(entity: &str, cfg: SyncConfig) -> anyhow::Result<SyncEngine> {
    let addr: SocketAddr = cfg.server_addr.parse()?;
    let transport = Arc::new(TcpPositionTransport::from_config(&cfg)?);
    let beacon = Arc::new(UdpBeaconTransport::connect(addr).await?);
    let sink = Arc::new(NullSink::at(Position::new(32.0, 32.0)));
    SyncEngine::new(EntityId::from(entity), cfg, sink, transport, beacon)
}

/// Polls `check` every 10ms until it returns true or `timeout` elapses.
pub async fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Current stored position for `entity`.
pub fn stored(store: &SharedStore, entity: &str) -> Option<Position> {
    store.lock().position(&EntityId::from(entity))
}
