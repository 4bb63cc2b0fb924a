//! Server implementation.
//!
//! Authoritative store for entity positions. It supports:
//! - TCP connections: handshake, then any number of update/ack exchanges
//! - UDP beacons: decoded and applied, never answered
//!
//! Every write is an absolute-value upsert; the store keeps whichever value
//! arrived last.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use parking_lot::Mutex;
use sync_shared::net::{
    BeaconSocket, ReliableConn, ReliableListener, SyncMsg, PROTOCOL_VERSION,
};
use tracing::{debug, info, warn};

use crate::store::{PositionStore, UpdateSource};

/// Shared handle to the store.
pub type SharedStore = Arc<Mutex<PositionStore>>;

/// Position server.
pub struct PositionServer {
    tcp: ReliableListener,
    udp: BeaconSocket,
    store: SharedStore,
}

impl PositionServer {
    /// Binds TCP on `addr` and UDP on the same resolved address.
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let tcp = ReliableListener::bind(addr).await?;
        let local = tcp.local_addr()?;
        let udp = BeaconSocket::bind(local).await?;
        Ok(Self {
            tcp,
            udp,
            store: Arc::new(Mutex::new(PositionStore::new())),
        })
    }

    /// Binds on an ephemeral localhost port. Used by tests.
    pub async fn bind_ephemeral() -> anyhow::Result<Self> {
        Self::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// Serves until the TCP listener fails.
    pub async fn run(self) -> anyhow::Result<()> {
        let Self { tcp, udp, store } = self;
        let beacons = tokio::spawn(beacon_loop(udp, Arc::clone(&store)));

        let result = loop {
            let (conn, peer) = match tcp.accept().await {
                Ok(accepted) => accepted,
                Err(e) => break Err(e),
            };
            debug!(%peer, "Accepted connection");
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                if let Err(e) = serve_connection(conn, peer, store).await {
                    warn!(%peer, error = %format!("{e:#}"), "Connection ended with error");
                }
            });
        };

        beacons.abort();
        result
    }
}

/// Runs the handshake and request loop for one client until it disconnects.
pub async fn serve_connection(
    mut conn: ReliableConn,
    peer: SocketAddr,
    store: SharedStore,
) -> anyhow::Result<()> {
    match conn.recv_opt().await.context("read hello")? {
        Some(SyncMsg::Hello { protocol }) if protocol == PROTOCOL_VERSION => {
            conn.send(&SyncMsg::Welcome).await?;
        }
        Some(SyncMsg::Hello { protocol }) => {
            warn!(%peer, protocol, expected = PROTOCOL_VERSION, "Protocol mismatch");
            conn.send(&SyncMsg::Error {
                message: format!("unsupported protocol {protocol}, expected {PROTOCOL_VERSION}"),
            })
            .await?;
            return Ok(());
        }
        Some(other) => anyhow::bail!("expected Hello, got {other:?}"),
        None => return Ok(()),
    }

    while let Some(msg) = conn.recv_opt().await? {
        match msg {
            SyncMsg::UpdatePosition { entity, update } => {
                let writes = store
                    .lock()
                    .upsert(&entity, &update, UpdateSource::Request)
                    .writes;
                info!(entity = %entity, position = %update.position, writes, "Position stored");
                conn.send(&SyncMsg::Ack { entity }).await?;
            }
            other => {
                debug!(%peer, ?other, "Unexpected message on request channel");
                conn.send(&SyncMsg::Error {
                    message: "unexpected message".to_string(),
                })
                .await?;
            }
        }
    }
    debug!(%peer, "Connection closed");
    Ok(())
}

async fn beacon_loop(udp: BeaconSocket, store: SharedStore) {
    loop {
        match udp.recv_from().await {
            Ok((SyncMsg::Beacon { entity, update }, from)) => {
                let writes = store
                    .lock()
                    .upsert(&entity, &update, UpdateSource::Beacon)
                    .writes;
                info!(entity = %entity, position = %update.position, writes, %from, "Beacon stored");
            }
            Ok((other, from)) => {
                debug!(?other, %from, "Ignoring non-beacon datagram");
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Bad beacon datagram");
            }
        }
    }
}
