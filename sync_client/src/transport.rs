//! Concrete transports.
//!
//! - [`TcpPositionTransport`]: normal path. One request/ack exchange per call
//!   over a lazily opened, cached TCP connection.
//! - [`UdpBeaconTransport`]: best-effort path. One datagram, no reply.

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use sync_shared::{
    config::SyncConfig,
    net::{EntityId, PositionUpdate, ReliableConn, SyncMsg, UnreliableConn, PROTOCOL_VERSION},
    transport::{BeaconTransport, PositionTransport, TransportError},
};
use tokio::sync::Mutex;
use tracing::debug;

/// Request/ack transport over the reliable channel.
pub struct TcpPositionTransport {
    server_addr: SocketAddr,
    timeout: Duration,
    conn: Mutex<Option<ReliableConn>>,
}

impl TcpPositionTransport {
    pub fn new(server_addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            server_addr,
            timeout,
            conn: Mutex::new(None),
        }
    }

    pub fn from_config(cfg: &SyncConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        Ok(Self::new(addr, cfg.request_timeout()))
    }

    async fn open(addr: SocketAddr) -> anyhow::Result<ReliableConn> {
        let mut conn = ReliableConn::connect(addr).await?;
        conn.send(&SyncMsg::Hello {
            protocol: PROTOCOL_VERSION,
        })
        .await?;
        match conn.recv().await? {
            SyncMsg::Welcome => {
                debug!(server = %addr, "Sync connection established");
                Ok(conn)
            }
            SyncMsg::Error { message } => anyhow::bail!("handshake rejected: {message}"),
            other => anyhow::bail!("expected Welcome, got {other:?}"),
        }
    }

    /// Sends one request and reads one reply. A cached connection that fails
    /// is replaced by a fresh one and the request is sent again; the
    /// connection is only kept if the exchange completed.
    async fn exchange(&self, msg: &SyncMsg) -> anyhow::Result<SyncMsg> {
        let mut slot = self.conn.lock().await;
        if let Some(mut conn) = slot.take() {
            match Self::round_trip(&mut conn, msg).await {
                Ok(reply) => {
                    *slot = Some(conn);
                    return Ok(reply);
                }
                Err(e) => debug!(error = %e, "Cached sync connection is stale, reconnecting"),
            }
        }
        let mut conn = Self::open(self.server_addr).await?;
        let reply = Self::round_trip(&mut conn, msg).await?;
        *slot = Some(conn);
        Ok(reply)
    }

    async fn round_trip(conn: &mut ReliableConn, msg: &SyncMsg) -> anyhow::Result<SyncMsg> {
        conn.send(msg).await?;
        conn.recv().await
    }
}

#[async_trait]
impl PositionTransport for TcpPositionTransport {
    async fn request_update(
        &self,
        entity: &EntityId,
        update: &PositionUpdate,
    ) -> Result<(), TransportError> {
        let msg = SyncMsg::UpdatePosition {
            entity: entity.clone(),
            update: *update,
        };
        match tokio::time::timeout(self.timeout, self.exchange(&msg)).await {
            Err(_) => Err(TransportError::Timeout),
            Ok(Err(e)) => Err(TransportError::from_anyhow(&e)),
            Ok(Ok(SyncMsg::Ack { entity: acked })) if acked == *entity => Ok(()),
            Ok(Ok(SyncMsg::Error { message })) => Err(TransportError::Server(message)),
            Ok(Ok(other)) => Err(TransportError::Malformed(format!(
                "unexpected reply {other:?}"
            ))),
        }
    }
}

/// Fire-and-forget transport over the unreliable channel.
pub struct UdpBeaconTransport {
    conn: UnreliableConn,
}

impl UdpBeaconTransport {
    pub async fn connect(server_addr: SocketAddr) -> anyhow::Result<Self> {
        let unspecified = if server_addr.is_ipv4() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        };
        let conn = UnreliableConn::connect(SocketAddr::new(unspecified, 0), server_addr).await?;
        conn.writable().await?;
        Ok(Self { conn })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.conn.local_addr()
    }
}

impl BeaconTransport for UdpBeaconTransport {
    fn send_beacon(&self, entity: &EntityId, update: &PositionUpdate) {
        let msg = SyncMsg::Beacon {
            entity: entity.clone(),
            update: *update,
        };
        if let Err(e) = self.conn.try_send(&msg) {
            debug!(error = %e, peer = %self.conn.peer_addr(), "Beacon dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use sync_shared::{
        math::Position,
        net::{BeaconSocket, ReliableListener},
        transport::FailureKind,
    };

    use super::*;

    fn update() -> PositionUpdate {
        PositionUpdate::now(Position::new(160.0, 96.0))
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connectivity_failure() -> anyhow::Result<()> {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let listener = ReliableListener::bind("127.0.0.1:0".parse()?).await?;
            listener.local_addr()?
        };
        let transport = TcpPositionTransport::new(addr, Duration::from_secs(2));
        let err = transport
            .request_update(&EntityId::from("hero-1"), &update())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Connectivity);
        Ok(())
    }

    #[tokio::test]
    async fn silent_server_times_out() -> anyhow::Result<()> {
        let listener = ReliableListener::bind("127.0.0.1:0".parse()?).await?;
        let addr = listener.local_addr()?;
        // Accept but never answer the handshake.
        let _server = tokio::spawn(async move {
            let conn = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(conn);
        });

        let transport = TcpPositionTransport::new(addr, Duration::from_millis(100));
        let err = transport
            .request_update(&EntityId::from("hero-1"), &update())
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout);
        Ok(())
    }

    #[tokio::test]
    async fn server_error_reply_is_transient() -> anyhow::Result<()> {
        let listener = ReliableListener::bind("127.0.0.1:0".parse()?).await?;
        let addr = listener.local_addr()?;
        let _server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await?;
            conn.recv().await?;
            conn.send(&SyncMsg::Welcome).await?;
            conn.recv().await?;
            conn.send(&SyncMsg::Error {
                message: "hero not found".into(),
            })
            .await?;
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, anyhow::Error>(())
        });

        let transport = TcpPositionTransport::new(addr, Duration::from_secs(2));
        let err = transport
            .request_update(&EntityId::from("hero-1"), &update())
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Server("hero not found".into()));
        assert_eq!(err.kind(), FailureKind::Transient);
        Ok(())
    }

    #[tokio::test]
    async fn closed_cached_connection_is_replaced() -> anyhow::Result<()> {
        let listener = ReliableListener::bind("127.0.0.1:0".parse()?).await?;
        let addr = listener.local_addr()?;
        // Serves one update per connection, then hangs up.
        let _server = tokio::spawn(async move {
            for _ in 0..2 {
                let (mut conn, _) = listener.accept().await?;
                conn.recv().await?;
                conn.send(&SyncMsg::Welcome).await?;
                if let SyncMsg::UpdatePosition { entity, .. } = conn.recv().await? {
                    conn.send(&SyncMsg::Ack { entity }).await?;
                }
            }
            Ok::<_, anyhow::Error>(())
        });

        let transport = TcpPositionTransport::new(addr, Duration::from_secs(2));
        let entity = EntityId::from("hero-1");
        transport.request_update(&entity, &update()).await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        transport.request_update(&entity, &update()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn beacon_arrives_as_one_datagram() -> anyhow::Result<()> {
        let socket = BeaconSocket::bind("127.0.0.1:0".parse()?).await?;
        let beacon = UdpBeaconTransport::connect(socket.local_addr()?).await?;

        let sent = update();
        beacon.send_beacon(&EntityId::from("hero-1"), &sent);

        let (msg, _) =
            tokio::time::timeout(Duration::from_secs(2), socket.recv_from()).await??;
        assert_eq!(
            msg,
            SyncMsg::Beacon {
                entity: EntityId::from("hero-1"),
                update: sent,
            }
        );
        Ok(())
    }
}
