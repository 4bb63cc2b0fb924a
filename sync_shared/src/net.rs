//! Networking primitives.
//!
//! Goals:
//! - A reliable (TCP) request path for normal position updates.
//! - An unreliable (UDP) datagram path for best-effort beacons at teardown.
//! - Keep serialization explicit and versionable.
//!
//! Both paths carry the same payload shape. The server treats both as
//! absolute-value upserts, so either may arrive first.

use std::{fmt, net::SocketAddr};

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
};

use crate::math::Position;

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted frame or datagram payload.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Opaque key of the remote record an engine writes to (user/session id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        EntityId(id.into())
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload of both the normal and the best-effort path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub position: Position,
    /// When the client issued the update.
    pub timestamp: DateTime<Utc>,
}

impl PositionUpdate {
    /// Stamps `position` with the current wall-clock time.
    pub fn now(position: Position) -> Self {
        Self {
            position,
            timestamp: Utc::now(),
        }
    }
}

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SyncMsg {
    // ─── Connection handshake ───
    Hello {
        protocol: u32,
    },
    Welcome,

    // ─── Normal path (TCP) ───
    /// Client -> server: upsert the entity's position.
    UpdatePosition {
        entity: EntityId,
        update: PositionUpdate,
    },
    /// Server -> client: the update was stored.
    Ack {
        entity: EntityId,
    },

    // ─── Best-effort path (UDP) ───
    /// Client -> server: fire-and-forget upsert, never answered.
    Beacon {
        entity: EntityId,
        update: PositionUpdate,
    },

    /// Server -> client: request rejected.
    Error {
        message: String,
    },
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Connects to `addr` without performing the handshake.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        Ok(Self::new(stream))
    }

    pub async fn send(&mut self, msg: &SyncMsg) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg).context("serialize msg")?;
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(&payload);
        self.stream.write_all(&buf).await.context("tcp write")?;
        Ok(())
    }

    pub async fn recv(&mut self) -> anyhow::Result<SyncMsg> {
        self.recv_opt()
            .await?
            .context("tcp connection closed by peer")
    }

    /// Like [`recv`](Self::recv) but returns `None` when the peer closed the
    /// stream cleanly between frames.
    pub async fn recv_opt(&mut self) -> anyhow::Result<Option<SyncMsg>> {
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e).context("tcp read len"),
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}");
        }
        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .await
            .context("tcp read payload")?;
        let msg = serde_json::from_slice(&payload).context("deserialize msg")?;
        Ok(Some(msg))
    }
}

/// Unreliable, connected UDP channel used for beacons.
#[derive(Debug)]
pub struct UnreliableConn {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UnreliableConn {
    pub async fn connect(bind_addr: SocketAddr, peer: SocketAddr) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await.context("udp bind")?;
        socket.connect(peer).await.context("udp connect")?;
        Ok(Self { socket, peer })
    }

    pub async fn send(&self, msg: &SyncMsg) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg).context("serialize udp msg")?;
        self.socket.send(&payload).await.context("udp send")?;
        Ok(())
    }

    /// Waits until the socket reports writable. Call once after connecting so
    /// that [`try_send`](Self::try_send) has readiness to work with.
    pub async fn writable(&self) -> anyhow::Result<()> {
        self.socket.writable().await.context("udp writable")?;
        Ok(())
    }

    /// Sends one datagram without suspending. Fails instead of waiting if the
    /// socket is not immediately writable.
    pub fn try_send(&self, msg: &SyncMsg) -> anyhow::Result<()> {
        let payload = encode_to_bytes(msg)?;
        self.socket.try_send(&payload).context("udp try_send")?;
        Ok(())
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Server-side UDP socket receiving beacons from any client.
#[derive(Debug)]
pub struct BeaconSocket {
    socket: UdpSocket,
}

impl BeaconSocket {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(addr).await.context("udp bind")?;
        Ok(Self { socket })
    }

    /// Waits for the next datagram and decodes it.
    pub async fn recv_from(&self) -> anyhow::Result<(SyncMsg, SocketAddr)> {
        let mut buf = vec![0u8; MAX_FRAME_LEN];
        let (n, from) = self.socket.recv_from(&mut buf).await.context("udp recv")?;
        let msg = decode_from_bytes(&buf[..n])?;
        Ok((msg, from))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

/// Convenience codec helpers.
pub fn encode_to_bytes(msg: &SyncMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<SyncMsg> {
    serde_json::from_slice(b).context("deserialize")
}
