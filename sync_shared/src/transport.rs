//! Transport abstraction.
//!
//! Two delivery paths reach the remote store:
//! - [`PositionTransport`]: an awaited request, one attempt per call. Retry
//!   policy belongs to the caller.
//! - [`BeaconTransport`]: fire-and-forget. The caller never learns whether
//!   delivery happened.

use std::{fmt, io};

use async_trait::async_trait;

use crate::net::{EntityId, PositionUpdate};

/// How a failed send should be treated by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network is down or unreachable. The engine goes offline until retry.
    Connectivity,
    /// Server-side or protocol problem. Retried without going offline.
    Transient,
}

impl FailureKind {
    /// Classifies a free-form error message.
    pub fn from_message(message: &str) -> Self {
        let m = message.to_ascii_lowercase();
        const CONNECTIVITY_HINTS: [&str; 7] = [
            "timeout",
            "timed out",
            "network",
            "unreachable",
            "refused",
            "reset",
            "closed",
        ];
        if CONNECTIVITY_HINTS.iter().any(|h| m.contains(h)) {
            FailureKind::Connectivity
        } else {
            FailureKind::Transient
        }
    }
}

/// Error returned by a single normal-path send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No response within the request timeout.
    Timeout,
    /// Could not reach the server at all.
    Unreachable(String),
    /// The server answered with an error.
    Server(String),
    /// The server answered with something that is not a valid reply.
    Malformed(String),
}

impl TransportError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TransportError::Timeout | TransportError::Unreachable(_) => FailureKind::Connectivity,
            TransportError::Server(_) | TransportError::Malformed(_) => FailureKind::Transient,
        }
    }

    /// Maps an error chain from the connection layer. IO errors are classified
    /// by kind; anything else falls back to message inspection.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        if let Some(io_err) = err.chain().find_map(|e| e.downcast_ref::<io::Error>()) {
            return TransportError::from(io_err);
        }
        let message = format!("{err:#}");
        match FailureKind::from_message(&message) {
            FailureKind::Connectivity => TransportError::Unreachable(message),
            FailureKind::Transient => TransportError::Malformed(message),
        }
    }
}

impl From<&io::Error> for TransportError {
    fn from(err: &io::Error) -> Self {
        use io::ErrorKind::*;
        match err.kind() {
            TimedOut | WouldBlock => TransportError::Timeout,
            ConnectionRefused | ConnectionReset | ConnectionAborted | NotConnected
            | BrokenPipe | UnexpectedEof | AddrNotAvailable => {
                TransportError::Unreachable(err.to_string())
            }
            InvalidData => TransportError::Malformed(err.to_string()),
            _ => match FailureKind::from_message(&err.to_string()) {
                FailureKind::Connectivity => TransportError::Unreachable(err.to_string()),
                FailureKind::Transient => TransportError::Server(err.to_string()),
            },
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "request timed out"),
            TransportError::Unreachable(m) => write!(f, "server unreachable: {m}"),
            TransportError::Server(m) => write!(f, "server error: {m}"),
            TransportError::Malformed(m) => write!(f, "malformed response: {m}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Normal request path: persists `update` under `entity`.
#[async_trait]
pub trait PositionTransport: Send + Sync {
    async fn request_update(
        &self,
        entity: &EntityId,
        update: &PositionUpdate,
    ) -> Result<(), TransportError>;
}

/// Best-effort path usable while the host is being torn down.
///
/// Must initiate delivery before returning and must not block on a reply.
pub trait BeaconTransport: Send + Sync {
    fn send_beacon(&self, entity: &EntityId, update: &PositionUpdate);
}
