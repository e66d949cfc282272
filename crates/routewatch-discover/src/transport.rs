//! Transport provider: how the probe reaches a device's API port.
//!
//! Chosen once when the orchestrator is built. The tunneled variant keeps
//! "the tunnel is gone" apart from "this host did not answer": the first
//! is fatal to a scan, the second just means the device is offline.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::tunnel::{TunnelError, TunnelSession};

/// A bidirectional byte stream to one device.
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for T {}

/// An open connection to a device. Dropping it closes the connection.
pub type Channel = Box<dyn ByteStream>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The tunnel session is absent or broken. Never means "device offline".
    #[error("Tunnel unavailable: {0}")]
    TunnelUnavailable(String),

    #[error("{target} unreachable: {reason}")]
    Unreachable { target: String, reason: String },
}

impl TransportError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TunnelUnavailable(_))
    }

    fn unreachable(host: &str, port: u16, reason: impl ToString) -> Self {
        Self::Unreachable {
            target: format!("{host}:{port}"),
            reason: reason.to_string(),
        }
    }
}

#[derive(Clone)]
pub enum Transport {
    /// Plain TCP from this host.
    Direct { connect_timeout: Duration },
    /// Forwarded through an already-connected tunnel session.
    Tunneled { session: Arc<dyn TunnelSession> },
}

impl Transport {
    pub fn direct(connect_timeout: Duration) -> Self {
        Self::Direct { connect_timeout }
    }

    pub fn tunneled(session: Arc<dyn TunnelSession>) -> Self {
        Self::Tunneled { session }
    }

    pub fn is_tunneled(&self) -> bool {
        matches!(self, Self::Tunneled { .. })
    }

    /// Open a channel to `host:port`.
    pub async fn acquire(&self, host: &str, port: u16) -> Result<Channel, TransportError> {
        match self {
            Self::Direct { connect_timeout } => {
                match tokio::time::timeout(*connect_timeout, TcpStream::connect((host, port))).await
                {
                    Ok(Ok(stream)) => {
                        let _ = stream.set_nodelay(true);
                        Ok(Box::new(stream))
                    }
                    Ok(Err(e)) => Err(TransportError::unreachable(host, port, e)),
                    Err(_) => Err(TransportError::unreachable(
                        host,
                        port,
                        format!("connect timed out after {}ms", connect_timeout.as_millis()),
                    )),
                }
            }
            Self::Tunneled { session } => session
                .forward(host, port)
                .await
                .map_err(|e| classify_tunnel_error(host, port, e)),
        }
    }
}

/// Only a failed forward of an otherwise healthy session is a per-host problem.
fn classify_tunnel_error(host: &str, port: u16, err: TunnelError) -> TransportError {
    match err {
        TunnelError::ForwardFailed { reason, .. } => TransportError::unreachable(host, port, reason),
        other => TransportError::TunnelUnavailable(other.to_string()),
    }
}
