//! Secure tunnel session.
//!
//! [`TunnelSession`] is the whole contract the transport relies on:
//! connect, disconnect, status and forward. [`SshTunnel`] implements it
//! with an OpenSSH control-master session driven as a child process.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::config::TunnelConfig;
use crate::transport::Channel;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TunnelError {
    #[error("Tunnel is not connected")]
    NotConnected,

    #[error("Tunnel to {host} could not be established: {reason}")]
    ConnectFailed { host: String, reason: String },

    #[error("Tunnel session lost: {0}")]
    SessionLost(String),

    /// The session is fine but this one forward could not be opened.
    #[error("Forward to {target} failed: {reason}")]
    ForwardFailed { target: String, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TunnelStatus {
    pub connected: bool,
    pub host: Option<String>,
}

#[async_trait]
pub trait TunnelSession: Send + Sync {
    /// Establish the session. A no-op when already connected.
    async fn connect(&self, host: &str, user: &str, secret: &str) -> Result<(), TunnelError>;

    /// Tear the session down. A no-op when not connected.
    async fn disconnect(&self) -> Result<(), TunnelError>;

    async fn status(&self) -> TunnelStatus;

    /// Open a logical connection to `host:port` from the tunnel's far end.
    async fn forward(&self, host: &str, port: u16) -> Result<Channel, TunnelError>;
}

// ── OpenSSH control master ────────────────────────────────────────

/// Tunnel over an OpenSSH control master.
///
/// `connect` takes the path of a private key as its secret. Each forward is
/// a short-lived `ssh -W` multiplexed over the master's socket.
pub struct SshTunnel {
    ssh_path: String,
    ssh_port: u16,
    control_path: PathBuf,
    /// `user@host` of the live master.
    session: Mutex<Option<String>>,
}

impl SshTunnel {
    pub fn new(ssh_path: &str, ssh_port: u16, control_dir: &Path) -> Self {
        let control_path = control_dir.join(format!("routewatch-{}.sock", std::process::id()));
        Self {
            ssh_path: ssh_path.to_string(),
            ssh_port,
            control_path,
            session: Mutex::new(None),
        }
    }

    pub fn from_config(config: &TunnelConfig) -> Self {
        Self::new(&config.ssh_path, config.ssh_port, &config.control_dir)
    }

    pub fn control_path(&self) -> &Path {
        &self.control_path
    }

    fn master_args(&self, destination: &str, identity_file: &str) -> Vec<String> {
        let mut args = vec![
            "-M".to_string(),
            "-S".to_string(),
            self.control_path.display().to_string(),
            "-f".to_string(),
            "-N".to_string(),
            "-p".to_string(),
            self.ssh_port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ExitOnForwardFailure=yes".to_string(),
        ];
        if !identity_file.is_empty() {
            args.push("-i".to_string());
            args.push(identity_file.to_string());
        }
        args.push(destination.to_string());
        args
    }

    fn control_args(&self, op: &str, destination: &str) -> Vec<String> {
        vec![
            "-S".to_string(),
            self.control_path.display().to_string(),
            "-O".to_string(),
            op.to_string(),
            destination.to_string(),
        ]
    }

    fn forward_args(&self, destination: &str, host: &str, port: u16) -> Vec<String> {
        vec![
            "-S".to_string(),
            self.control_path.display().to_string(),
            "-o".to_string(),
            "ControlMaster=no".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-W".to_string(),
            format!("{host}:{port}"),
            destination.to_string(),
        ]
    }

    /// Run a control command (`check`, `exit`) against the master.
    async fn control(&self, op: &str, destination: &str) -> Result<(), String> {
        let output = Command::new(&self.ssh_path)
            .args(self.control_args(op, destination))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("{}: {e}", self.ssh_path))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }

    async fn current(&self) -> Option<String> {
        self.session.lock().await.clone()
    }
}

#[async_trait]
impl TunnelSession for SshTunnel {
    async fn connect(&self, host: &str, user: &str, secret: &str) -> Result<(), TunnelError> {
        let mut session = self.session.lock().await;
        if let Some(destination) = session.as_deref() {
            if self.control("check", destination).await.is_ok() {
                return Ok(());
            }
            tracing::warn!(destination = %destination, "Stale tunnel master, reconnecting");
        }

        let destination = if user.is_empty() {
            host.to_string()
        } else {
            format!("{user}@{host}")
        };
        let failed = |reason: String| TunnelError::ConnectFailed {
            host: host.to_string(),
            reason,
        };

        // The backgrounded master keeps inherited pipes open, so no output capture here.
        let status = Command::new(&self.ssh_path)
            .args(self.master_args(&destination, secret))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| failed(format!("{}: {e}", self.ssh_path)))?;
        if !status.success() {
            return Err(failed(format!("ssh exited with {status}")));
        }
        self.control("check", &destination).await.map_err(failed)?;

        tracing::info!(
            destination = %destination,
            control_path = %self.control_path.display(),
            "Tunnel connected"
        );
        *session = Some(destination);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TunnelError> {
        let mut session = self.session.lock().await;
        let Some(destination) = session.take() else {
            return Ok(());
        };
        if let Err(reason) = self.control("exit", &destination).await {
            tracing::debug!(destination = %destination, reason = %reason, "Tunnel master already gone");
        }
        tracing::info!(destination = %destination, "Tunnel disconnected");
        Ok(())
    }

    async fn status(&self) -> TunnelStatus {
        match self.current().await {
            Some(destination) => TunnelStatus {
                connected: self.control("check", &destination).await.is_ok(),
                host: Some(destination),
            },
            None => TunnelStatus::default(),
        }
    }

    async fn forward(&self, host: &str, port: u16) -> Result<Channel, TunnelError> {
        let destination = self.current().await.ok_or(TunnelError::NotConnected)?;
        self.control("check", &destination)
            .await
            .map_err(TunnelError::SessionLost)?;

        let target = format!("{host}:{port}");
        let failed = |reason: String| TunnelError::ForwardFailed {
            target: target.clone(),
            reason,
        };

        let mut child = Command::new(&self.ssh_path)
            .args(self.forward_args(&destination, host, port))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failed(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| failed("no stdin on forward process".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| failed("no stdout on forward process".to_string()))?;

        tracing::debug!(forward = %target, "Opened tunnel forward");
        Ok(Box::new(ForwardedStream {
            _child: child,
            stdin,
            stdout,
        }))
    }
}

/// The stdio pair of an `ssh -W` child. The child dies with the stream.
struct ForwardedStream {
    _child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl AsyncRead for ForwardedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stdout).poll_read(cx, buf)
    }
}

impl AsyncWrite for ForwardedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().stdin).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stdin).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stdin).poll_shutdown(cx)
    }
}
