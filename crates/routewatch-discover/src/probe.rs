//! Device probe: log in over the RouterOS API and read what we need.
//!
//! Every operation opens its own channel, which is dropped (and therefore
//! closed) on every exit path including timeouts. A [`survey`] runs all
//! three operations against one deadline. Ordinary failures
//! (refused, timed out, bad login, garbled reply) collapse into an empty
//! answer. A tunnel failure is the one error that gets through.
//!
//! [`survey`]: DeviceProbe::survey

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use routewatch_core::NeighborRecord;

use crate::credentials::Credentials;
use crate::error::{DiscoverError, Result};
use crate::routeros::{self, ApiConnection, ApiError, Row};
use crate::transport::{Channel, Transport, TransportError};

/// Identity and version data from `/system`. Absent fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub identity: Option<String>,
    pub version: Option<String>,
    pub model: Option<String>,
}

/// Everything read from one router in a single pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Survey {
    pub info: SystemInfo,
    pub neighbors: Vec<NeighborRecord>,
}

/// Why a single probe operation failed. Never leaves this module.
#[derive(Error, Debug)]
enum ProbeFailure {
    #[error("tunnel unavailable: {0}")]
    Tunnel(String),

    #[error("device unreachable: {0}")]
    Unreachable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(#[from] ApiError),
}

impl From<TransportError> for ProbeFailure {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::TunnelUnavailable(reason) => Self::Tunnel(reason),
            other => Self::Unreachable(other.to_string()),
        }
    }
}

pub struct DeviceProbe {
    transport: Transport,
    credentials: Credentials,
    port: u16,
    timeout: Duration,
}

impl DeviceProbe {
    pub fn new(transport: Transport, credentials: Credentials) -> Self {
        Self {
            transport,
            credentials,
            port: routeros::DEFAULT_PORT,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probe, then read system info and neighbors, all within one probe
    /// timeout. `None` if the device does not answer the probe.
    pub async fn survey(&self, host: &str) -> Result<Option<Survey>> {
        let deadline = self.deadline();
        if !self.probe_until(host, deadline).await? {
            return Ok(None);
        }
        let info = self.system_info_until(host, deadline).await?;
        let neighbors = self.neighbors_until(host, deadline).await?;
        Ok(Some(Survey { info, neighbors }))
    }

    /// Identity, version and model. Empty on ordinary failure.
    pub async fn fetch_system_info(&self, host: &str) -> Result<SystemInfo> {
        self.system_info_until(host, self.deadline()).await
    }

    /// The OSPF neighbor table. Empty on ordinary failure.
    pub async fn fetch_neighbors(&self, host: &str) -> Result<Vec<NeighborRecord>> {
        self.neighbors_until(host, self.deadline()).await
    }

    /// Whether the device accepts a login and answers one cheap query.
    pub async fn probe(&self, host: &str) -> Result<bool> {
        self.probe_until(host, self.deadline()).await
    }

    async fn system_info_until(&self, host: &str, deadline: Instant) -> Result<SystemInfo> {
        let outcome = self
            .bounded(deadline, async {
                let mut conn = self.open(host).await?;
                let result = read_system_info(&mut conn).await;
                conn.close().await;
                result
            })
            .await;
        absorb(host, "system info", outcome, SystemInfo::default())
    }

    async fn neighbors_until(&self, host: &str, deadline: Instant) -> Result<Vec<NeighborRecord>> {
        let outcome = self
            .bounded(deadline, async {
                let mut conn = self.open(host).await?;
                let result = conn
                    .command("/routing/ospf/neighbor/print", &[])
                    .await
                    .map(|rows| rows.iter().map(neighbor_from_row).collect::<Vec<_>>())
                    .map_err(ProbeFailure::from);
                conn.close().await;
                result
            })
            .await;
        absorb(host, "neighbors", outcome, Vec::new())
    }

    async fn probe_until(&self, host: &str, deadline: Instant) -> Result<bool> {
        let outcome = self
            .bounded(deadline, async {
                let mut conn = self.open(host).await?;
                let result = conn
                    .command("/system/identity/print", &[])
                    .await
                    .map(|_| true)
                    .map_err(ProbeFailure::from);
                conn.close().await;
                result
            })
            .await;
        absorb(host, "probe", outcome, false)
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }

    /// Acquire a channel and log in.
    async fn open(&self, host: &str) -> std::result::Result<ApiConnection<Channel>, ProbeFailure> {
        let channel = self.transport.acquire(host, self.port).await?;
        let mut conn = ApiConnection::new(channel);
        conn.login(&self.credentials.username, &self.credentials.password)
            .await?;
        Ok(conn)
    }

    async fn bounded<T, F>(
        &self,
        deadline: Instant,
        fut: F,
    ) -> std::result::Result<T, ProbeFailure>
    where
        F: Future<Output = std::result::Result<T, ProbeFailure>>,
    {
        match tokio::time::timeout_at(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(ProbeFailure::Timeout(self.timeout)),
        }
    }
}

/// Turn a probe failure into the fallback value unless the tunnel is gone.
fn absorb<T>(
    host: &str,
    operation: &str,
    outcome: std::result::Result<T, ProbeFailure>,
    fallback: T,
) -> Result<T> {
    match outcome {
        Ok(value) => Ok(value),
        Err(ProbeFailure::Tunnel(reason)) => Err(DiscoverError::TunnelUnavailable(reason)),
        Err(e) => {
            tracing::debug!(address = %host, operation, error = %e, "Probe failed");
            Ok(fallback)
        }
    }
}

async fn read_system_info(
    conn: &mut ApiConnection<Channel>,
) -> std::result::Result<SystemInfo, ProbeFailure> {
    let identity = conn.command("/system/identity/print", &[]).await?;
    let resource = conn.command("/system/resource/print", &[]).await?;

    Ok(SystemInfo {
        identity: first_field(&identity, "name"),
        version: first_field(&resource, "version"),
        model: first_field(&resource, "board-name"),
    })
}

fn first_field(rows: &[Row], key: &str) -> Option<String> {
    rows.first().and_then(|row| non_empty(row, key))
}

fn non_empty(row: &Row, key: &str) -> Option<String> {
    row.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Decode one neighbor row. Missing or unparsable fields default.
pub fn neighbor_from_row(row: &Row) -> NeighborRecord {
    let text = |key: &str| row.get(key).cloned().unwrap_or_default();
    let number = |key: &str| {
        row.get(key)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(0)
    };

    let address = text("address");
    let neighbor_ip = non_empty(row, "neighbor-ip").unwrap_or_else(|| address.clone());

    NeighborRecord {
        neighbor_id: text("router-id"),
        neighbor_ip,
        cost: number("cost"),
        state: text("state"),
        priority: number("priority"),
        dead_time: text("dead-time"),
        address,
        interface: text("interface"),
    }
}
