//! Core domain types for routewatch.
//!
//! Devices and their OSPF neighbor tables are the only persisted facts.
//! Topology graphs and asymmetric routes are derived views, recomputed
//! from the device set on every read.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Namespace UUID for deterministic device IDs.
const ROUTEWATCH_NS: Uuid = Uuid::from_bytes([
    0x3f, 0x1c, 0x52, 0x8e, 0x0b, 0x47, 0x4d, 0x6a, 0x9e, 0x21, 0x7c, 0x55, 0xa0, 0x13, 0xd8, 0x64,
]);

// ── Devices ───────────────────────────────────────────────────────

/// Unique identifier for a discovered device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub Uuid);

impl DeviceId {
    /// Deterministic ID derived from the device IP, so every store agrees on it.
    pub fn for_ip(ip: &str) -> Self {
        Self(Uuid::new_v5(&ROUTEWATCH_NS, format!("device:{ip}").as_bytes()))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Unknown,
    Online,
    Offline,
    Scanning,
    Error,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Scanning => "scanning",
            Self::Error => "error",
        }
    }

    /// Parse a stored status, falling back to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "online" => Self::Online,
            "offline" => Self::Offline,
            "scanning" => Self::Scanning,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }
}

/// One row of a router's OSPF neighbor table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NeighborRecord {
    /// Remote OSPF router ID.
    pub neighbor_id: String,
    pub neighbor_ip: String,
    pub cost: u32,
    /// Adjacency state as reported by the device ("Full", "2-Way", ...).
    pub state: String,
    pub priority: u32,
    pub dead_time: String,
    pub address: String,
    pub interface: String,
}

/// A router discovered on a scanned subnet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: DeviceId,
    pub ip: String,
    pub hostname: Option<String>,
    /// Vendor-reported system identity.
    pub identity: Option<String>,
    pub version: Option<String>,
    pub model: Option<String>,
    pub status: DeviceStatus,
    pub first_seen: DateTime<Utc>,
    /// Last time the device answered a probe.
    pub last_seen: Option<DateTime<Utc>>,
    pub neighbors: Vec<NeighborRecord>,
}

impl Device {
    /// Name shown to operators: identity, else hostname, else IP.
    pub fn display_name(&self) -> &str {
        self.identity
            .as_deref()
            .or(self.hostname.as_deref())
            .unwrap_or(&self.ip)
    }

    /// Build a fresh record from an upsert for an IP not seen before.
    pub fn from_upsert(upsert: DeviceUpsert, now: DateTime<Utc>) -> Self {
        let mut device = Self {
            id: DeviceId::for_ip(&upsert.ip),
            ip: upsert.ip.clone(),
            hostname: None,
            identity: None,
            version: None,
            model: None,
            status: DeviceStatus::Unknown,
            first_seen: now,
            last_seen: None,
            neighbors: Vec::new(),
        };
        device.apply(upsert);
        device
    }

    /// Overwrite mutable fields and the neighbor table from an upsert.
    ///
    /// Neighbor lists are replaced, never merged. `last_seen` only moves
    /// when the upsert carries a `seen_at`.
    pub fn apply(&mut self, upsert: DeviceUpsert) {
        self.hostname = upsert.hostname;
        self.identity = upsert.identity;
        self.version = upsert.version;
        self.model = upsert.model;
        self.status = upsert.status;
        self.neighbors = upsert.neighbors;
        if let Some(seen) = upsert.seen_at {
            self.last_seen = Some(seen);
        }
    }
}

/// Write model for upsert-by-IP.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceUpsert {
    pub ip: String,
    pub hostname: Option<String>,
    pub identity: Option<String>,
    pub version: Option<String>,
    pub model: Option<String>,
    pub status: DeviceStatus,
    pub neighbors: Vec<NeighborRecord>,
    pub seen_at: Option<DateTime<Utc>>,
}

impl DeviceUpsert {
    /// A device that answered a probe just now.
    pub fn online(ip: &str, seen_at: DateTime<Utc>) -> Self {
        Self {
            ip: ip.to_string(),
            hostname: None,
            identity: None,
            version: None,
            model: None,
            status: DeviceStatus::Online,
            neighbors: Vec::new(),
            seen_at: Some(seen_at),
        }
    }
}

// ── Scan jobs ─────────────────────────────────────────────────────

/// Unique identifier for a scan job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ScanJobId(pub Uuid);

impl ScanJobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScanJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScanJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanJobStatus {
    Pending,
    Scanning,
    Completed,
    Error,
}

impl ScanJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scanning => "scanning",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "scanning" => Some(Self::Scanning),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Forward-only lifecycle: pending → scanning → {completed | error}.
    /// A job that fails before scanning may go straight from pending to error.
    pub fn can_advance_to(&self, next: ScanJobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Scanning)
                | (Self::Pending, Self::Error)
                | (Self::Scanning, Self::Completed)
                | (Self::Scanning, Self::Error)
        )
    }
}

/// One discovery run against a subnet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanJob {
    pub id: ScanJobId,
    pub subnet: String,
    pub status: ScanJobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub routers_found: u32,
    pub asymmetries_found: u32,
    /// Human-readable reason when the job ended in `error`.
    pub error: Option<String>,
    pub results: Option<ScanResults>,
}

impl ScanJob {
    pub fn new(subnet: &str) -> Self {
        Self {
            id: ScanJobId::new(),
            subnet: subnet.to_string(),
            status: ScanJobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            routers_found: 0,
            asymmetries_found: 0,
            error: None,
            results: None,
        }
    }

    /// Move the job to `next`, rejecting regressions and terminal exits.
    pub fn advance(&mut self, next: ScanJobStatus) -> Result<()> {
        if !self.status.can_advance_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        match next {
            ScanJobStatus::Scanning => self.started_at = Some(now),
            ScanJobStatus::Completed | ScanJobStatus::Error => self.completed_at = Some(now),
            ScanJobStatus::Pending => {}
        }
        self.status = next;
        Ok(())
    }

    /// Finish successfully with the computed result snapshot.
    pub fn complete(&mut self, results: ScanResults) -> Result<()> {
        self.advance(ScanJobStatus::Completed)?;
        self.routers_found = results.device_ids.len() as u32;
        self.asymmetries_found = results.asymmetric_routes.len() as u32;
        self.results = Some(results);
        Ok(())
    }

    /// Abort with a reason.
    pub fn fail(&mut self, reason: &str) -> Result<()> {
        self.advance(ScanJobStatus::Error)?;
        self.error = Some(reason.to_string());
        Ok(())
    }
}

/// Snapshot stored on a completed scan job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanResults {
    /// Devices that answered during this scan.
    pub device_ids: Vec<DeviceId>,
    pub asymmetric_routes: Vec<AsymmetricRoute>,
    pub topology: TopologyGraph,
}

// ── Derived views ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TopologyGraph {
    pub nodes: Vec<TopologyNode>,
    pub edges: Vec<TopologyEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopologyNode {
    pub id: DeviceId,
    pub ip: String,
    pub hostname: Option<String>,
    pub identity: Option<String>,
    pub status: DeviceStatus,
}

/// A confirmed bidirectional neighbor relation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopologyEdge {
    /// Sorted device-ID pair, `"<lower>-<higher>"`.
    pub id: String,
    pub source: DeviceId,
    pub target: DeviceId,
    /// Cost reported by `source` towards `target`.
    pub cost: u32,
    /// Cost reported by `target` towards `source`.
    pub reverse_cost: u32,
    pub is_asymmetric: bool,
}

impl TopologyEdge {
    /// Deterministic key for an unordered device pair.
    pub fn key(a: DeviceId, b: DeviceId) -> String {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        format!("{lo}-{hi}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A link whose two directional OSPF costs disagree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AsymmetricRoute {
    pub device1_name: String,
    pub device1_ip: String,
    pub device2_name: String,
    pub device2_ip: String,
    pub cost1to2: u32,
    pub cost2to1: u32,
    pub difference: u32,
    pub severity: Severity,
}
