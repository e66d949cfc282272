//! The persistence contract consumed by the scanner and the topology engine.

use async_trait::async_trait;

use routewatch_core::{
    CoreError, Device, DeviceStatus, DeviceUpsert, ScanJob, ScanJobId, ScanJobStatus,
};

/// Errors from persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    InvalidTransition(#[from] CoreError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage for devices (keyed by IP) and scan jobs (keyed by ID).
///
/// `upsert_device` must be atomic per IP: concurrent upserts of the same
/// address never produce two records.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn get_device_by_ip(&self, ip: &str) -> Result<Option<Device>>;

    /// All devices, ordered by numeric IP.
    async fn list_devices(&self) -> Result<Vec<Device>>;

    /// Create the device if the IP is unseen, otherwise overwrite its
    /// mutable fields and neighbor table. Returns the stored record.
    async fn upsert_device(&self, upsert: DeviceUpsert) -> Result<Device>;

    /// Change only the status of the device at `ip`, leaving its neighbor
    /// table and `last_seen` alone. `None` if the IP is unseen.
    async fn set_device_status(&self, ip: &str, status: DeviceStatus) -> Result<Option<Device>>;

    async fn create_scan_job(&self, subnet: &str) -> Result<ScanJob>;

    /// Persist a job's new state. Status regressions are rejected.
    async fn update_scan_job(&self, job: &ScanJob) -> Result<()>;

    async fn get_scan_job(&self, id: &ScanJobId) -> Result<Option<ScanJob>>;

    /// All scan jobs, newest first.
    async fn list_scan_jobs(&self) -> Result<Vec<ScanJob>>;
}

/// Reject a write that would move a job backwards.
pub(crate) fn check_transition(stored: ScanJobStatus, next: ScanJobStatus) -> Result<()> {
    if stored == next || stored.can_advance_to(next) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition(CoreError::InvalidTransition {
            from: stored,
            to: next,
        }))
    }
}

/// Sort key placing IPv4 addresses in numeric order, unparsable ones last.
pub(crate) fn ip_sort_key(ip: &str) -> (u8, u32, String) {
    match ip.parse::<std::net::Ipv4Addr>() {
        Ok(addr) => (0, u32::from(addr), String::new()),
        Err(_) => (1, 0, ip.to_string()),
    }
}
