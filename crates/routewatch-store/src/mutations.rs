//! Write operations against Neo4j.
//!
//! Devices are merged on `ip` so re-discovery updates in place. Optional
//! fields are stored as empty strings; neighbor tables and scan results as
//! JSON strings.

use chrono::Utc;
use neo4rs::query;

use routewatch_core::{
    CoreError, Device, DeviceId, DeviceStatus, DeviceUpsert, ScanJob, ScanJobStatus,
};

use crate::client::GraphClient;
use crate::queries::node_to_device;
use crate::store::{Result, StoreError};

const ALL_STATUSES: [ScanJobStatus; 4] = [
    ScanJobStatus::Pending,
    ScanJobStatus::Scanning,
    ScanJobStatus::Completed,
    ScanJobStatus::Error,
];

impl GraphClient {
    /// Create or overwrite the device at `upsert.ip` and return the stored record.
    pub async fn merge_device(&self, upsert: &DeviceUpsert) -> Result<Device> {
        let neighbors = serde_json::to_string(&upsert.neighbors)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let seen_at = upsert
            .seen_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();

        let q = query(
            "MERGE (d:Device {ip: $ip})
             ON CREATE SET d.id = $id, d.first_seen = $now, d.last_seen = ''
             SET d.hostname = $hostname, d.identity = $identity,
                 d.version = $version, d.model = $model,
                 d.status = $status, d.neighbors = $neighbors,
                 d.last_seen = CASE WHEN $seen_at = '' THEN d.last_seen ELSE $seen_at END
             RETURN d",
        )
        .param("ip", upsert.ip.clone())
        .param("id", DeviceId::for_ip(&upsert.ip).to_string())
        .param("hostname", opt_string(&upsert.hostname))
        .param("identity", opt_string(&upsert.identity))
        .param("version", opt_string(&upsert.version))
        .param("model", opt_string(&upsert.model))
        .param("status", upsert.status.as_str())
        .param("neighbors", neighbors)
        .param("seen_at", seen_at)
        .param("now", Utc::now().to_rfc3339());

        let row = self
            .query_one(q)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: "Device",
                id: upsert.ip.clone(),
            })?;
        let node: neo4rs::Node = row
            .get("d")
            .map_err(|e| StoreError::Serialization(format!("Failed to deserialize device: {e}")))?;
        node_to_device(&node)
    }

    /// Set only `status` on the device at `ip`. `None` if no such device.
    pub async fn write_device_status(
        &self,
        ip: &str,
        status: DeviceStatus,
    ) -> Result<Option<Device>> {
        let q = query(
            "MATCH (d:Device {ip: $ip})
             SET d.status = $status
             RETURN d",
        )
        .param("ip", ip.to_string())
        .param("status", status.as_str());

        let Some(row) = self.query_one(q).await? else {
            return Ok(None);
        };
        let node: neo4rs::Node = row
            .get("d")
            .map_err(|e| StoreError::Serialization(format!("Failed to deserialize device: {e}")))?;
        node_to_device(&node).map(Some)
    }

    /// Insert a freshly created scan job.
    pub async fn insert_scan_job(&self, job: &ScanJob) -> Result<()> {
        let q = query(
            "CREATE (j:ScanJob {
               id: $id, subnet: $subnet, status: $status, created_at: $created_at,
               started_at: '', completed_at: '', routers_found: 0,
               asymmetries_found: 0, error: '', results: ''
             })",
        )
        .param("id", job.id.to_string())
        .param("subnet", job.subnet.clone())
        .param("status", job.status.as_str())
        .param("created_at", job.created_at.to_rfc3339());

        self.run(q).await
    }

    /// Overwrite a stored job, but only if its stored status may advance to the new one.
    pub async fn save_scan_job(&self, job: &ScanJob) -> Result<()> {
        let allowed_from: Vec<String> = ALL_STATUSES
            .iter()
            .filter(|s| **s == job.status || s.can_advance_to(job.status))
            .map(|s| s.as_str().to_string())
            .collect();
        let results = match &job.results {
            Some(r) => {
                serde_json::to_string(r).map_err(|e| StoreError::Serialization(e.to_string()))?
            }
            None => String::new(),
        };

        let q = query(
            "MATCH (j:ScanJob {id: $id})
             WHERE j.status IN $allowed_from
             SET j.status = $status, j.started_at = $started_at,
                 j.completed_at = $completed_at, j.routers_found = $routers_found,
                 j.asymmetries_found = $asymmetries_found, j.error = $error,
                 j.results = $results
             RETURN j.id AS id",
        )
        .param("id", job.id.to_string())
        .param("allowed_from", allowed_from)
        .param("status", job.status.as_str())
        .param(
            "started_at",
            job.started_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        )
        .param(
            "completed_at",
            job.completed_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        )
        .param("routers_found", job.routers_found as i64)
        .param("asymmetries_found", job.asymmetries_found as i64)
        .param("error", opt_string(&job.error))
        .param("results", results);

        if self.query_one(q).await?.is_some() {
            return Ok(());
        }

        // Nothing matched: either the job is unknown or the write regresses it.
        match self.find_scan_job(&job.id).await? {
            Some(stored) => Err(StoreError::InvalidTransition(
                CoreError::InvalidTransition {
                    from: stored.status,
                    to: job.status,
                },
            )),
            None => Err(StoreError::NotFound {
                kind: "ScanJob",
                id: job.id.to_string(),
            }),
        }
    }

    /// Delete every device and scan job. Used by integration tests.
    pub async fn clear(&self) -> Result<()> {
        self.run(query("MATCH (n) WHERE n:Device OR n:ScanJob DETACH DELETE n"))
            .await
    }
}

fn opt_string(opt: &Option<String>) -> String {
    opt.clone().unwrap_or_default()
}
