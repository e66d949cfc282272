//! Read operations against Neo4j and node-to-record conversion.

use chrono::{DateTime, Utc};
use neo4rs::query;

use routewatch_core::{
    Device, DeviceId, DeviceStatus, NeighborRecord, ScanJob, ScanJobId, ScanJobStatus,
    ScanResults,
};
use uuid::Uuid;

use crate::client::GraphClient;
use crate::store::{ip_sort_key, Result, StoreError};

impl GraphClient {
    /// Look up a device by its IP.
    pub async fn find_device(&self, ip: &str) -> Result<Option<Device>> {
        let q = query("MATCH (d:Device {ip: $ip}) RETURN d").param("ip", ip.to_string());

        match self.query_one(q).await? {
            Some(row) => {
                let node: neo4rs::Node = row.get("d").map_err(|e| {
                    StoreError::Serialization(format!("Failed to deserialize device: {e}"))
                })?;
                Ok(Some(node_to_device(&node)?))
            }
            None => Ok(None),
        }
    }

    /// Every stored device, ordered by numeric IP.
    pub async fn all_devices(&self) -> Result<Vec<Device>> {
        let rows = self.query_rows(query("MATCH (d:Device) RETURN d")).await?;
        let mut devices = Vec::with_capacity(rows.len());
        for row in rows {
            let node: neo4rs::Node = row.get("d").map_err(|e| {
                StoreError::Serialization(format!("Failed to deserialize device: {e}"))
            })?;
            devices.push(node_to_device(&node)?);
        }
        devices.sort_by_key(|d| ip_sort_key(&d.ip));
        Ok(devices)
    }

    pub async fn find_scan_job(&self, id: &ScanJobId) -> Result<Option<ScanJob>> {
        let q = query("MATCH (j:ScanJob {id: $id}) RETURN j").param("id", id.to_string());

        match self.query_one(q).await? {
            Some(row) => {
                let node: neo4rs::Node = row.get("j").map_err(|e| {
                    StoreError::Serialization(format!("Failed to deserialize scan job: {e}"))
                })?;
                Ok(Some(node_to_scan_job(&node)?))
            }
            None => Ok(None),
        }
    }

    /// Every scan job, newest first.
    pub async fn all_scan_jobs(&self) -> Result<Vec<ScanJob>> {
        let rows = self
            .query_rows(query(
                "MATCH (j:ScanJob) RETURN j ORDER BY j.created_at DESC",
            ))
            .await?;
        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let node: neo4rs::Node = row.get("j").map_err(|e| {
                StoreError::Serialization(format!("Failed to deserialize scan job: {e}"))
            })?;
            jobs.push(node_to_scan_job(&node)?);
        }
        Ok(jobs)
    }
}

/// Convert a `Device` node into the domain record.
pub(crate) fn node_to_device(node: &neo4rs::Node) -> Result<Device> {
    let ip: String = node.get("ip").unwrap_or_default();
    let id = match node.get::<String>("id").ok().and_then(|s| Uuid::parse_str(&s).ok()) {
        Some(uuid) => DeviceId(uuid),
        None => DeviceId::for_ip(&ip),
    };
    let neighbors: Vec<NeighborRecord> = match node.get::<String>("neighbors") {
        Ok(raw) if !raw.is_empty() => serde_json::from_str(&raw)
            .map_err(|e| StoreError::Serialization(format!("Bad neighbor table for {ip}: {e}")))?,
        _ => Vec::new(),
    };

    Ok(Device {
        id,
        hostname: opt_prop(node, "hostname"),
        identity: opt_prop(node, "identity"),
        version: opt_prop(node, "version"),
        model: opt_prop(node, "model"),
        status: DeviceStatus::parse(&node.get::<String>("status").unwrap_or_default()),
        first_seen: time_prop(node, "first_seen").unwrap_or_else(Utc::now),
        last_seen: time_prop(node, "last_seen"),
        neighbors,
        ip,
    })
}

fn node_to_scan_job(node: &neo4rs::Node) -> Result<ScanJob> {
    let raw_id: String = node.get("id").unwrap_or_default();
    let id = Uuid::parse_str(&raw_id)
        .map(ScanJobId)
        .map_err(|e| StoreError::Serialization(format!("Bad scan job id {raw_id}: {e}")))?;
    let raw_status: String = node.get("status").unwrap_or_default();
    let status = ScanJobStatus::parse(&raw_status).ok_or_else(|| {
        StoreError::Serialization(format!("Unknown scan job status: {raw_status}"))
    })?;
    let results: Option<ScanResults> = match node.get::<String>("results") {
        Ok(raw) if !raw.is_empty() => Some(serde_json::from_str(&raw).map_err(|e| {
            StoreError::Serialization(format!("Bad results for scan job {raw_id}: {e}"))
        })?),
        _ => None,
    };

    Ok(ScanJob {
        id,
        subnet: node.get("subnet").unwrap_or_default(),
        status,
        created_at: time_prop(node, "created_at").unwrap_or_else(Utc::now),
        started_at: time_prop(node, "started_at"),
        completed_at: time_prop(node, "completed_at"),
        routers_found: node.get::<i64>("routers_found").unwrap_or(0) as u32,
        asymmetries_found: node.get::<i64>("asymmetries_found").unwrap_or(0) as u32,
        error: opt_prop(node, "error"),
        results,
    })
}

fn opt_prop(node: &neo4rs::Node, key: &str) -> Option<String> {
    node.get::<String>(key).ok().filter(|s| !s.is_empty())
}

fn time_prop(node: &neo4rs::Node, key: &str) -> Option<DateTime<Utc>> {
    let raw = opt_prop(node, key)?;
    DateTime::parse_from_rfc3339(&raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
