//! In-process store, used for one-shot scans and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use routewatch_core::{Device, DeviceStatus, DeviceUpsert, ScanJob, ScanJobId};

use crate::store::{check_transition, ip_sort_key, PersistenceStore, Result, StoreError};

/// Store backed by in-memory maps. Each upsert runs under one write lock,
/// which gives the per-IP atomicity the trait requires.
#[derive(Default)]
pub struct MemoryStore {
    devices: RwLock<HashMap<String, Device>>,
    jobs: RwLock<HashMap<ScanJobId, ScanJob>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn get_device_by_ip(&self, ip: &str) -> Result<Option<Device>> {
        Ok(self.devices.read().await.get(ip).cloned())
    }

    async fn list_devices(&self) -> Result<Vec<Device>> {
        let mut devices: Vec<Device> = self.devices.read().await.values().cloned().collect();
        devices.sort_by_key(|d| ip_sort_key(&d.ip));
        Ok(devices)
    }

    async fn upsert_device(&self, upsert: DeviceUpsert) -> Result<Device> {
        let mut devices = self.devices.write().await;
        let device = match devices.get_mut(&upsert.ip) {
            Some(existing) => {
                existing.apply(upsert);
                existing.clone()
            }
            None => {
                let device = Device::from_upsert(upsert, Utc::now());
                devices.insert(device.ip.clone(), device.clone());
                device
            }
        };
        Ok(device)
    }

    async fn set_device_status(&self, ip: &str, status: DeviceStatus) -> Result<Option<Device>> {
        let mut devices = self.devices.write().await;
        Ok(devices.get_mut(ip).map(|device| {
            device.status = status;
            device.clone()
        }))
    }

    async fn create_scan_job(&self, subnet: &str) -> Result<ScanJob> {
        let job = ScanJob::new(subnet);
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(job)
    }

    async fn update_scan_job(&self, job: &ScanJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs.get_mut(&job.id).ok_or_else(|| StoreError::NotFound {
            kind: "ScanJob",
            id: job.id.to_string(),
        })?;
        check_transition(stored.status, job.status)?;
        *stored = job.clone();
        Ok(())
    }

    async fn get_scan_job(&self, id: &ScanJobId) -> Result<Option<ScanJob>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn list_scan_jobs(&self) -> Result<Vec<ScanJob>> {
        let mut jobs: Vec<ScanJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use routewatch_core::{NeighborRecord, ScanJobStatus, ScanResults};

    fn upsert_with_neighbor(ip: &str, neighbor_ip: &str, cost: u32) -> DeviceUpsert {
        let mut upsert = DeviceUpsert::online(ip, Utc::now());
        upsert.identity = Some(format!("r-{ip}"));
        upsert.neighbors = vec![NeighborRecord {
            neighbor_ip: neighbor_ip.to_string(),
            cost,
            ..Default::default()
        }];
        upsert
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_by_ip() {
        let store = MemoryStore::new();
        let first = store
            .upsert_device(upsert_with_neighbor("10.0.0.1", "10.0.0.2", 10))
            .await
            .unwrap();
        let second = store
            .upsert_device(upsert_with_neighbor("10.0.0.1", "10.0.0.3", 40))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.first_seen, second.first_seen);
        let devices = store.list_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].neighbors.len(), 1);
        assert_eq!(devices[0].neighbors[0].neighbor_ip, "10.0.0.3");
        assert_eq!(devices[0].neighbors[0].cost, 40);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_create_one_record() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for cost in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert_device(upsert_with_neighbor("10.0.0.7", "10.0.0.8", cost))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.list_devices().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_status_change_keeps_everything_else() {
        let store = MemoryStore::new();
        let online = store
            .upsert_device(upsert_with_neighbor("10.0.0.1", "10.0.0.2", 10))
            .await
            .unwrap();
        let offline = store
            .set_device_status("10.0.0.1", DeviceStatus::Offline)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(offline.status, DeviceStatus::Offline);
        assert_eq!(offline.last_seen, online.last_seen);
        assert_eq!(offline.identity, online.identity);
        assert_eq!(offline.neighbors, online.neighbors);

        let unknown = store
            .set_device_status("10.0.0.9", DeviceStatus::Offline)
            .await
            .unwrap();
        assert!(unknown.is_none());
        assert_eq!(store.list_devices().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_status_change_does_not_clobber_newer_neighbors() {
        let store = MemoryStore::new();
        store
            .upsert_device(upsert_with_neighbor("10.0.0.1", "10.0.0.2", 10))
            .await
            .unwrap();
        // Another job refreshes the table between this job's read and write.
        store
            .upsert_device(upsert_with_neighbor("10.0.0.1", "10.0.0.3", 40))
            .await
            .unwrap();
        store
            .set_device_status("10.0.0.1", DeviceStatus::Offline)
            .await
            .unwrap();

        let device = store.get_device_by_ip("10.0.0.1").await.unwrap().unwrap();
        assert_eq!(device.status, DeviceStatus::Offline);
        assert_eq!(device.neighbors[0].neighbor_ip, "10.0.0.3");
        assert_eq!(device.neighbors[0].cost, 40);
    }

    #[tokio::test]
    async fn test_list_devices_numeric_order() {
        let store = MemoryStore::new();
        for ip in ["10.0.0.10", "10.0.0.2", "10.0.0.1"] {
            store
                .upsert_device(DeviceUpsert::online(ip, Utc::now()))
                .await
                .unwrap();
        }
        let ips: Vec<String> = store
            .list_devices()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.ip)
            .collect();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2", "10.0.0.10"]);
    }

    #[tokio::test]
    async fn test_scan_job_lifecycle() {
        let store = MemoryStore::new();
        let mut job = store.create_scan_job("10.0.0.0/30").await.unwrap();
        assert_eq!(job.status, ScanJobStatus::Pending);

        job.advance(ScanJobStatus::Scanning).unwrap();
        store.update_scan_job(&job).await.unwrap();

        let mut done = job.clone();
        done.complete(ScanResults::default()).unwrap();
        store.update_scan_job(&done).await.unwrap();

        // A stale copy still in `scanning` must not overwrite the terminal state.
        let err = store.update_scan_job(&job).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));

        let stored = store.get_scan_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ScanJobStatus::Completed);
        assert_eq!(store.list_scan_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_job() {
        let store = MemoryStore::new();
        let job = ScanJob::new("10.0.0.0/30");
        let err = store.update_scan_job(&job).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "ScanJob", .. }));
    }
}
