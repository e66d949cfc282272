//! Neo4j connection management and the graph-backed store.

use async_trait::async_trait;
use neo4rs::{ConfigBuilder, Graph, Query};

use routewatch_core::{Device, DeviceStatus, DeviceUpsert, ScanJob, ScanJobId};

use crate::store::{PersistenceStore, Result, StoreError};

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "routewatch-dev".to_string(),
            max_connections: 16,
            fetch_size: 256,
        }
    }
}

/// Thread-safe Neo4j client with connection pooling.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j and make sure the device-IP constraint exists.
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let client = Self { graph };
        client.ensure_schema().await?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(client)
    }

    /// Uniqueness on `Device.ip` is what makes `MERGE` an atomic upsert.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.run(neo4rs::query(
            "CREATE CONSTRAINT device_ip IF NOT EXISTS
             FOR (d:Device) REQUIRE d.ip IS UNIQUE",
        ))
        .await?;
        self.run(neo4rs::query(
            "CREATE CONSTRAINT scan_job_id IF NOT EXISTS
             FOR (j:ScanJob) REQUIRE j.id IS UNIQUE",
        ))
        .await
    }

    /// Execute a write-only query (CREATE, MERGE, DELETE, SET).
    pub async fn run(&self, query: Query) -> Result<()> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a read query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }
}

#[async_trait]
impl PersistenceStore for GraphClient {
    async fn get_device_by_ip(&self, ip: &str) -> Result<Option<Device>> {
        self.find_device(ip).await
    }

    async fn list_devices(&self) -> Result<Vec<Device>> {
        self.all_devices().await
    }

    async fn upsert_device(&self, upsert: DeviceUpsert) -> Result<Device> {
        self.merge_device(&upsert).await
    }

    async fn set_device_status(&self, ip: &str, status: DeviceStatus) -> Result<Option<Device>> {
        self.write_device_status(ip, status).await
    }

    async fn create_scan_job(&self, subnet: &str) -> Result<ScanJob> {
        let job = ScanJob::new(subnet);
        self.insert_scan_job(&job).await?;
        Ok(job)
    }

    async fn update_scan_job(&self, job: &ScanJob) -> Result<()> {
        self.save_scan_job(job).await
    }

    async fn get_scan_job(&self, id: &ScanJobId) -> Result<Option<ScanJob>> {
        self.find_scan_job(id).await
    }

    async fn list_scan_jobs(&self) -> Result<Vec<ScanJob>> {
        self.all_scan_jobs().await
    }
}
