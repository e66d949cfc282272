//! Scan orchestration.
//!
//! A scan job walks `pending → scanning → completed | error`. Addresses are
//! probed one at a time in enumeration order, so progress percentages only
//! go up and the terminal event is always last. A tunnel failure at any
//! address aborts the job; anything else just means that address is not a
//! router we can talk to.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use routewatch_core::events::percent;
use routewatch_core::{
    DeviceId, DeviceStatus, DeviceUpsert, ScanJob, ScanJobId, ScanJobStatus, ScanProgress,
    ScanResults, SeverityThresholds,
};
use routewatch_store::PersistenceStore;
use routewatch_topology::{build_topology, detect_asymmetries};

use crate::credentials::CredentialProvider;
use crate::enumerate::AddressRange;
use crate::error::{DiscoverError, Result};
use crate::probe::DeviceProbe;
use crate::progress::{ProgressHub, ProgressSubscription};
use crate::routeros;
use crate::transport::Transport;

/// Running counters, reported in progress events and on abort.
#[derive(Default)]
struct Tally {
    percent: u8,
    device_ids: Vec<DeviceId>,
}

impl Tally {
    fn routers(&self) -> u32 {
        self.device_ids.len() as u32
    }
}

/// Creates scan jobs, runs them and fans out their progress.
#[derive(Clone)]
pub struct ScanOrchestrator {
    store: Arc<dyn PersistenceStore>,
    transport: Transport,
    credentials: Arc<dyn CredentialProvider>,
    progress: Arc<ProgressHub>,
    thresholds: SeverityThresholds,
    api_port: u16,
    probe_timeout: Duration,
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<dyn PersistenceStore>,
        transport: Transport,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            store,
            transport,
            credentials,
            progress: Arc::new(ProgressHub::new()),
            thresholds: SeverityThresholds::default(),
            api_port: routeros::DEFAULT_PORT,
            probe_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_thresholds(mut self, thresholds: SeverityThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_api_port(mut self, port: u16) -> Self {
        self.api_port = port;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn PersistenceStore> {
        &self.store
    }

    pub fn progress(&self) -> &ProgressHub {
        &self.progress
    }

    /// Subscribe to a running job. Finished or unknown jobs yield an empty stream.
    pub fn subscribe(&self, job_id: ScanJobId) -> ProgressSubscription {
        self.progress.subscribe(job_id)
    }

    /// Validate, create the job and scan it in the background.
    ///
    /// Returns the job while it is still `pending`. Invalid subnets fail
    /// here, before any job exists.
    pub async fn start_scan(&self, subnet: &str) -> Result<ScanJob> {
        let (job, range) = self.create_job(subnet).await?;
        self.spawn(job.clone(), range);
        Ok(job)
    }

    /// Like [`start_scan`](Self::start_scan), subscribed before the first event.
    pub async fn start_scan_with_progress(
        &self,
        subnet: &str,
    ) -> Result<(ScanJob, ProgressSubscription)> {
        let (job, range) = self.create_job(subnet).await?;
        let subscription = self.progress.subscribe(job.id);
        self.spawn(job.clone(), range);
        Ok((job, subscription))
    }

    /// Create and run a job to the end on the current task.
    ///
    /// Returns the finished job, or the error that aborted it (the job is
    /// then stored with status `error`).
    pub async fn run_scan(&self, subnet: &str) -> Result<ScanJob> {
        let (job, range) = self.create_job(subnet).await?;
        self.execute(job, range).await
    }

    async fn create_job(&self, subnet: &str) -> Result<(ScanJob, AddressRange)> {
        let range = AddressRange::parse(subnet)?;
        let job = self.store.create_scan_job(&range.to_string()).await?;
        self.progress.register(job.id);
        tracing::info!(
            job_id = %job.id,
            subnet = %range,
            addresses = range.len(),
            "Scan job created"
        );
        Ok((job, range))
    }

    fn spawn(&self, job: ScanJob, range: AddressRange) {
        let this = self.clone();
        tokio::spawn(async move {
            let job_id = job.id;
            if let Err(e) = this.execute(job, range).await {
                tracing::debug!(job_id = %job_id, error = %e, "Background scan ended with error");
            }
        });
    }

    async fn execute(&self, mut job: ScanJob, range: AddressRange) -> Result<ScanJob> {
        let mut tally = Tally::default();

        let results = match self.sweep(&mut job, &range, &mut tally).await {
            Ok(results) => results,
            Err(e) => return self.abort(job, &tally, e).await,
        };

        // Complete a copy so a failed write can still fail the `scanning` job.
        let mut finished = job.clone();
        let recorded: Result<()> = match finished.complete(results) {
            Ok(()) => self.store.update_scan_job(&finished).await.map_err(Into::into),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = recorded {
            return self.abort(job, &tally, e).await;
        }
        let job = finished;

        self.progress
            .publish(&ScanProgress::completed(job.id, job.routers_found));
        tracing::info!(
            job_id = %job.id,
            subnet = %job.subnet,
            routers = job.routers_found,
            asymmetries = job.asymmetries_found,
            "Scan job completed"
        );
        Ok(job)
    }

    /// Probe every address, then derive the result snapshot.
    async fn sweep(
        &self,
        job: &mut ScanJob,
        range: &AddressRange,
        tally: &mut Tally,
    ) -> Result<ScanResults> {
        let credentials = self.credentials.credentials().await?;
        let probe = DeviceProbe::new(self.transport.clone(), credentials)
            .with_port(self.api_port)
            .with_timeout(self.probe_timeout);

        job.advance(ScanJobStatus::Scanning)?;
        self.store.update_scan_job(job).await?;
        tracing::info!(
            job_id = %job.id,
            subnet = %range,
            tunneled = self.transport.is_tunneled(),
            "Scan job started"
        );

        let total = range.len();
        for (index, addr) in range.iter().enumerate() {
            let ip = addr.to_string();
            tally.percent = percent(index, total);
            self.progress.publish(&ScanProgress::probing(
                job.id,
                index,
                total,
                &ip,
                tally.routers(),
            ));

            let Some(survey) = probe.survey(&ip).await? else {
                tracing::debug!(job_id = %job.id, address = %ip, "No router at address");
                self.mark_offline(&ip).await?;
                continue;
            };

            let mut upsert = DeviceUpsert::online(&ip, Utc::now());
            upsert.hostname = survey.info.identity.clone();
            upsert.identity = survey.info.identity;
            upsert.version = survey.info.version;
            upsert.model = survey.info.model;
            upsert.neighbors = survey.neighbors;

            let device = self.store.upsert_device(upsert).await?;
            tracing::debug!(
                job_id = %job.id,
                address = %ip,
                name = %device.display_name(),
                neighbors = device.neighbors.len(),
                "Router discovered"
            );
            tally.device_ids.push(device.id);
        }
        tally.percent = 100;

        let devices = self.store.list_devices().await?;
        Ok(ScanResults {
            device_ids: tally.device_ids.clone(),
            asymmetric_routes: detect_asymmetries(&devices, &self.thresholds),
            topology: build_topology(&devices),
        })
    }

    /// A known device that stopped answering is flagged offline; unknown
    /// addresses leave no trace. Only the status is written, so a neighbor
    /// table refreshed meanwhile by another job survives.
    async fn mark_offline(&self, ip: &str) -> Result<()> {
        let marked = self
            .store
            .set_device_status(ip, DeviceStatus::Offline)
            .await?;
        if let Some(device) = marked {
            tracing::info!(
                address = %ip,
                name = %device.display_name(),
                "Known router marked offline"
            );
        }
        Ok(())
    }

    /// Record the failure once on the job and once as the terminal event.
    async fn abort(&self, mut job: ScanJob, tally: &Tally, err: DiscoverError) -> Result<ScanJob> {
        let reason = err.to_string();
        tracing::error!(job_id = %job.id, subnet = %job.subnet, error = %reason, "Scan job failed");

        match job.fail(&reason) {
            Ok(()) => {
                if let Err(e) = self.store.update_scan_job(&job).await {
                    tracing::warn!(job_id = %job.id, error = %e, "Could not record scan failure");
                }
            }
            Err(e) => tracing::warn!(job_id = %job.id, error = %e, "Job already terminal"),
        }

        self.progress.publish(&ScanProgress::failed(
            job.id,
            tally.percent,
            tally.routers(),
            &reason,
        ));
        Err(err)
    }
}
