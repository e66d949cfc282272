//! Scan scheduling engine.
//!
//! Spawns one tokio task per configured subnet, each running periodic scans
//! at the configured interval. A semaphore limits how many scan jobs run at
//! once across all subnets.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::config::{DiscoverConfig, SubnetSchedule};
use crate::enumerate::AddressRange;
use crate::error::Result;
use crate::orchestrator::ScanOrchestrator;

/// The scheduler manages periodic scan jobs for multiple subnets.
pub struct ScanScheduler {
    orchestrator: ScanOrchestrator,
    subnets: Vec<SubnetSchedule>,
    concurrency: Arc<Semaphore>,
}

impl ScanScheduler {
    pub fn new(orchestrator: ScanOrchestrator, config: &DiscoverConfig) -> Self {
        Self {
            orchestrator,
            subnets: config.subnets.clone(),
            concurrency: Arc::new(Semaphore::new(config.max_concurrent_scans.max(1))),
        }
    }

    /// Subnets that will get a scan loop: enabled and valid.
    pub fn schedulable(&self) -> Vec<SubnetSchedule> {
        self.subnets
            .iter()
            .filter(|subnet| {
                if !subnet.enabled {
                    tracing::info!(cidr = %subnet.cidr, "Subnet disabled, skipping");
                    return false;
                }
                if let Err(e) = AddressRange::parse(&subnet.cidr) {
                    tracing::error!(cidr = %subnet.cidr, error = %e, "Invalid subnet, skipping");
                    return false;
                }
                true
            })
            .cloned()
            .collect()
    }

    /// Run the scheduler, spawning a tokio task per subnet.
    /// Blocks indefinitely until all tasks complete or the runtime shuts down.
    pub async fn run(&self) -> Result<()> {
        let mut handles = Vec::new();

        for subnet in self.schedulable() {
            let orchestrator = self.orchestrator.clone();
            let semaphore = self.concurrency.clone();

            let handle = tokio::spawn(async move {
                run_subnet_loop(orchestrator, subnet, semaphore).await;
            });
            handles.push(handle);
        }

        tracing::info!(subnet_count = handles.len(), "Scheduler started");

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Subnet scan task panicked");
            }
        }

        Ok(())
    }
}

/// Per-subnet scan loop with configurable interval.
async fn run_subnet_loop(
    orchestrator: ScanOrchestrator,
    subnet: SubnetSchedule,
    semaphore: Arc<Semaphore>,
) {
    let mut ticker = interval(Duration::from_secs(subnet.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let name = subnet.name.as_deref().unwrap_or(&subnet.cidr);

    loop {
        ticker.tick().await;

        tracing::info!(cidr = %subnet.cidr, name = %name, "Scheduled scan triggered");

        let Ok(_permit) = semaphore.acquire().await else {
            tracing::warn!(cidr = %subnet.cidr, "Scheduler shut down");
            return;
        };

        match orchestrator.run_scan(&subnet.cidr).await {
            Ok(job) => tracing::info!(
                cidr = %subnet.cidr,
                job_id = %job.id,
                routers = job.routers_found,
                asymmetries = job.asymmetries_found,
                "Scheduled scan complete"
            ),
            Err(e) => tracing::error!(cidr = %subnet.cidr, error = %e, "Scheduled scan failed"),
        }
    }
}
