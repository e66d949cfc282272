//! Progress events pushed to scan job subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ScanJobId, ScanJobStatus};

/// A single progress update for a running scan job.
///
/// Events for one job are delivered in the order produced; a terminal
/// event (`completed` or `error`) is always the last one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanProgress {
    pub job_id: ScanJobId,
    pub percent_complete: u8,
    pub status: ScanJobStatus,
    pub routers_found: u32,
    /// Address about to be probed.
    pub current_address: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ScanProgress {
    /// Emitted before probing the address at `index` of `total`.
    pub fn probing(
        job_id: ScanJobId,
        index: usize,
        total: usize,
        address: &str,
        routers_found: u32,
    ) -> Self {
        Self {
            job_id,
            percent_complete: percent(index, total),
            status: ScanJobStatus::Scanning,
            routers_found,
            current_address: Some(address.to_string()),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn completed(job_id: ScanJobId, routers_found: u32) -> Self {
        Self {
            job_id,
            percent_complete: 100,
            status: ScanJobStatus::Completed,
            routers_found,
            current_address: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(job_id: ScanJobId, percent_complete: u8, routers_found: u32, error: &str) -> Self {
        Self {
            job_id,
            percent_complete,
            status: ScanJobStatus::Error,
            routers_found,
            current_address: None,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Integer percentage of `done` out of `total`, clamped to 0..=100.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}
