//! routewatch-discover: Router discovery over the RouterOS API.
//!
//! Enumerates a subnet, logs into each address's management API (directly
//! or through an SSH tunnel), reads identity and the OSPF neighbor table,
//! and upserts what it finds. Each scan is a tracked job with a progress
//! stream; a scheduler repeats scans per configured subnet.

pub mod config;
pub mod credentials;
pub mod enumerate;
pub mod error;
pub mod orchestrator;
pub mod probe;
pub mod progress;
pub mod routeros;
pub mod scheduler;
pub mod transport;
pub mod tunnel;

#[cfg(test)]
mod testkit;

pub use credentials::{CredentialProvider, Credentials, StaticCredentials};
pub use enumerate::AddressRange;
pub use error::DiscoverError;
pub use orchestrator::ScanOrchestrator;
pub use probe::{DeviceProbe, Survey, SystemInfo};
pub use progress::{ProgressHub, ProgressSubscription};
pub use transport::{Channel, Transport, TransportError};
pub use tunnel::{SshTunnel, TunnelError, TunnelSession, TunnelStatus};
