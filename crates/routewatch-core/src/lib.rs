//! routewatch-core: Shared types, progress events, and error handling for routewatch.
//!
//! This crate provides the foundational types used across the scanner:
//! - Device and neighbor-table records discovered over the management API
//! - Scan job lifecycle and its result snapshot
//! - Derived topology and asymmetric-route views
//! - Progress events pushed to scan subscribers
//! - Severity policy for asymmetric links

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::SeverityThresholds;
pub use error::CoreError;
pub use events::ScanProgress;
pub use types::{
    AsymmetricRoute, Device, DeviceId, DeviceStatus, DeviceUpsert, NeighborRecord, ScanJob,
    ScanJobId, ScanJobStatus, ScanResults, Severity, TopologyEdge, TopologyGraph, TopologyNode,
};
