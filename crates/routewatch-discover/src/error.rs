//! Error types for the routewatch-discover crate.
//!
//! Only failures that end a scan job (or stop it from being created) live
//! here. Per-device failures are absorbed inside the probe.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Invalid subnet {input:?}: {reason}")]
    InvalidSubnet { input: String, reason: String },

    #[error("Subnet {subnet} has {count} addresses, limit is {limit}")]
    SubnetTooLarge {
        subnet: String,
        count: u64,
        limit: u64,
    },

    #[error("Tunnel unavailable: {0}")]
    TunnelUnavailable(String),

    #[error("Store error: {0}")]
    Store(#[from] routewatch_store::StoreError),

    #[error(transparent)]
    Core(#[from] routewatch_core::CoreError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoverError {
    /// Validation errors are raised before a scan job exists.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidSubnet { .. } | Self::SubnetTooLarge { .. })
    }
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
