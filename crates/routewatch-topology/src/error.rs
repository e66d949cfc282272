//! Error types for the routewatch-topology crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("Store error: {0}")]
    Store(#[from] routewatch_store::StoreError),
}

pub type Result<T> = std::result::Result<T, TopologyError>;
