use thiserror::Error;

use crate::types::ScanJobStatus;

/// Errors raised by core domain rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid scan job transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: ScanJobStatus,
        to: ScanJobStatus,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;
