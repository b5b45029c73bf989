//! Error types for lease operations

use shopfloor_store::StoreError;
use shopfloor_util::{MachineId, OperatorId};
use thiserror::Error;

/// Errors surfaced by [`crate::LeaseService`]
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("Machine not found: {0}")]
    MachineNotFound(MachineId),

    #[error("Operator not found: {0}")]
    OperatorNotFound(OperatorId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl LeaseError {
    /// Whether the caller referenced something that does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LeaseError::MachineNotFound(_) | LeaseError::OperatorNotFound(_)
        )
    }
}

pub type LeaseResult<T> = Result<T, LeaseError>;
