//! Error types for dra-pool

use thiserror::Error;

use dra_api::DeviceId;

use crate::pool::ReservationId;

/// Errors that can occur in the device pool
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Device already held by another owner in a conflicting mode
    #[error("device {device} is reserved by {holder}")]
    Conflict { device: DeviceId, holder: ReservationId },

    /// Device is not (or no longer) in the inventory
    #[error("device {0} is not in the pool")]
    UnknownDevice(DeviceId),

    /// Device added twice
    #[error("device {0} is already in the pool")]
    DuplicateDevice(DeviceId),

    /// A staged reservation lost a device to an inventory change
    #[error("reservation {0} was invalidated by an inventory change")]
    ReservationInvalidated(ReservationId),

    /// The pool lock was poisoned by a panicking thread
    #[error("device pool lock poisoned")]
    LockPoisoned,
}

impl PoolError {
    /// True when the failure came from a concurrent change to the pool and
    /// a retry against a fresh snapshot may succeed.
    pub fn is_race(&self) -> bool {
        matches!(
            self,
            PoolError::Conflict { .. } | PoolError::UnknownDevice(_) | PoolError::ReservationInvalidated(_)
        )
    }
}

/// Result type for pool operations
pub type PoolResult<T> = std::result::Result<T, PoolError>;
