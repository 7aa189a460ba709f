//! Claim status: allocation, consumers, deallocation.

use serde::{Deserialize, Serialize};

use crate::allocation::AllocationResult;
use crate::error::{ApiError, ApiResult};

/// Maximum number of consumers a claim can be reserved for.
pub const MAX_RESERVED_FOR: usize = 32;

/// A consumer (typically a pod) using an allocated claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerReference {
    #[serde(default)]
    pub api_group: String,
    pub resource: String,
    pub name: String,
    pub uid: String,
}

impl ConsumerReference {
    pub fn pod(name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            api_group: String::new(),
            resource: "pods".to_string(),
            name: name.into(),
            uid: uid.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation: Option<AllocationResult>,
    #[serde(default)]
    pub reserved_for: Vec<ConsumerReference>,
    #[serde(default)]
    pub deallocation_requested: bool,
}

impl ClaimStatus {
    pub fn is_allocated(&self) -> bool {
        self.allocation.is_some()
    }

    /// Record an allocation. A claim is allocated at most once until it is
    /// deallocated.
    pub fn set_allocation(&mut self, allocation: AllocationResult) -> ApiResult<()> {
        if self.allocation.is_some() {
            return Err(ApiError::AlreadyAllocated);
        }
        self.allocation = Some(allocation);
        self.deallocation_requested = false;
        Ok(())
    }

    /// Add a consumer. Re-adding an existing consumer is a no-op.
    pub fn reserve_for(&mut self, consumer: ConsumerReference) -> ApiResult<()> {
        let Some(allocation) = &self.allocation else {
            return Err(ApiError::NotAllocated);
        };
        if self.reserved_for.iter().any(|c| c.uid == consumer.uid) {
            return Ok(());
        }
        if self.deallocation_requested {
            return Err(ApiError::DeallocationPending);
        }
        if !allocation.shareable {
            if let Some(holder) = self.reserved_for.first() {
                return Err(ApiError::NotShareable {
                    holder: holder.name.clone(),
                });
            }
        }
        if self.reserved_for.len() >= MAX_RESERVED_FOR {
            return Err(ApiError::TooManyConsumers {
                max: MAX_RESERVED_FOR,
            });
        }
        self.reserved_for.push(consumer);
        Ok(())
    }

    /// Remove a consumer by uid; returns whether it was present.
    pub fn unreserve(&mut self, uid: &str) -> bool {
        let before = self.reserved_for.len();
        self.reserved_for.retain(|c| c.uid != uid);
        before != self.reserved_for.len()
    }

    /// Ask for deallocation; no new consumers are accepted afterwards.
    pub fn request_deallocation(&mut self) {
        if self.allocation.is_some() {
            self.deallocation_requested = true;
        }
    }

    /// Clear the allocation once no consumer remains. Returns the
    /// allocation that was removed.
    pub fn complete_deallocation(&mut self) -> ApiResult<AllocationResult> {
        if !self.reserved_for.is_empty() {
            return Err(ApiError::StillReserved {
                consumers: self.reserved_for.len(),
            });
        }
        let allocation = self.allocation.take().ok_or(ApiError::NotAllocated)?;
        self.deallocation_requested = false;
        Ok(allocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocated(shareable: bool) -> ClaimStatus {
        let mut status = ClaimStatus::default();
        status
            .set_allocation(AllocationResult {
                shareable,
                ..AllocationResult::default()
            })
            .unwrap();
        status
    }

    #[test]
    fn test_reserve_requires_allocation() {
        let mut status = ClaimStatus::default();
        assert!(matches!(
            status.reserve_for(ConsumerReference::pod("p", "1")),
            Err(ApiError::NotAllocated)
        ));
    }

    #[test]
    fn test_allocate_once() {
        let mut status = allocated(false);
        assert!(status.is_allocated());
        assert!(matches!(
            status.set_allocation(AllocationResult::default()),
            Err(ApiError::AlreadyAllocated)
        ));
    }

    #[test]
    fn test_non_shareable_single_consumer() {
        let mut status = allocated(false);
        status.reserve_for(ConsumerReference::pod("a", "1")).unwrap();
        status.reserve_for(ConsumerReference::pod("a", "1")).unwrap();
        assert_eq!(status.reserved_for.len(), 1);
        assert!(matches!(
            status.reserve_for(ConsumerReference::pod("b", "2")),
            Err(ApiError::NotShareable { .. })
        ));
    }

    #[test]
    fn test_shareable_bounded_consumers() {
        let mut status = allocated(true);
        for i in 0..MAX_RESERVED_FOR {
            status
                .reserve_for(ConsumerReference::pod(format!("p{i}"), i.to_string()))
                .unwrap();
        }
        assert!(matches!(
            status.reserve_for(ConsumerReference::pod("extra", "x")),
            Err(ApiError::TooManyConsumers { max: MAX_RESERVED_FOR })
        ));
    }

    #[test]
    fn test_deallocation_flow() {
        let mut status = allocated(true);
        status.reserve_for(ConsumerReference::pod("a", "1")).unwrap();
        status.request_deallocation();
        assert!(matches!(
            status.reserve_for(ConsumerReference::pod("b", "2")),
            Err(ApiError::DeallocationPending)
        ));
        assert!(matches!(
            status.complete_deallocation(),
            Err(ApiError::StillReserved { consumers: 1 })
        ));
        assert!(status.unreserve("1"));
        assert!(!status.unreserve("1"));
        status.complete_deallocation().unwrap();
        assert!(!status.is_allocated());
        assert!(!status.deallocation_requested);
    }
}
