//! DRA Allocator - claim resolution
//!
//! Layer 2 of the resolver workspace. Turns a [`dra_api::Claim`] into an
//! [`dra_api::AllocationResult`] against a shared [`dra_pool::DevicePool`]:
//!
//! - `validate`: class lookup and selector compilation, with field paths
//! - `request`: candidate filtering, count ranges, per-request match groups
//! - `search`: alternatives in priority order, optional bounded backtracking
//! - `constraint`: claim-wide match constraints
//! - `config_merge`: configuration in specificity order
//! - `claim`: the orchestrator with stage/commit/rollback and race retries
//!
//! ```
//! use std::sync::Arc;
//! use dra_allocator::{ClaimResolver, ClassCatalog};
//! use dra_api::{Claim, Device};
//! use dra_pool::MemoryDevicePool;
//!
//! dra_allocator::init_tracing(dra_allocator::LogFormat::Text, tracing::Level::INFO);
//!
//! let pool = Arc::new(MemoryDevicePool::with_devices([Device::new("gpu.example.com", "gpu-0")]));
//! let resolver = ClaimResolver::new(pool, ClassCatalog::new());
//! let allocation = resolver.resolve(&Claim::new("my-claim")).unwrap();
//! assert_eq!(allocation.result.results[0].devices.len(), 1);
//! ```

pub mod catalog;
pub mod claim;
pub mod config;
pub mod config_merge;
pub mod constraint;
pub mod error;
pub mod metrics;
pub mod obs;
pub mod request;
pub mod search;
pub mod telemetry;
pub mod validate;

pub use catalog::ClassCatalog;
pub use claim::{Allocation, ClaimResolver};
pub use config::{AlternativePolicy, MissingAttributePolicy, ResolverConfig, SelectionOrder};
pub use config_merge::merge_config;
pub use constraint::{check_constraints, ConstraintViolation};
pub use error::{AllocResult, AllocationError, FailureClass};
pub use metrics::{Metrics, METRICS};
pub use obs::{
    emit_claim_allocated, emit_claim_deallocated, emit_claim_failed, emit_constraint_violated,
    emit_reservation_race_lost, emit_request_resolved, emit_request_unsatisfied, emit_resolution_started,
    ResolutionSpan,
};
pub use telemetry::{init_tracing, LogFormat};
pub use validate::{prepare_claim, PreparedClaim};
