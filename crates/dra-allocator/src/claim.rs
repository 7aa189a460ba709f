//! Claim resolver.
//!
//! Orchestrates one resolution: validate and prepare the claim, search a
//! pool snapshot for an assignment, stage the chosen devices with one atomic
//! `try_reserve`, commit. Losing a race to a concurrent resolution releases
//! everything staged and retries against a fresh snapshot, up to
//! `max_retries` times. No failure leaves a partial allocation behind.

use std::sync::Arc;

use tracing::warn;

use dra_api::{
    AllocatedDevice, AllocationResult, Claim, DeviceClass, DeviceId, NodeSelector, RequestAllocationResult,
    ValidationErrors,
};
use dra_pool::{DevicePool, PoolError, ReservationId, ReservationMode};
use dra_selector::SelectorCache;

use crate::catalog::ClassCatalog;
use crate::config::ResolverConfig;
use crate::config_merge::merge_config;
use crate::error::{AllocResult, AllocationError};
use crate::metrics::METRICS;
use crate::obs::{self, ResolutionSpan};
use crate::request::order_candidates;
use crate::search::{Choice, Search, SearchFailure};
use crate::validate::{prepare_claim, PreparedClaim};

/// A committed allocation and the reservation owner holding its devices.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub owner: ReservationId,
    pub result: AllocationResult,
}

impl Allocation {
    /// Devices held in the pool, without admin-access results.
    pub fn reserved_devices(&self) -> Vec<&DeviceId> {
        reserved_ids(&self.result)
    }
}

fn reserved_ids(result: &AllocationResult) -> Vec<&DeviceId> {
    let mut ids: Vec<&DeviceId> = Vec::new();
    for request in result.results.iter().filter(|r| !r.admin_access) {
        for id in request.device_ids() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

enum AttemptError {
    /// Lost to a concurrent resolution; worth another attempt.
    Race(PoolError),
    Fatal(AllocationError),
}

impl From<PoolError> for AttemptError {
    fn from(e: PoolError) -> Self {
        if e.is_race() {
            AttemptError::Race(e)
        } else {
            AttemptError::Fatal(AllocationError::Pool(e))
        }
    }
}

/// Resolves claims against a shared device pool.
pub struct ClaimResolver {
    pool: Arc<dyn DevicePool>,
    catalog: Arc<ClassCatalog>,
    selectors: Option<Arc<SelectorCache>>,
    config: ResolverConfig,
}

impl ClaimResolver {
    /// Resolver using the process-wide selector cache and default config.
    pub fn new(pool: Arc<dyn DevicePool>, catalog: impl Into<Arc<ClassCatalog>>) -> Self {
        Self {
            pool,
            catalog: catalog.into(),
            selectors: None,
            config: ResolverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a private selector cache instead of the process-wide one.
    pub fn with_selector_cache(mut self, cache: Arc<SelectorCache>) -> Self {
        self.selectors = Some(cache);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    pub fn pool(&self) -> &Arc<dyn DevicePool> {
        &self.pool
    }

    fn selectors(&self) -> &SelectorCache {
        match &self.selectors {
            Some(cache) => cache.as_ref(),
            None => SelectorCache::global(),
        }
    }

    /// Every structural error, unknown class reference and selector compile
    /// error in `claim`. Does not touch the pool.
    pub fn validate(&self, claim: &Claim) -> ValidationErrors {
        match prepare_claim(claim, &self.catalog, self.selectors()) {
            Ok(_) => ValidationErrors::new(),
            Err(errs) => errs,
        }
    }

    /// Allocate devices for `claim`, all or nothing.
    pub fn resolve(&self, claim: &Claim) -> AllocResult<Allocation> {
        let outcome = self.resolve_inner(claim);
        if let Err(e) = &outcome {
            METRICS.inc_claims_failed();
            obs::emit_claim_failed(&claim.name, e.classify(), e);
        }
        outcome
    }

    /// Release every device held by `allocation`. Returns the number of
    /// reservations dropped.
    pub fn deallocate(&self, allocation: &Allocation) -> AllocResult<usize> {
        let released = self.pool.release(&allocation.owner)?;
        obs::emit_claim_deallocated(&allocation.owner.to_string(), released);
        Ok(released)
    }

    fn resolve_inner(&self, claim: &Claim) -> AllocResult<Allocation> {
        let prepared = prepare_claim(claim, &self.catalog, self.selectors())?;
        if let Some((class, controller)) = prepared.external_controller() {
            return Err(AllocationError::Unsupported {
                class: class.to_string(),
                controller: controller.to_string(),
            });
        }

        let mode = if claim.shareable {
            ReservationMode::Shared
        } else {
            ReservationMode::Exclusive
        };
        let max_attempts = self.config.max_attempts();
        for attempt in 1..=max_attempts {
            let _span = ResolutionSpan::enter(&claim.name, attempt);
            let owner = ReservationId::new();
            match self.attempt(claim, &prepared, &owner, mode) {
                Ok((result, held)) => {
                    METRICS.inc_claims_allocated();
                    METRICS.add_devices_reserved(held as u64);
                    obs::emit_claim_allocated(&claim.name, &owner.to_string(), held, attempt);
                    return Ok(Allocation { owner, result });
                }
                Err(AttemptError::Race(e)) => {
                    self.rollback(&owner);
                    METRICS.inc_race_retries();
                    obs::emit_reservation_race_lost(&claim.name, attempt, &e);
                }
                Err(AttemptError::Fatal(e)) => {
                    self.rollback(&owner);
                    return Err(e);
                }
            }
        }
        Err(AllocationError::RaceLost {
            attempts: max_attempts,
        })
    }

    fn rollback(&self, owner: &ReservationId) {
        if let Err(e) = self.pool.release(owner) {
            warn!(owner = %owner, error = %e, "failed to release staged reservations");
        }
    }

    /// One search-stage-commit pass. Returns the result and the number of
    /// devices committed.
    fn attempt(
        &self,
        claim: &Claim,
        prepared: &PreparedClaim,
        owner: &ReservationId,
        mode: ReservationMode,
    ) -> Result<(AllocationResult, usize), AttemptError> {
        let snapshot = self.pool.snapshot()?;
        obs::emit_resolution_started(&claim.name, prepared.requests.len(), snapshot.generation);

        let candidates = order_candidates(&snapshot, self.config.selection_order);
        let choices = Search::new(
            &prepared.requests,
            &candidates,
            &snapshot,
            owner,
            mode,
            &prepared.constraints,
            &self.config,
        )
        .run()
        .map_err(|failure| {
            match &failure {
                SearchFailure::NoMatch { request, reasons } => {
                    obs::emit_request_unsatisfied(&claim.name, request, reasons)
                }
                SearchFailure::Constraint(v) => obs::emit_constraint_violated(&claim.name, &v.attribute, &v.values),
            }
            AttemptError::Fatal(failure.into())
        })?;

        let result = self.build_result(claim, prepared, &choices);
        let staged: Vec<DeviceId> = reserved_ids(&result).into_iter().cloned().collect();
        if !staged.is_empty() {
            self.pool.try_reserve(owner, mode, &staged)?;
        }
        let held = self.pool.commit(owner)?;
        Ok((result, held))
    }

    fn build_result(&self, claim: &Claim, prepared: &PreparedClaim, choices: &[Choice<'_>]) -> AllocationResult {
        let claim_class = prepared.claim_class.as_deref();
        let mut classes: Vec<&DeviceClass> = claim_class.into_iter().collect();
        let mut results = Vec::with_capacity(choices.len());

        for (request, choice) in prepared.requests.iter().zip(choices) {
            let alt = &request.alternatives[choice.alternative];
            if let Some(class) = alt.class.as_deref() {
                if !classes.iter().any(|c| c.name == class.name) {
                    classes.push(class);
                }
            }
            obs::emit_request_resolved(&claim.name, &request.label(), choice.alternative, choice.devices.len());
            results.push(RequestAllocationResult {
                request_index: request.index,
                request_name: request.name.clone(),
                alternative: request.is_one_of.then_some(choice.alternative),
                admin_access: alt.detail.is_admin(),
                devices: choice
                    .devices
                    .iter()
                    .map(|d| AllocatedDevice::Device(d.id()))
                    .collect(),
                config: merge_config(&claim.config, claim_class, &alt.detail, alt.class.as_deref()),
            });
        }

        AllocationResult {
            results,
            available_on_nodes: NodeSelector::intersect_all(classes.iter().filter_map(|c| c.suitable_nodes.as_ref())),
            shareable: claim.shareable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dra_api::{CountRange, Device, Request, RequestDetail};
    use dra_pool::MemoryDevicePool;

    use crate::error::FailureClass;

    fn resolver(devices: Vec<Device>) -> (Arc<MemoryDevicePool>, ClaimResolver) {
        let pool = Arc::new(MemoryDevicePool::with_devices(devices));
        let resolver = ClaimResolver::new(pool.clone(), ClassCatalog::new())
            .with_selector_cache(Arc::new(SelectorCache::new()));
        (pool, resolver)
    }

    fn gpus(n: usize) -> Vec<Device> {
        (0..n)
            .map(|i| Device::new("gpu.example.com", format!("gpu-{i}")))
            .collect()
    }

    #[test]
    fn test_default_request_takes_one_device() {
        let (pool, resolver) = resolver(gpus(2));
        let allocation = resolver.resolve(&Claim::new("c")).unwrap();
        assert_eq!(allocation.result.results.len(), 1);
        assert_eq!(allocation.reserved_devices().len(), 1);
        assert_eq!(pool.reservations_of(&allocation.owner).unwrap().len(), 1);
    }

    #[test]
    fn test_failure_leaves_no_reservation() {
        let (pool, resolver) = resolver(gpus(2));
        let claim = Claim::new("c")
            .with_request(Request::single(RequestDetail::new().with_count(CountRange::exactly(1))))
            .with_request(Request::single(RequestDetail::new().with_count(CountRange::exactly(2))));
        let err = resolver.resolve(&claim).unwrap_err();
        assert_eq!(err.classify(), FailureClass::NoMatch);
        assert!(pool.snapshot().unwrap().reservations.is_empty());
    }

    #[test]
    fn test_exclusive_claims_do_not_overlap() {
        let (_pool, resolver) = resolver(gpus(1));
        resolver.resolve(&Claim::new("first")).unwrap();
        let err = resolver.resolve(&Claim::new("second")).unwrap_err();
        assert_eq!(err.classify(), FailureClass::NoMatch);
    }

    #[test]
    fn test_deallocate_frees_devices() {
        let (_pool, resolver) = resolver(gpus(1));
        let allocation = resolver.resolve(&Claim::new("first")).unwrap();
        assert_eq!(resolver.deallocate(&allocation).unwrap(), 1);
        assert!(resolver.resolve(&Claim::new("second")).is_ok());
    }

    #[test]
    fn test_external_controller_is_unsupported() {
        let pool = Arc::new(MemoryDevicePool::with_devices(gpus(1)));
        let catalog = ClassCatalog::new().with_class(DeviceClass::new("ext").with_controller("ctrl.example.com"));
        let resolver = ClaimResolver::new(pool, catalog);
        let err = resolver.resolve(&Claim::new("c").with_class("ext")).unwrap_err();
        assert_eq!(err.classify(), FailureClass::Unsupported);
        assert!(resolver.validate(&Claim::new("c").with_class("ext")).is_empty());
    }
}
