//! Structured events for the claim resolution lifecycle.
//!
//! - `ResolutionSpan`: RAII guard scoping one resolution attempt
//! - `emit_*`: one event per lifecycle step, tagged with an `event` field
//!
//! Successful steps log at `info!`, failures and race losses at `warn!`.

use tracing::{debug, info, warn};

use crate::error::FailureClass;

/// Enters a span tagged with the claim name and attempt number; all events
/// of the attempt nest under it.
pub struct ResolutionSpan {
    _span: tracing::span::EnteredSpan,
}

impl ResolutionSpan {
    pub fn enter(claim: &str, attempt: u32) -> Self {
        let span = tracing::info_span!("dra.resolve", claim = %claim, attempt = attempt);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_resolution_started(claim: &str, requests: usize, generation: u64) {
    info!(
        event = "resolution.started",
        claim = %claim,
        requests = requests,
        pool_generation = generation,
    );
}

/// A request was satisfied by one of its alternatives.
pub fn emit_request_resolved(claim: &str, request: &str, alternative: usize, devices: usize) {
    debug!(
        event = "request.resolved",
        claim = %claim,
        request = %request,
        alternative = alternative,
        devices = devices,
    );
}

/// No alternative of a request could be satisfied.
pub fn emit_request_unsatisfied(claim: &str, request: &str, reasons: &[String]) {
    warn!(
        event = "request.unsatisfied",
        claim = %claim,
        request = %request,
        reasons = %reasons.join("; "),
    );
}

pub fn emit_constraint_violated(claim: &str, attribute: &str, values: &[String]) {
    warn!(
        event = "constraint.violated",
        claim = %claim,
        attribute = %attribute,
        values = %values.join(", "),
    );
}

/// Staging or commit lost to a concurrent resolution.
pub fn emit_reservation_race_lost(claim: &str, attempt: u32, error: &dyn std::fmt::Display) {
    warn!(event = "reservation.race_lost", claim = %claim, attempt = attempt, error = %error);
}

pub fn emit_claim_allocated(claim: &str, owner: &str, devices: usize, attempts: u32) {
    info!(
        event = "claim.allocated",
        claim = %claim,
        owner = %owner,
        devices = devices,
        attempts = attempts,
    );
}

pub fn emit_claim_failed(claim: &str, class: FailureClass, error: &dyn std::fmt::Display) {
    warn!(event = "claim.failed", claim = %claim, class = %class, error = %error);
}

pub fn emit_claim_deallocated(owner: &str, devices: usize) {
    info!(event = "claim.deallocated", owner = %owner, devices = devices);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_span_create() {
        let _span = ResolutionSpan::enter("claim-a", 1);
    }
}
