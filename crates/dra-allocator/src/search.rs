//! Device assignment search over one pool snapshot.
//!
//! Requests are resolved in order; each tries its alternatives in listed
//! order. Claim constraints are checked once every request has devices.
//! When a later request or a constraint fails, the search may return to an
//! earlier request and try its next alternative, at most `backtracks` times.
//! A budget of zero keeps the first satisfiable alternative of each request.

use std::collections::HashSet;

use dra_api::{Constraint, Device, DeviceId};
use dra_pool::{PoolSnapshot, ReservationId, ReservationMode};

use crate::config::{AlternativePolicy, MissingAttributePolicy, ResolverConfig};
use crate::constraint::{check_constraints, ConstraintViolation};
use crate::error::AllocationError;
use crate::request::{select_devices, Availability, PreparedRequest};

/// Devices picked for one request.
#[derive(Debug, Clone)]
pub struct Choice<'d> {
    /// Position of the chosen alternative in the request.
    pub alternative: usize,
    pub devices: Vec<&'d Device>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFailure {
    NoMatch { request: String, reasons: Vec<String> },
    Constraint(ConstraintViolation),
}

impl From<SearchFailure> for AllocationError {
    fn from(failure: SearchFailure) -> Self {
        match failure {
            SearchFailure::NoMatch { request, reasons } => AllocationError::NoMatch { request, reasons },
            SearchFailure::Constraint(v) => AllocationError::ConstraintViolation {
                attribute: v.attribute,
                values: v.values,
            },
        }
    }
}

pub struct Search<'s, 'd> {
    requests: &'s [PreparedRequest],
    candidates: &'s [&'d Device],
    snapshot: &'s PoolSnapshot,
    owner: &'s ReservationId,
    mode: ReservationMode,
    constraints: &'s [Constraint],
    missing: MissingAttributePolicy,
    backtracks_left: usize,
    taken: HashSet<DeviceId>,
    chosen: Vec<Choice<'d>>,
}

impl<'s, 'd> Search<'s, 'd> {
    pub fn new(
        requests: &'s [PreparedRequest],
        candidates: &'s [&'d Device],
        snapshot: &'s PoolSnapshot,
        owner: &'s ReservationId,
        mode: ReservationMode,
        constraints: &'s [Constraint],
        config: &ResolverConfig,
    ) -> Self {
        let backtracks_left = match config.alternative_policy {
            AlternativePolicy::FirstSatisfiable => 0,
            AlternativePolicy::Backtrack => config.max_backtrack_steps,
        };
        Self {
            requests,
            candidates,
            snapshot,
            owner,
            mode,
            constraints,
            missing: config.missing_attribute,
            backtracks_left,
            taken: HashSet::new(),
            chosen: Vec::with_capacity(requests.len()),
        }
    }

    /// One choice per request, in request order. The reported failure is
    /// the first one met.
    pub fn run(mut self) -> Result<Vec<Choice<'d>>, SearchFailure> {
        self.descend(0)?;
        Ok(self.chosen)
    }

    fn descend(&mut self, i: usize) -> Result<(), SearchFailure> {
        let requests = self.requests;
        let Some(request) = requests.get(i) else {
            let devices: Vec<&Device> = self.chosen.iter().flat_map(|c| c.devices.iter().copied()).collect();
            return check_constraints(&devices, self.constraints, self.missing).map_err(SearchFailure::Constraint);
        };

        let mut reasons = Vec::new();
        let mut first_failure = None;
        for (position, alt) in request.alternatives.iter().enumerate() {
            let availability = Availability {
                snapshot: self.snapshot,
                owner: self.owner,
                mode: self.mode,
                taken: &self.taken,
            };
            let devices = match select_devices(alt, self.candidates, &availability) {
                Ok(devices) => devices,
                Err(reason) if request.is_one_of => {
                    reasons.push(format!("oneOf[{}]: {}", alt.alternative, reason));
                    continue;
                }
                Err(reason) => {
                    reasons.push(reason);
                    continue;
                }
            };

            let added: Vec<DeviceId> = if alt.detail.is_admin() {
                Vec::new()
            } else {
                devices.iter().map(|d| d.id()).collect()
            };
            self.taken.extend(added.iter().cloned());
            self.chosen.push(Choice {
                alternative: position,
                devices,
            });

            let failure = match self.descend(i + 1) {
                Ok(()) => return Ok(()),
                Err(failure) => failure,
            };
            self.chosen.pop();
            for id in &added {
                self.taken.remove(id);
            }
            if first_failure.is_none() {
                first_failure = Some(failure);
            }
            if self.backtracks_left == 0 {
                break;
            }
            self.backtracks_left -= 1;
        }

        Err(first_failure.unwrap_or_else(|| SearchFailure::NoMatch {
            request: request.label(),
            reasons,
        }))
    }
}
