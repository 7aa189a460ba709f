//! Request resolver.
//!
//! Picks devices for one alternative of one request from a pool snapshot.
//! A candidate must be free for this claim, pass every driver prefilter and
//! selector of the effective requirement set, and agree with the other
//! picks on the request's match attributes.

use std::collections::HashSet;
use std::sync::Arc;

use dra_api::{AttributeValue, Device, DeviceClass, DeviceId, RequestDetail};
use dra_pool::{PoolSnapshot, ReservationId, ReservationMode};
use dra_selector::Program;

use crate::config::SelectionOrder;
use crate::constraint::typed_values;

/// One compiled requirement: driver prefilter plus selector.
#[derive(Debug, Clone)]
pub struct Filter {
    pub driver_name: Option<String>,
    pub program: Arc<Program>,
}

impl Filter {
    pub fn accepts(&self, device: &Device) -> bool {
        if let Some(driver) = &self.driver_name {
            if *driver != device.driver_name {
                return false;
            }
        }
        self.program.matches(device)
    }
}

/// A request alternative ready for selection.
#[derive(Debug, Clone)]
pub struct PreparedDetail {
    /// Position in the request's alternative list.
    pub alternative: usize,
    pub detail: RequestDetail,
    /// Class referenced by the detail itself.
    pub class: Option<Arc<DeviceClass>>,
    /// Claim-class, request-class and own requirements, in that order.
    pub filters: Vec<Filter>,
}

impl PreparedDetail {
    pub fn accepts(&self, device: &Device) -> bool {
        self.filters.iter().all(|f| f.accepts(device))
    }
}

#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// Position in the effective request list.
    pub index: usize,
    pub name: Option<String>,
    pub is_one_of: bool,
    pub alternatives: Vec<PreparedDetail>,
}

impl PreparedRequest {
    /// Name for messages: the request name, or its position.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("requests[{}]", self.index),
        }
    }
}

/// Snapshot devices in the configured selection order.
pub fn order_candidates(snapshot: &PoolSnapshot, order: SelectionOrder) -> Vec<&Device> {
    let mut candidates: Vec<&Device> = snapshot.devices().iter().collect();
    if order == SelectionOrder::DeviceName {
        candidates.sort_by(|a, b| (&a.driver_name, &a.name).cmp(&(&b.driver_name, &b.name)));
    }
    candidates
}

/// Availability of pool devices to one resolution.
pub struct Availability<'a> {
    pub snapshot: &'a PoolSnapshot,
    pub owner: &'a ReservationId,
    pub mode: ReservationMode,
    /// Devices already picked by non-admin requests of the same claim.
    pub taken: &'a HashSet<DeviceId>,
}

impl Availability<'_> {
    fn is_free(&self, device: &Device) -> bool {
        let id = device.id();
        !self.taken.contains(&id) && self.snapshot.is_available(&id, self.mode, self.owner)
    }
}

/// Select devices for one alternative.
///
/// Admin requests ignore reservations. With match attributes, candidates are
/// grouped by their typed values and the first group large enough wins. The
/// error is a human-readable reason.
pub fn select_devices<'d>(
    prepared: &PreparedDetail,
    candidates: &[&'d Device],
    availability: &Availability<'_>,
) -> Result<Vec<&'d Device>, String> {
    let admin = prepared.detail.is_admin();
    let matching: Vec<&'d Device> = candidates
        .iter()
        .copied()
        .filter(|d| admin || availability.is_free(d))
        .filter(|d| prepared.accepts(d))
        .collect();

    let (min, max) = prepared.detail.count_bounds();
    let take = |devices: Vec<&'d Device>| -> Vec<&'d Device> {
        match max {
            Some(max) => devices.into_iter().take(max).collect(),
            None => devices,
        }
    };

    if matching.len() < min {
        return Err(format!(
            "{} matching device(s) available, at least {} required",
            matching.len(),
            min
        ));
    }
    if prepared.detail.matches.is_empty() {
        return Ok(take(matching));
    }

    let columns: Vec<Vec<Option<AttributeValue>>> = prepared
        .detail
        .matches
        .iter()
        .map(|m| typed_values(&matching, m.attribute_name().as_str()))
        .collect();

    let mut groups: Vec<(Vec<Option<AttributeValue>>, Vec<&'d Device>)> = Vec::new();
    for (i, &device) in matching.iter().enumerate() {
        let key: Vec<Option<AttributeValue>> = columns.iter().map(|c| c[i].clone()).collect();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(device),
            None => groups.push((key, vec![device])),
        }
    }

    let largest = groups.iter().map(|(_, members)| members.len()).max().unwrap_or(0);
    match groups.into_iter().find(|(_, members)| members.len() >= min) {
        Some((_, members)) => Ok(take(members)),
        None => Err(format!(
            "{} matching device(s) available, but at most {} agree on the match attributes, at least {} required",
            matching.len(),
            largest,
            min
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dra_api::{CountRange, MatchModel};
    use dra_pool::{DevicePool, MemoryDevicePool};

    fn gpu(name: &str, model: &str) -> Device {
        Device::new("gpu.example.com", name)
            .with_type("gpu")
            .with_attribute("model.example.com", model)
    }

    fn prepared(detail: RequestDetail, selectors: &[&str]) -> PreparedDetail {
        PreparedDetail {
            alternative: 0,
            detail,
            class: None,
            filters: selectors
                .iter()
                .map(|s| Filter {
                    driver_name: None,
                    program: Arc::new(Program::compile(s).unwrap()),
                })
                .collect(),
        }
    }

    fn snapshot(devices: Vec<Device>) -> PoolSnapshot {
        PoolSnapshot {
            devices,
            ..Default::default()
        }
    }

    fn names(devices: &[&Device]) -> Vec<String> {
        devices.iter().map(|d| d.name.clone()).collect()
    }

    #[test]
    fn test_count_range() {
        let snap = snapshot((0..5).map(|i| gpu(&format!("g{i}"), "f100")).collect());
        let owner = ReservationId::new();
        let taken = HashSet::new();
        let availability = Availability {
            snapshot: &snap,
            owner: &owner,
            mode: ReservationMode::Exclusive,
            taken: &taken,
        };
        let candidates = order_candidates(&snap, SelectionOrder::PoolOrder);

        let p = prepared(RequestDetail::new().with_count(CountRange::between(2, 4).unwrap()), &[""]);
        let picked = select_devices(&p, &candidates, &availability).unwrap();
        assert_eq!(names(&picked), vec!["g0", "g1", "g2", "g3"]);

        let p = prepared(RequestDetail::new(), &["device.type == 'gpu'"]);
        assert_eq!(select_devices(&p, &candidates, &availability).unwrap().len(), 1);

        let p = prepared(RequestDetail::new().with_count(CountRange::at_least(6)), &[""]);
        let reason = select_devices(&p, &candidates, &availability).unwrap_err();
        assert!(reason.contains("at least 6"));
    }

    #[test]
    fn test_reserved_and_taken_devices_are_skipped() {
        let pool = MemoryDevicePool::with_devices([gpu("a", "f100"), gpu("b", "f100"), gpu("c", "f100")]);
        pool.try_reserve(
            &ReservationId::new(),
            ReservationMode::Exclusive,
            &[DeviceId::new("gpu.example.com", "a")],
        )
        .unwrap();
        let snap = pool.snapshot().unwrap();
        let owner = ReservationId::new();
        let taken: HashSet<DeviceId> = [DeviceId::new("gpu.example.com", "b")].into_iter().collect();
        let availability = Availability {
            snapshot: &snap,
            owner: &owner,
            mode: ReservationMode::Exclusive,
            taken: &taken,
        };
        let candidates = order_candidates(&snap, SelectionOrder::PoolOrder);

        let p = prepared(RequestDetail::new().with_count(CountRange::at_least(1)), &[""]);
        assert_eq!(names(&select_devices(&p, &candidates, &availability).unwrap()), vec!["c"]);

        let admin = prepared(
            RequestDetail::new()
                .with_admin_access(true)
                .with_count(CountRange::at_least(1)),
            &[""],
        );
        assert_eq!(select_devices(&admin, &candidates, &availability).unwrap().len(), 3);
    }

    #[test]
    fn test_match_groups() {
        let snap = snapshot(vec![
            gpu("a", "f100"),
            gpu("b", "f200"),
            gpu("c", "f200"),
            gpu("d", "f100"),
            gpu("e", "f200"),
        ]);
        let owner = ReservationId::new();
        let taken = HashSet::new();
        let availability = Availability {
            snapshot: &snap,
            owner: &owner,
            mode: ReservationMode::Exclusive,
            taken: &taken,
        };
        let candidates = order_candidates(&snap, SelectionOrder::PoolOrder);
        let detail = |n| {
            RequestDetail::new()
                .with_match(MatchModel::attribute("model.example.com").unwrap())
                .with_count(CountRange::exactly(n))
        };

        let picked = select_devices(&prepared(detail(2), &[""]), &candidates, &availability).unwrap();
        assert_eq!(names(&picked), vec!["a", "d"]);

        let picked = select_devices(&prepared(detail(3), &[""]), &candidates, &availability).unwrap();
        assert_eq!(names(&picked), vec!["b", "c", "e"]);

        let reason = select_devices(&prepared(detail(4), &[""]), &candidates, &availability).unwrap_err();
        assert!(reason.contains("at most 3 agree"));
    }

    #[test]
    fn test_match_groups_keep_differently_typed_values_apart() {
        let snap = snapshot(vec![
            Device::new("gpu.example.com", "a").with_attribute("model.example.com", 0i64),
            gpu("b", ""),
            Device::new("gpu.example.com", "c"),
        ]);
        let owner = ReservationId::new();
        let taken = HashSet::new();
        let availability = Availability {
            snapshot: &snap,
            owner: &owner,
            mode: ReservationMode::Exclusive,
            taken: &taken,
        };
        let candidates = order_candidates(&snap, SelectionOrder::PoolOrder);
        let detail = |n| {
            RequestDetail::new()
                .with_match(MatchModel::attribute("model.example.com").unwrap())
                .with_count(CountRange::exactly(n))
        };

        // "c" lacks the attribute and reads as the int zero of "a".
        let picked = select_devices(&prepared(detail(2), &[""]), &candidates, &availability).unwrap();
        assert_eq!(names(&picked), vec!["a", "c"]);

        let reason = select_devices(&prepared(detail(3), &[""]), &candidates, &availability).unwrap_err();
        assert!(reason.contains("at most 2 agree"));
    }

    #[test]
    fn test_driver_prefilter_and_order() {
        let snap = snapshot(vec![
            Device::new("nic.example.com", "z"),
            Device::new("gpu.example.com", "y"),
            Device::new("gpu.example.com", "x"),
        ]);
        let by_name = order_candidates(&snap, SelectionOrder::DeviceName);
        assert_eq!(names(&by_name), vec!["x", "y", "z"]);

        let filter = Filter {
            driver_name: Some("gpu.example.com".to_string()),
            program: Arc::new(Program::compile("").unwrap()),
        };
        assert!(filter.accepts(&snap.devices[1]));
        assert!(!filter.accepts(&snap.devices[0]));
    }
}
