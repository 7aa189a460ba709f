use std::collections::HashSet;
use std::sync::Arc;

use dra_allocator::{AllocationError, ClaimResolver, ClassCatalog, FailureClass};
use dra_api::{
    decode_documents, AllocatedDevice, Claim, ConfigScope, ConfigSource, Configuration, Constraint, CountRange,
    DecodedObject, Device, DeviceClass, DeviceId, KindRegistry, Request, RequestDetail, Requirement,
};
use dra_pool::{DevicePool, MemoryDevicePool};
use dra_selector::SelectorCache;
use serde_json::json;

const FOOZER: &str = include_str!("testdata/foozer.yaml");
const TWO_GPUS: &str = include_str!("testdata/two-gpus.yaml");

const MODEL: &str = "model.example.com";

/// Catalog, pool and the first claim of a fixture.
fn load(text: &str) -> (ClassCatalog, Arc<MemoryDevicePool>, Claim) {
    let objects: Vec<DecodedObject> = decode_documents(&KindRegistry::standard(), text)
        .unwrap()
        .into_iter()
        .map(|d| d.object)
        .collect();
    let catalog = ClassCatalog::from_objects(&objects).unwrap();
    let devices: Vec<Device> = objects
        .iter()
        .filter_map(|o| match o {
            DecodedObject::ResourceSlice(devices) => Some(devices.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    let claim = objects
        .iter()
        .find_map(|o| match o {
            DecodedObject::Claim(claim) => Some(claim.clone()),
            _ => None,
        })
        .unwrap();
    (catalog, Arc::new(MemoryDevicePool::with_devices(devices)), claim)
}

fn resolver(pool: Arc<MemoryDevicePool>, catalog: ClassCatalog) -> ClaimResolver {
    ClaimResolver::new(pool, catalog).with_selector_cache(Arc::new(SelectorCache::new()))
}

fn gpu(name: &str, model: &str) -> Device {
    Device::new("gpu.example.com", name)
        .with_type("gpu")
        .with_attribute(MODEL, model)
}

fn device_names(devices: &[AllocatedDevice]) -> Vec<String> {
    devices.iter().map(|d| d.id().name.clone()).collect()
}

// ---- Decoded fixtures ----

#[test]
fn class_restricted_claim_gets_the_only_matching_device() {
    let (catalog, pool, claim) = load(FOOZER);
    let resolver = resolver(pool.clone(), catalog);

    let allocation = resolver.resolve(&claim).unwrap();
    let result = &allocation.result;
    assert_eq!(result.results.len(), 1);

    let gpu = &result.results[0];
    assert_eq!(gpu.request_name.as_deref(), Some("gpu"));
    assert_eq!(gpu.alternative, None);
    assert_eq!(device_names(&gpu.devices), vec!["gpu-0"]);
    assert_eq!(gpu.devices[0].id().driver_name, "example.com-foozer");

    assert_eq!(gpu.config.len(), 1);
    assert_eq!(gpu.config[0].source, ConfigSource::User);
    assert_eq!(gpu.config[0].scope, ConfigScope::Claim);
    assert_eq!(gpu.config[0].parameters, json!({ "sharing": "time-slicing" }));

    assert!(result.available_on_nodes.is_some());
    assert!(!result.shareable);
    assert_eq!(
        pool.reservations_of(&allocation.owner).unwrap(),
        vec![DeviceId::new("example.com-foozer", "gpu-0")]
    );
}

#[test]
fn multi_request_claim_with_admin_alternative() {
    let (catalog, pool, claim) = load(TWO_GPUS);
    let resolver = resolver(pool, catalog);

    let allocation = resolver.resolve(&claim).unwrap();
    let gpus = allocation.result.result_for("gpus").unwrap();
    assert_eq!(device_names(&gpus.devices), vec!["gpu-0", "gpu-1"]);
    let scopes: Vec<ConfigScope> = gpus.config.iter().map(|c| c.scope).collect();
    assert_eq!(scopes, vec![ConfigScope::Claim, ConfigScope::ClaimClass]);

    let monitor = allocation.result.result_for("monitor").unwrap();
    assert_eq!(monitor.alternative, Some(0));
    assert!(monitor.admin_access);
    assert_eq!(device_names(&monitor.devices), vec!["gpu-0"]);
    assert_eq!(
        monitor.config.iter().map(|c| c.scope).collect::<Vec<_>>(),
        vec![ConfigScope::Claim, ConfigScope::ClaimClass, ConfigScope::RequestClass]
    );

    // Only the non-admin request holds devices.
    assert_eq!(allocation.reserved_devices().len(), 2);

    let data = allocation.result.driver_data();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].driver_name, "example.com-foozer");
}

// ---- Count ranges ----

#[test]
fn count_range_picks_between_min_and_max() {
    let pool = Arc::new(MemoryDevicePool::with_devices(
        (0..5).map(|i| gpu(&format!("gpu-{i}"), "f100")),
    ));
    let resolver = resolver(pool, ClassCatalog::new());
    let claim = Claim::new("range").with_request(
        Request::single(RequestDetail::new().with_count(CountRange::between(2, 4).unwrap())).with_name("gpus"),
    );

    let allocation = resolver.resolve(&claim).unwrap();
    let n = allocation.result.results[0].devices.len();
    assert!((2..=4).contains(&n), "picked {n} devices");
}

#[test]
fn count_below_minimum_is_no_match() {
    let pool = Arc::new(MemoryDevicePool::with_devices([gpu("gpu-0", "f100")]));
    let resolver = resolver(pool.clone(), ClassCatalog::new());
    let claim = Claim::new("range").with_request(
        Request::single(RequestDetail::new().with_count(CountRange::between(2, 4).unwrap())).with_name("gpus"),
    );

    let err = resolver.resolve(&claim).unwrap_err();
    assert_eq!(err.classify(), FailureClass::NoMatch);
    assert!(!err.is_retryable());
    match err {
        AllocationError::NoMatch { request, reasons } => {
            assert_eq!(request, "gpus");
            assert_eq!(reasons.len(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(pool.snapshot().unwrap().reservations.is_empty());
}

#[test]
fn zero_maximum_allocates_nothing() {
    let pool = Arc::new(MemoryDevicePool::with_devices([gpu("gpu-0", "f100")]));
    let resolver = resolver(pool, ClassCatalog::new());
    let claim = Claim::new("none")
        .with_request(Request::single(RequestDetail::new().with_count(CountRange::new(None, Some(0)).unwrap())));
    let allocation = resolver.resolve(&claim).unwrap();
    assert!(allocation.result.results[0].devices.is_empty());
    assert!(allocation.reserved_devices().is_empty());
}

// ---- Constraints ----

#[test]
fn match_constraint_fails_whole_claim() {
    let pool = Arc::new(MemoryDevicePool::with_devices([
        gpu("gpu-0", "f100"),
        gpu("gpu-1", "f200"),
        gpu("gpu-2", "f300"),
    ]));
    let resolver = resolver(pool.clone(), ClassCatalog::new());
    let claim = Claim::new("same-model")
        .with_constraint(Constraint::match_attribute(MODEL).unwrap())
        .with_request(Request::single(
            RequestDetail::new()
                .with_count(CountRange::exactly(3))
                .with_requirement(Requirement::selector("device.type == 'gpu'")),
        ));

    let err = resolver.resolve(&claim).unwrap_err();
    assert_eq!(err.classify(), FailureClass::ConstraintViolation);
    match err {
        AllocationError::ConstraintViolation { attribute, values } => {
            assert_eq!(attribute, MODEL);
            assert_eq!(values.len(), 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(pool.snapshot().unwrap().reservations.is_empty());
}

#[test]
fn class_constraints_apply_to_claims_of_the_class() {
    let pool = Arc::new(MemoryDevicePool::with_devices([gpu("gpu-0", "f100"), gpu("gpu-1", "f200")]));
    let catalog =
        ClassCatalog::new().with_class(DeviceClass::new("gpu").with_constraint(Constraint::match_attribute(MODEL).unwrap()));
    let resolver = resolver(pool, catalog);
    let claim = Claim::new("c")
        .with_class("gpu")
        .with_request(Request::single(RequestDetail::new().with_count(CountRange::exactly(2))));
    assert_eq!(resolver.resolve(&claim).unwrap_err().classify(), FailureClass::ConstraintViolation);
}

// ---- Lifecycle ----

#[test]
fn resolution_is_repeatable_after_deallocation() {
    let pool = Arc::new(MemoryDevicePool::with_devices((0..4).map(|i| gpu(&format!("gpu-{i}"), "f100"))));
    let resolver = resolver(pool.clone(), ClassCatalog::new());
    let claim = Claim::new("pair")
        .with_config(Configuration::vendor("gpu.example.com", json!({ "a": 1 })))
        .with_request(Request::single(RequestDetail::new().with_count(CountRange::exactly(2))));

    let first = resolver.resolve(&claim).unwrap();
    assert_eq!(resolver.deallocate(&first).unwrap(), 2);
    assert!(pool.snapshot().unwrap().reservations.is_empty());

    let second = resolver.resolve(&claim).unwrap();
    assert_ne!(first.owner, second.owner);
    assert_eq!(first.result, second.result);
}

#[test]
fn exclusive_devices_are_not_handed_out_twice() {
    let pool = Arc::new(MemoryDevicePool::with_devices([gpu("gpu-0", "f100"), gpu("gpu-1", "f100")]));
    let resolver = resolver(pool, ClassCatalog::new());

    let a = resolver.resolve(&Claim::new("a")).unwrap();
    let b = resolver.resolve(&Claim::new("b")).unwrap();
    let held: HashSet<&DeviceId> = a.reserved_devices().into_iter().chain(b.reserved_devices()).collect();
    assert_eq!(held.len(), 2);
    assert_eq!(resolver.resolve(&Claim::new("c")).unwrap_err().classify(), FailureClass::NoMatch);
}

#[test]
fn shareable_claims_share_and_block_exclusive_ones() {
    let pool = Arc::new(MemoryDevicePool::with_devices([gpu("gpu-0", "f100")]));
    let resolver = resolver(pool, ClassCatalog::new());

    let a = resolver.resolve(&Claim::new("a").shareable(true)).unwrap();
    let b = resolver.resolve(&Claim::new("b").shareable(true)).unwrap();
    assert!(a.result.shareable);
    assert_eq!(a.reserved_devices(), b.reserved_devices());

    assert_eq!(resolver.resolve(&Claim::new("c")).unwrap_err().classify(), FailureClass::NoMatch);
}

#[test]
fn admin_access_ignores_exclusive_holders() {
    let pool = Arc::new(MemoryDevicePool::with_devices([gpu("gpu-0", "f100")]));
    let resolver = resolver(pool.clone(), ClassCatalog::new());
    resolver.resolve(&Claim::new("owner")).unwrap();

    let monitor = Claim::new("monitor").with_request(Request::single(RequestDetail::new().with_admin_access(true)));
    let allocation = resolver.resolve(&monitor).unwrap();
    assert!(allocation.result.results[0].admin_access);
    assert_eq!(device_names(&allocation.result.results[0].devices), vec!["gpu-0"]);
    assert!(pool.reservations_of(&allocation.owner).unwrap().is_empty());
}

// ---- Validation ----

#[test]
fn invalid_claims_are_reported_with_paths() {
    let pool = Arc::new(MemoryDevicePool::with_devices([gpu("gpu-0", "f100")]));
    let resolver = resolver(pool, ClassCatalog::new());
    let claim = Claim::new("bad")
        .with_request(Request::single(RequestDetail::new().with_requirement(Requirement::selector("device.type =="))))
        .with_request(Request::single(RequestDetail::new().with_class("missing")));

    let errs = resolver.validate(&claim);
    assert!(errs.has_path("spec.requests[0].requirements[0].device.selector"));
    assert!(errs.has_path("spec.requests[1].resourceClassName"));

    let err = resolver.resolve(&claim).unwrap_err();
    assert_eq!(err.classify(), FailureClass::Validation);
}

#[test]
fn pathological_selectors_are_validation_errors() {
    let pool = Arc::new(MemoryDevicePool::with_devices([gpu("gpu-0", "f100")]));
    let resolver = resolver(pool, ClassCatalog::new());
    for selector in [
        format!("true{}", " && true".repeat(1000)),
        format!("{}true", "!".repeat(20_000)),
    ] {
        let claim = Claim::new("deep")
            .with_request(Request::single(RequestDetail::new().with_requirement(Requirement::selector(selector))));
        let errs = resolver.validate(&claim);
        assert!(errs.has_path("spec.requests[0].requirements[0].device.selector"));
        assert_eq!(resolver.resolve(&claim).unwrap_err().classify(), FailureClass::Validation);
    }
}

#[test]
fn selector_type_errors_exclude_devices_instead_of_failing() {
    let pool = Arc::new(MemoryDevicePool::with_devices([
        Device::new("gpu.example.com", "gpu-0").with_attribute(MODEL, 7i64),
        gpu("gpu-1", "f100"),
    ]));
    let resolver = resolver(pool, ClassCatalog::new());
    let claim = Claim::new("c").with_request(Request::single(
        RequestDetail::new().with_requirement(Requirement::selector(format!("device.attributes['{MODEL}'] == 'f100'"))),
    ));
    let allocation = resolver.resolve(&claim).unwrap();
    assert_eq!(device_names(&allocation.result.results[0].devices), vec!["gpu-1"]);
}
