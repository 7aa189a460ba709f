//! Claim validation and preparation.
//!
//! Resolves class references against the catalog and compiles every
//! selector that applies to a claim, reporting problems with field paths.
//! A claim that prepares cleanly is ready for resolution: effective request
//! list chosen, requirement sets assembled, constraints gathered.

use std::collections::HashMap;
use std::sync::Arc;

use dra_api::{
    Claim, Constraint, DeviceClass, FieldErrorKind, FieldPath, Request, RequestDetail, Requirement,
    ValidationErrors,
};
use dra_selector::SelectorCache;

use crate::catalog::ClassCatalog;
use crate::metrics::METRICS;
use crate::request::{Filter, PreparedDetail, PreparedRequest};

/// A validated claim with compiled selectors.
#[derive(Debug, Clone)]
pub struct PreparedClaim {
    pub claim_class: Option<Arc<DeviceClass>>,
    pub requests: Vec<PreparedRequest>,
    /// Claim constraints followed by the claim class's.
    pub constraints: Vec<Constraint>,
}

impl PreparedClaim {
    /// First referenced class allocated by an external controller, with
    /// that controller's name.
    pub fn external_controller(&self) -> Option<(&str, &str)> {
        let request_classes = self
            .requests
            .iter()
            .flat_map(|r| &r.alternatives)
            .filter_map(|alt| alt.class.as_ref());
        self.claim_class
            .iter()
            .chain(request_classes)
            .find_map(|class| class.controller_name.as_deref().map(|c| (class.name.as_str(), c)))
    }
}

struct Preparer<'a> {
    catalog: &'a ClassCatalog,
    cache: &'a SelectorCache,
    errs: ValidationErrors,
    /// Compiled request requirements per class, each class compiled once.
    class_filters: HashMap<String, Vec<Filter>>,
}

impl<'a> Preparer<'a> {
    fn lookup(&mut self, name: &str, path: FieldPath) -> Option<Arc<DeviceClass>> {
        match self.catalog.get(name) {
            Some(class) => Some(Arc::clone(class)),
            None => {
                self.errs.push(path, FieldErrorKind::UnknownClass { name: name.to_string() });
                None
            }
        }
    }

    fn compile(&mut self, requirements: &[Requirement], path: &FieldPath) -> Vec<Filter> {
        let mut filters = Vec::with_capacity(requirements.len());
        for (j, requirement) in requirements.iter().enumerate() {
            let filter = requirement.device_filter();
            match self.cache.get_or_compile(&filter.selector) {
                Ok((program, hit)) => {
                    METRICS.record_selector_lookup(hit);
                    filters.push(Filter {
                        driver_name: filter.driver_name.clone(),
                        program,
                    });
                }
                Err(e) => self.errs.push(
                    path.index(j).child("device").child("selector"),
                    FieldErrorKind::Selector { message: e.to_string() },
                ),
            }
        }
        filters
    }

    fn class_filters(&mut self, class: &DeviceClass) -> Vec<Filter> {
        if let Some(filters) = self.class_filters.get(&class.name) {
            return filters.clone();
        }
        let path = FieldPath::new("deviceClasses")
            .key(&class.name)
            .child("request")
            .child("requirements");
        let filters = self.compile(&class.request.requirements, &path);
        self.class_filters.insert(class.name.clone(), filters.clone());
        filters
    }

    fn detail(
        &mut self,
        alternative: usize,
        detail: &RequestDetail,
        claim_class: Option<&Arc<DeviceClass>>,
        path: &FieldPath,
    ) -> PreparedDetail {
        let class = detail
            .class
            .as_ref()
            .and_then(|r| self.lookup(r.name(), path.child("resourceClassName")));

        let mut filters = Vec::new();
        if let Some(c) = claim_class {
            filters.extend(self.class_filters(c));
        }
        if let Some(c) = &class {
            filters.extend(self.class_filters(c));
        }
        filters.extend(self.compile(&detail.requirements, &path.child("requirements")));

        PreparedDetail {
            alternative,
            detail: detail.clone(),
            class,
            filters,
        }
    }
}

/// Effective request list and the path its entries are reported under.
fn effective_requests(claim: &Claim, claim_class: Option<&DeviceClass>) -> (Vec<Request>, FieldPath) {
    if !claim.requests.is_empty() {
        return (claim.requests.clone(), FieldPath::new("spec").child("requests"));
    }
    if let Some(class) = claim_class.filter(|c| !c.default_requests.is_empty()) {
        let path = FieldPath::new("deviceClasses")
            .key(&class.name)
            .child("defaultRequests");
        return (class.default_requests.clone(), path);
    }
    (
        vec![Request::single(RequestDetail::new())],
        FieldPath::new("spec").child("requests"),
    )
}

/// Validate `claim` against `catalog` and compile its selectors.
///
/// Reports structural errors, unknown class references and selectors that
/// do not compile, all at once.
pub fn prepare_claim(
    claim: &Claim,
    catalog: &ClassCatalog,
    cache: &SelectorCache,
) -> Result<PreparedClaim, ValidationErrors> {
    let mut preparer = Preparer {
        catalog,
        cache,
        errs: claim.validate(),
        class_filters: HashMap::new(),
    };

    let spec = FieldPath::new("spec");
    let claim_class = claim
        .class
        .as_ref()
        .and_then(|r| preparer.lookup(r.name(), spec.child("resourceClassName")));

    let (requests, base) = effective_requests(claim, claim_class.as_deref());
    let mut prepared = Vec::with_capacity(requests.len());
    for (index, request) in requests.iter().enumerate() {
        let rp = base.index(index);
        let alternatives = if request.is_one_of() {
            let op = rp.child("oneOf");
            request
                .alternatives()
                .iter()
                .enumerate()
                .map(|(k, detail)| preparer.detail(k, detail, claim_class.as_ref(), &op.index(k)))
                .collect()
        } else {
            request
                .alternatives()
                .iter()
                .map(|detail| preparer.detail(0, detail, claim_class.as_ref(), &rp))
                .collect()
        };
        prepared.push(PreparedRequest {
            index,
            name: request.name.clone(),
            is_one_of: request.is_one_of(),
            alternatives,
        });
    }

    let mut constraints = claim.constraints.clone();
    if let Some(class) = &claim_class {
        constraints.extend(class.claim.constraints.iter().cloned());
    }

    preparer.errs.into_result(PreparedClaim {
        claim_class,
        requests: prepared,
        constraints,
    })
}
