//! Resource claims: what a consumer asks for.
//!
//! These are the validated, in-memory forms. Every "exactly one of" shape on
//! the wire is a closed enum here, so an instance with zero or several
//! members cannot be constructed. See [`crate::wire`] for the serialized
//! representation.

use std::collections::BTreeSet;

use crate::attribute::QualifiedName;
use crate::error::{FieldErrorKind, FieldPath, ValidationErrors};

// ---------------------------------------------------------------------------
// Unions
// ---------------------------------------------------------------------------

/// Reference to a [`crate::class::DeviceClass`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClassReference {
    ResourceClassName(String),
}

impl ClassReference {
    pub fn new(name: impl Into<String>) -> Self {
        ClassReference::ResourceClassName(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            ClassReference::ResourceClassName(name) => name,
        }
    }
}

/// How devices are compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchModel {
    /// All devices must carry the same value for this attribute.
    Attribute(QualifiedName),
}

impl MatchModel {
    pub fn attribute(name: &str) -> Result<Self, FieldErrorKind> {
        QualifiedName::parse(name).map(MatchModel::Attribute)
    }

    pub fn attribute_name(&self) -> &QualifiedName {
        match self {
            MatchModel::Attribute(name) => name,
        }
    }
}

/// Cross-device rule applied over every device allocated for a claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constraint {
    Match(MatchModel),
}

impl Constraint {
    /// Shorthand for a `match` constraint on one attribute.
    pub fn match_attribute(name: &str) -> Result<Self, FieldErrorKind> {
        MatchModel::attribute(name).map(Constraint::Match)
    }
}

/// Opaque, driver-specific configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorConfiguration {
    pub driver_name: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Configuration {
    Vendor(VendorConfiguration),
}

impl Configuration {
    pub fn vendor(driver_name: impl Into<String>, parameters: serde_json::Value) -> Self {
        Configuration::Vendor(VendorConfiguration {
            driver_name: driver_name.into(),
            parameters,
        })
    }

    pub fn driver_name(&self) -> &str {
        match self {
            Configuration::Vendor(v) => &v.driver_name,
        }
    }

    pub fn parameters(&self) -> &serde_json::Value {
        match self {
            Configuration::Vendor(v) => &v.parameters,
        }
    }
}

/// Filter over individual devices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DeviceFilter {
    /// Only devices of this driver are considered. Applied before the
    /// selector.
    pub driver_name: Option<String>,
    /// Boolean selector expression; empty matches every device.
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Requirement {
    Device(DeviceFilter),
}

impl Requirement {
    pub fn selector(selector: impl Into<String>) -> Self {
        Requirement::Device(DeviceFilter {
            driver_name: None,
            selector: selector.into(),
        })
    }

    pub fn driver(driver_name: impl Into<String>, selector: impl Into<String>) -> Self {
        Requirement::Device(DeviceFilter {
            driver_name: Some(driver_name.into()),
            selector: selector.into(),
        })
    }

    pub fn device_filter(&self) -> &DeviceFilter {
        match self {
            Requirement::Device(filter) => filter,
        }
    }
}

// ---------------------------------------------------------------------------
// Counts
// ---------------------------------------------------------------------------

/// Desired number of devices. `None` bounds mean "unset", which differs
/// from an explicit zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CountRange {
    min: Option<u32>,
    max: Option<u32>,
}

impl CountRange {
    /// Validated range: both bounds non-negative, `min <= max` when both set.
    pub fn new(min: Option<i64>, max: Option<i64>) -> Result<Self, FieldErrorKind> {
        let bound = |v: Option<i64>, which: &str| -> Result<Option<u32>, FieldErrorKind> {
            v.map(|v| {
                u32::try_from(v).map_err(|_| FieldErrorKind::Invalid {
                    value: v.to_string(),
                    reason: format!("{which} must be between 0 and {}", u32::MAX),
                })
            })
            .transpose()
        };
        let min = bound(min, "min")?;
        let max = bound(max, "max")?;
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(FieldErrorKind::Invalid {
                    value: format!("[{lo}, {hi}]"),
                    reason: "min must not exceed max".to_string(),
                });
            }
        }
        Ok(Self { min, max })
    }

    pub fn exactly(n: u32) -> Self {
        Self {
            min: Some(n),
            max: Some(n),
        }
    }

    pub fn between(min: u32, max: u32) -> Result<Self, FieldErrorKind> {
        Self::new(Some(i64::from(min)), Some(i64::from(max)))
    }

    pub fn at_least(min: u32) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn min(&self) -> Option<u32> {
        self.min
    }

    pub fn max(&self) -> Option<u32> {
        self.max
    }
}

/// Effective `[min, max]` for an optional count; `max == None` is unbounded.
///
/// Unset count means exactly one device. A set count defaults its minimum
/// to 1, except that a lone maximum of 0 makes the minimum 0.
pub fn effective_count(count: Option<&CountRange>) -> (usize, Option<usize>) {
    let Some(range) = count else {
        return (1, Some(1));
    };
    let max = range.max.map(|m| m as usize);
    let min = match (range.min, max) {
        (Some(min), _) => min as usize,
        (None, Some(0)) => 0,
        (None, _) => 1,
    };
    (min, max)
}

// ---------------------------------------------------------------------------
// Requests and claims
// ---------------------------------------------------------------------------

/// One way of satisfying a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestDetail {
    pub class: Option<ClassReference>,
    pub config: Vec<Configuration>,
    /// Monitoring/management access: exclusivity is not enforced.
    pub admin_access: Option<bool>,
    /// Attributes that must be identical across the devices of this request.
    pub matches: Vec<MatchModel>,
    pub count: Option<CountRange>,
    pub requirements: Vec<Requirement>,
}

impl RequestDetail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, name: impl Into<String>) -> Self {
        self.class = Some(ClassReference::new(name));
        self
    }

    pub fn with_config(mut self, config: Configuration) -> Self {
        self.config.push(config);
        self
    }

    pub fn with_admin_access(mut self, admin: bool) -> Self {
        self.admin_access = Some(admin);
        self
    }

    pub fn with_match(mut self, model: MatchModel) -> Self {
        self.matches.push(model);
        self
    }

    pub fn with_count(mut self, count: CountRange) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn is_admin(&self) -> bool {
        self.admin_access.unwrap_or(false)
    }

    pub fn count_bounds(&self) -> (usize, Option<usize>) {
        effective_count(self.count.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Single(RequestDetail),
    /// Alternatives in priority order.
    OneOf(Vec<RequestDetail>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub name: Option<String>,
    pub body: RequestBody,
}

impl Request {
    pub fn single(detail: RequestDetail) -> Self {
        Self {
            name: None,
            body: RequestBody::Single(detail),
        }
    }

    pub fn one_of(alternatives: Vec<RequestDetail>) -> Self {
        Self {
            name: None,
            body: RequestBody::OneOf(alternatives),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The details to try, in priority order.
    pub fn alternatives(&self) -> &[RequestDetail] {
        match &self.body {
            RequestBody::Single(detail) => std::slice::from_ref(detail),
            RequestBody::OneOf(alternatives) => alternatives,
        }
    }

    pub fn is_one_of(&self) -> bool {
        matches!(self.body, RequestBody::OneOf(_))
    }
}

/// A consumer's declaration of required devices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claim {
    /// Identifies the claim in logs and results; may be empty.
    pub name: String,
    pub class: Option<ClassReference>,
    pub config: Vec<Configuration>,
    pub constraints: Vec<Constraint>,
    pub requests: Vec<Request>,
    pub shareable: bool,
}

impl Claim {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, name: impl Into<String>) -> Self {
        self.class = Some(ClassReference::new(name));
        self
    }

    pub fn with_config(mut self, config: Configuration) -> Self {
        self.config.push(config);
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_request(mut self, request: Request) -> Self {
        self.requests.push(request);
        self
    }

    pub fn shareable(mut self, shareable: bool) -> Self {
        self.shareable = shareable;
        self
    }

    /// Structural checks the type system cannot express: non-empty names,
    /// non-empty alternative lists, unique request names.
    pub fn validate(&self) -> ValidationErrors {
        self.validate_at(&FieldPath::new("spec"))
    }

    /// As [`Claim::validate`], with paths rooted at `spec`.
    pub fn validate_at(&self, spec: &FieldPath) -> ValidationErrors {
        let mut errs = ValidationErrors::new();
        if let Some(class) = &self.class {
            check_class_name(class, &spec.child("resourceClassName"), &mut errs);
        }
        check_configs(&self.config, &spec.child("config"), &mut errs);
        validate_requests(&self.requests, &spec.child("requests"), &mut errs);
        errs
    }
}

pub(crate) fn check_class_name(class: &ClassReference, path: &FieldPath, errs: &mut ValidationErrors) {
    if class.name().is_empty() {
        errs.push(path.clone(), FieldErrorKind::Required);
    }
}

pub(crate) fn check_configs(configs: &[Configuration], path: &FieldPath, errs: &mut ValidationErrors) {
    for (i, config) in configs.iter().enumerate() {
        if config.driver_name().is_empty() {
            errs.push(
                path.index(i).child("vendor").child("driverName"),
                FieldErrorKind::Required,
            );
        }
    }
}

fn check_requirements(requirements: &[Requirement], path: &FieldPath, errs: &mut ValidationErrors) {
    for (i, requirement) in requirements.iter().enumerate() {
        if requirement.device_filter().driver_name.as_deref() == Some("") {
            errs.push(
                path.index(i).child("device").child("driverName"),
                FieldErrorKind::Invalid {
                    value: String::new(),
                    reason: "must be omitted or non-empty".to_string(),
                },
            );
        }
    }
}

fn check_detail(detail: &RequestDetail, path: &FieldPath, errs: &mut ValidationErrors) {
    if let Some(class) = &detail.class {
        check_class_name(class, &path.child("resourceClassName"), errs);
    }
    check_configs(&detail.config, &path.child("config"), errs);
    check_requirements(&detail.requirements, &path.child("requirements"), errs);
}

/// Checks shared by claim specs and class default requests.
pub(crate) fn validate_requests(requests: &[Request], path: &FieldPath, errs: &mut ValidationErrors) {
    let mut names = BTreeSet::new();
    for (i, request) in requests.iter().enumerate() {
        let rp = path.index(i);
        if let Some(name) = &request.name {
            if name.is_empty() {
                errs.push(rp.child("name"), FieldErrorKind::Required);
            } else if !names.insert(name.as_str()) {
                errs.push(
                    rp.child("name"),
                    FieldErrorKind::Invalid {
                        value: name.clone(),
                        reason: "duplicate request name".to_string(),
                    },
                );
            }
        }
        match &request.body {
            RequestBody::Single(detail) => check_detail(detail, &rp, errs),
            RequestBody::OneOf(alternatives) => {
                let op = rp.child("oneOf");
                if alternatives.is_empty() {
                    errs.push(op.clone(), FieldErrorKind::Required);
                }
                for (k, detail) in alternatives.iter().enumerate() {
                    check_detail(detail, &op.index(k), errs);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_range_validation() {
        assert!(CountRange::new(Some(2), Some(4)).is_ok());
        assert!(CountRange::new(Some(0), Some(0)).is_ok());
        assert!(CountRange::new(Some(5), Some(4)).is_err());
        assert!(CountRange::new(Some(-1), None).is_err());
        assert!(CountRange::new(None, Some(-3)).is_err());
    }

    #[test]
    fn test_effective_count() {
        assert_eq!(effective_count(None), (1, Some(1)));
        assert_eq!(effective_count(Some(&CountRange::default())), (1, None));
        assert_eq!(effective_count(Some(&CountRange::at_least(3))), (3, None));
        assert_eq!(effective_count(Some(&CountRange::new(None, Some(4)).unwrap())), (1, Some(4)));
        assert_eq!(effective_count(Some(&CountRange::new(None, Some(0)).unwrap())), (0, Some(0)));
        assert_eq!(effective_count(Some(&CountRange::between(2, 4).unwrap())), (2, Some(4)));
    }

    #[test]
    fn test_match_attribute_must_be_qualified() {
        assert!(Constraint::match_attribute("numa.dra.example.com").is_ok());
        assert!(matches!(
            Constraint::match_attribute("numa"),
            Err(FieldErrorKind::NotQualified { .. })
        ));
    }

    #[test]
    fn test_request_alternatives() {
        let single = Request::single(RequestDetail::new().with_class("gpu"));
        assert_eq!(single.alternatives().len(), 1);
        assert!(!single.is_one_of());

        let one_of = Request::one_of(vec![RequestDetail::new(), RequestDetail::new().with_admin_access(true)]);
        assert_eq!(one_of.alternatives().len(), 2);
        assert!(one_of.alternatives()[1].is_admin());
    }

    #[test]
    fn test_claim_validate_reports_paths() {
        let claim = Claim::new("c")
            .with_class("")
            .with_config(Configuration::vendor("", serde_json::json!({})))
            .with_request(Request::single(RequestDetail::new()).with_name("a"))
            .with_request(Request::single(RequestDetail::new()).with_name("a"))
            .with_request(Request::one_of(vec![]))
            .with_request(Request::single(
                RequestDetail::new().with_requirement(Requirement::driver("", "")),
            ));
        let errs = claim.validate();
        assert!(errs.has_path("spec.resourceClassName"));
        assert!(errs.has_path("spec.config[0].vendor.driverName"));
        assert!(errs.has_path("spec.requests[1].name"));
        assert!(errs.has_path("spec.requests[2].oneOf"));
        assert!(errs.has_path("spec.requests[3].requirements[0].device.driverName"));
        assert_eq!(errs.len(), 5);
    }
}
