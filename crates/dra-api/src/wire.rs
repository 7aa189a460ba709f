//! Serialized representation of the DRA kinds.
//!
//! On the wire every union is an object with several optional, mutually
//! exclusive members, class references are flattened into their parent, and
//! request details are flattened into the request next to `name` and
//! `oneOf`. Each wire type converts into its model counterpart through
//! `into_model`, which reports every structural problem with its field path
//! instead of stopping at the first one.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeValue, QualifiedName};
use crate::claim as model;
use crate::class as class_model;
use crate::device::Device;
use crate::error::{FieldErrorKind, FieldPath, ValidationErrors};
use crate::node::NodeSelector;
use crate::quantity::Quantity;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Check that exactly one of `members` is set. Returns the index of the set
/// member.
fn one_of(path: &FieldPath, members: &[(&str, bool)], errs: &mut ValidationErrors) -> Option<usize> {
    let set: Vec<usize> = members
        .iter()
        .enumerate()
        .filter(|(_, (_, is_set))| *is_set)
        .map(|(i, _)| i)
        .collect();
    let candidates = || -> Vec<String> { members.iter().map(|(name, _)| name.to_string()).collect() };
    match set.as_slice() {
        [only] => Some(*only),
        [] => {
            errs.push(
                path.clone(),
                FieldErrorKind::OneOfNone {
                    candidates: candidates(),
                },
            );
            None
        }
        many => {
            errs.push(
                path.clone(),
                FieldErrorKind::OneOfMany {
                    candidates: candidates(),
                    set: many.iter().map(|i| members[*i].0.to_string()).collect(),
                },
            );
            None
        }
    }
}

fn convert_list<W, M>(
    items: Vec<W>,
    path: &FieldPath,
    errs: &mut ValidationErrors,
    convert: impl Fn(W, &FieldPath, &mut ValidationErrors) -> Option<M>,
) -> Vec<M> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| convert(item, &path.index(i), errs))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

// ---------------------------------------------------------------------------
// Unions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_class_name: Option<String>,
}

impl ClassReference {
    /// A class reference is optional wherever it is embedded.
    pub fn into_model(self) -> Option<model::ClassReference> {
        self.resource_class_name.map(model::ClassReference::ResourceClassName)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl MatchModel {
    pub fn into_model(self, path: &FieldPath, errs: &mut ValidationErrors) -> Option<model::MatchModel> {
        one_of(path, &[("attribute", self.attribute.is_some())], errs)?;
        let name = self.attribute?;
        match QualifiedName::parse(&name) {
            Ok(name) => Some(model::MatchModel::Attribute(name)),
            Err(kind) => {
                errs.push(path.child("attribute"), kind);
                None
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_: Option<MatchModel>,
}

impl Constraint {
    pub fn into_model(self, path: &FieldPath, errs: &mut ValidationErrors) -> Option<model::Constraint> {
        one_of(path, &[("match", self.match_.is_some())], errs)?;
        self.match_?
            .into_model(&path.child("match"), errs)
            .map(model::Constraint::Match)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<VendorConfiguration>,
}

impl Configuration {
    pub fn into_model(self, path: &FieldPath, errs: &mut ValidationErrors) -> Option<model::Configuration> {
        one_of(path, &[("vendor", self.vendor.is_some())], errs)?;
        let vendor = self.vendor?;
        Some(model::Configuration::Vendor(model::VendorConfiguration {
            driver_name: vendor.driver_name.unwrap_or_default(),
            parameters: vendor.parameters.unwrap_or(serde_json::Value::Null),
        }))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub selector: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceFilter>,
}

impl Requirement {
    pub fn into_model(self, path: &FieldPath, errs: &mut ValidationErrors) -> Option<model::Requirement> {
        one_of(path, &[("device", self.device.is_some())], errs)?;
        let device = self.device?;
        Some(model::Requirement::Device(model::DeviceFilter {
            driver_name: device.driver_name,
            selector: device.selector,
        }))
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetail {
    #[serde(flatten)]
    pub class: ClassReference,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<Configuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_access: Option<bool>,
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<MatchModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<IntRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<Requirement>,
}

impl RequestDetail {
    /// Whether any detail member is present.
    pub fn is_set(&self) -> bool {
        self.class.resource_class_name.is_some()
            || !self.config.is_empty()
            || self.admin_access.is_some()
            || !self.matches.is_empty()
            || self.count.is_some()
            || !self.requirements.is_empty()
    }

    pub fn into_model(self, path: &FieldPath, errs: &mut ValidationErrors) -> Option<model::RequestDetail> {
        let before = errs.len();
        let count = match self.count {
            Some(range) => match model::CountRange::new(range.minimum, range.maximum) {
                Ok(count) => Some(count),
                Err(kind) => {
                    errs.push(path.child("count"), kind);
                    None
                }
            },
            None => None,
        };
        let detail = model::RequestDetail {
            class: self.class.into_model(),
            config: convert_list(self.config, &path.child("config"), errs, Configuration::into_model),
            admin_access: self.admin_access,
            matches: convert_list(self.matches, &path.child("match"), errs, MatchModel::into_model),
            count,
            requirements: convert_list(
                self.requirements,
                &path.child("requirements"),
                errs,
                Requirement::into_model,
            ),
        };
        (errs.len() == before).then_some(detail)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub detail: RequestDetail,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<RequestDetail>,
}

impl Request {
    pub fn into_model(self, path: &FieldPath, errs: &mut ValidationErrors) -> Option<model::Request> {
        let members = [("request detail", self.detail.is_set()), ("oneOf", !self.one_of.is_empty())];
        let body = match one_of(path, &members, errs)? {
            0 => model::RequestBody::Single(self.detail.into_model(path, errs)?),
            _ => {
                let before = errs.len();
                let alternatives = convert_list(self.one_of, &path.child("oneOf"), errs, RequestDetail::into_model);
                if errs.len() != before {
                    return None;
                }
                model::RequestBody::OneOf(alternatives)
            }
        };
        Some(model::Request { name: self.name, body })
    }
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSpec {
    #[serde(flatten)]
    pub class: ClassReference,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<Configuration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requests: Vec<Request>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shareable: Option<bool>,
}

impl ClaimSpec {
    pub fn into_model(self, name: String, path: &FieldPath, errs: &mut ValidationErrors) -> Option<model::Claim> {
        let before = errs.len();
        let claim = model::Claim {
            name,
            class: self.class.into_model(),
            config: convert_list(self.config, &path.child("config"), errs, Configuration::into_model),
            constraints: convert_list(
                self.constraints,
                &path.child("constraints"),
                errs,
                Constraint::into_model,
            ),
            requests: convert_list(self.requests, &path.child("requests"), errs, Request::into_model),
            shareable: self.shareable.unwrap_or(false),
        };
        if errs.len() != before {
            return None;
        }
        let semantic = claim.validate_at(path);
        let ok = semantic.is_empty();
        errs.extend(semantic);
        ok.then_some(claim)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceClaim {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<ClaimSpec>,
    /// Indirect specs are not supported; present only to be rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_ref: Option<serde_json::Value>,
}

impl ResourceClaim {
    pub fn into_model(self, errs: &mut ValidationErrors) -> Option<model::Claim> {
        claim_from_alternatives(self.metadata.name, self.spec, self.spec_ref, &FieldPath::root(), errs)
    }
}

fn claim_from_alternatives(
    name: String,
    spec: Option<ClaimSpec>,
    spec_ref: Option<serde_json::Value>,
    base: &FieldPath,
    errs: &mut ValidationErrors,
) -> Option<model::Claim> {
    one_of(base, &[("spec", spec.is_some()), ("specRef", spec_ref.is_some())], errs)?;
    if spec_ref.is_some() {
        errs.push(
            base.child("specRef"),
            FieldErrorKind::Invalid {
                value: "specRef".to_string(),
                reason: "referenced claim specs are not supported".to_string(),
            },
        );
        return None;
    }
    spec?.into_model(name, &base.child("spec"), errs)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceClaimTemplateSpec {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<ClaimSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_ref: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceClaimTemplate {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ResourceClaimTemplateSpec,
}

impl ResourceClaimTemplate {
    /// The claim each instantiation of the template starts from. It is named
    /// after the template unless the template spec names it.
    pub fn into_model(self, errs: &mut ValidationErrors) -> Option<model::Claim> {
        let inner = self.spec;
        let name = if inner.metadata.name.is_empty() {
            self.metadata.name
        } else {
            inner.metadata.name
        };
        claim_from_alternatives(name, inner.spec, inner.spec_ref, &FieldPath::new("spec"), errs)
    }
}

// ---------------------------------------------------------------------------
// Device classes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassClaimSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<Configuration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRequestSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<Configuration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<Requirement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceClass {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suitable_nodes: Option<NodeSelector>,
    #[serde(default)]
    pub claim: ClassClaimSpec,
    #[serde(default)]
    pub request: ClassRequestSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_requests: Vec<Request>,
}

impl DeviceClass {
    pub fn into_model(self, errs: &mut ValidationErrors) -> Option<class_model::DeviceClass> {
        let before = errs.len();
        let claim = FieldPath::new("claim");
        let request = FieldPath::new("request");
        let class = class_model::DeviceClass {
            name: self.metadata.name,
            controller_name: self.controller_name.filter(|c| !c.is_empty()),
            suitable_nodes: self.suitable_nodes,
            claim: class_model::ClassClaimSpec {
                config: convert_list(self.claim.config, &claim.child("config"), errs, Configuration::into_model),
                constraints: convert_list(
                    self.claim.constraints,
                    &claim.child("constraints"),
                    errs,
                    Constraint::into_model,
                ),
            },
            request: class_model::ClassRequestSpec {
                config: convert_list(self.request.config, &request.child("config"), errs, Configuration::into_model),
                requirements: convert_list(
                    self.request.requirements,
                    &request.child("requirements"),
                    errs,
                    Requirement::into_model,
                ),
            },
            default_requests: convert_list(
                self.default_requests,
                &FieldPath::new("defaultRequests"),
                errs,
                Request::into_model,
            ),
        };
        if errs.len() != before {
            return None;
        }
        let semantic = class.validate();
        let ok = semantic.is_empty();
        errs.extend(semantic);
        ok.then_some(class)
    }
}

// ---------------------------------------------------------------------------
// Resource slices
// ---------------------------------------------------------------------------

/// Integer or string scalar, as YAML authors write quantities either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Text(String),
}

/// A named attribute value; exactly one value member must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAttribute {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bool: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_slice: Option<Vec<String>>,
}

impl DeviceAttribute {
    fn into_model(self, path: &FieldPath, errs: &mut ValidationErrors) -> Option<(String, AttributeValue)> {
        if let Err(kind) = QualifiedName::parse(&self.name) {
            errs.push(path.child("name"), kind);
        }
        let members = [
            ("string", self.string.is_some()),
            ("int", self.int.is_some()),
            ("bool", self.bool.is_some()),
            ("version", self.version.is_some()),
            ("quantity", self.quantity.is_some()),
            ("stringSlice", self.string_slice.is_some()),
        ];
        let chosen = one_of(path, &members, errs)?;
        let invalid = |value: String, reason: String| FieldErrorKind::Invalid { value, reason };
        let value = match chosen {
            0 => AttributeValue::String(self.string?),
            1 => AttributeValue::Int(self.int?),
            2 => AttributeValue::Bool(self.bool?),
            3 => {
                let text = self.version?;
                match semver::Version::parse(&text) {
                    Ok(v) => AttributeValue::Version(v),
                    Err(e) => {
                        errs.push(path.child("version"), invalid(text, e.to_string()));
                        return None;
                    }
                }
            }
            4 => match self.quantity? {
                Scalar::Int(v) => AttributeValue::Quantity(Quantity::from_int(v)),
                Scalar::Text(text) => match Quantity::parse(&text) {
                    Ok(q) => AttributeValue::Quantity(q),
                    Err(e) => {
                        errs.push(path.child("quantity"), invalid(text, e.to_string()));
                        return None;
                    }
                },
            },
            _ => AttributeValue::StringSlice(self.string_slice?),
        };
        Some((self.name, value))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceDevice {
    pub name: String,
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(default)]
    pub attributes: Vec<DeviceAttribute>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSliceSpec {
    pub driver_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default)]
    pub devices: Vec<SliceDevice>,
}

/// Devices published by one driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSlice {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: ResourceSliceSpec,
}

impl ResourceSlice {
    pub fn into_model(self, errs: &mut ValidationErrors) -> Option<Vec<Device>> {
        let before = errs.len();
        let spec = FieldPath::new("spec");
        let driver = self.spec.driver_name;
        if driver.is_empty() {
            errs.push(spec.child("driverName"), FieldErrorKind::Required);
        }

        let mut seen = BTreeSet::new();
        let mut devices = Vec::with_capacity(self.spec.devices.len());
        for (i, wire) in self.spec.devices.into_iter().enumerate() {
            let dp = spec.child("devices").index(i);
            if wire.name.is_empty() {
                errs.push(dp.child("name"), FieldErrorKind::Required);
            } else if !seen.insert(wire.name.clone()) {
                errs.push(
                    dp.child("name"),
                    FieldErrorKind::Invalid {
                        value: wire.name.clone(),
                        reason: "duplicate device name".to_string(),
                    },
                );
            }
            let mut device = Device::new(&driver, wire.name).with_type(wire.device_type);
            for (j, attribute) in wire.attributes.into_iter().enumerate() {
                let ap = dp.child("attributes").index(j);
                if let Some((name, value)) = attribute.into_model(&ap, errs) {
                    if device.attributes.insert(name.clone(), value).is_some() {
                        errs.push(
                            ap.child("name"),
                            FieldErrorKind::Invalid {
                                value: name,
                                reason: "duplicate attribute name".to_string(),
                            },
                        );
                    }
                }
            }
            devices.push(device);
        }
        (errs.len() == before).then_some(devices)
    }
}
