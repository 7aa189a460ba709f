//! Multi-document decoding.
//!
//! A stream of YAML documents is split at `---` separators; each document
//! is dispatched on its `(group, kind)` through a caller-supplied
//! [`KindRegistry`]. Kinds the registry does not know are skipped so newer
//! or older payloads can be read without failing.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::claim::Claim;
use crate::class::DeviceClass;
use crate::device::Device;
use crate::error::{ApiError, ApiResult, ValidationErrors};
use crate::wire;

/// API group of every built-in kind.
pub const API_GROUP: &str = "resource.k8s.io";

/// A decoded, validated object.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedObject {
    DeviceClass(DeviceClass),
    Claim(Claim),
    ClaimTemplate(Claim),
    ResourceSlice(Vec<Device>),
}

/// Converts one document body into a typed object.
pub type DecodeFn = fn(serde_yaml::Value) -> ApiResult<DecodedObject>;

/// Lookup table from `(group, kind)` to decoder.
#[derive(Clone, Default)]
pub struct KindRegistry {
    decoders: HashMap<(String, String), DecodeFn>,
}

impl KindRegistry {
    /// An empty registry; every document is skipped.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in kinds under [`API_GROUP`].
    pub fn standard() -> Self {
        Self::new()
            .with_kind(API_GROUP, "DeviceClass", decode_device_class)
            .with_kind(API_GROUP, "ResourceClaim", decode_claim)
            .with_kind(API_GROUP, "ResourceClaimTemplate", decode_claim_template)
            .with_kind(API_GROUP, "ResourceSlice", decode_resource_slice)
    }

    pub fn with_kind(mut self, group: &str, kind: &str, decode: DecodeFn) -> Self {
        self.decoders.insert((group.to_string(), kind.to_string()), decode);
        self
    }

    pub fn contains(&self, group: &str, kind: &str) -> bool {
        self.decoders.contains_key(&(group.to_string(), kind.to_string()))
    }

    fn get(&self, group: &str, kind: &str) -> Option<DecodeFn> {
        self.decoders.get(&(group.to_string(), kind.to_string())).copied()
    }
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.decoders.keys().collect();
        kinds.sort();
        f.debug_struct("KindRegistry").field("kinds", &kinds).finish()
    }
}

/// One decoded document of a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Position in the stream, counting skipped and empty documents.
    pub index: usize,
    pub api_version: String,
    pub kind: String,
    pub object: DecodedObject,
}

/// Split `apiVersion` into (group, version). The core group is empty.
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.rsplit_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Decode every registered document in `text`.
pub fn decode_documents(registry: &KindRegistry, text: &str) -> ApiResult<Vec<Document>> {
    let mut documents = Vec::new();
    for (index, de) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = serde_yaml::Value::deserialize(de)?;
        if value.is_null() {
            continue;
        }
        let type_meta = |field: &str| value.get(field).and_then(|v| v.as_str()).map(str::to_string);
        let (Some(api_version), Some(kind)) = (type_meta("apiVersion"), type_meta("kind")) else {
            return Err(ApiError::MissingTypeMeta { index });
        };

        let (group, _) = split_api_version(&api_version);
        let Some(decode) = registry.get(group, &kind) else {
            debug!(index, api_version = %api_version, kind = %kind, "skipping unregistered kind");
            continue;
        };

        let object = decode(value).map_err(|e| match e {
            ApiError::Validation(errors) => ApiError::InvalidDocument {
                index,
                kind: kind.clone(),
                errors,
            },
            other => other,
        })?;
        documents.push(Document {
            index,
            api_version,
            kind,
            object,
        });
    }
    Ok(documents)
}

fn decode_wire<W, M>(
    value: serde_yaml::Value,
    convert: impl FnOnce(W, &mut ValidationErrors) -> Option<M>,
) -> ApiResult<M>
where
    W: DeserializeOwned,
{
    let wire: W = serde_yaml::from_value(value)?;
    let mut errs = ValidationErrors::new();
    match convert(wire, &mut errs) {
        Some(model) if errs.is_empty() => Ok(model),
        _ => Err(ApiError::Validation(errs)),
    }
}

pub fn decode_device_class(value: serde_yaml::Value) -> ApiResult<DecodedObject> {
    decode_wire(value, wire::DeviceClass::into_model).map(DecodedObject::DeviceClass)
}

pub fn decode_claim(value: serde_yaml::Value) -> ApiResult<DecodedObject> {
    decode_wire(value, wire::ResourceClaim::into_model).map(DecodedObject::Claim)
}

pub fn decode_claim_template(value: serde_yaml::Value) -> ApiResult<DecodedObject> {
    decode_wire(value, wire::ResourceClaimTemplate::into_model).map(DecodedObject::ClaimTemplate)
}

pub fn decode_resource_slice(value: serde_yaml::Value) -> ApiResult<DecodedObject> {
    decode_wire(value, wire::ResourceSlice::into_model).map(DecodedObject::ResourceSlice)
}
