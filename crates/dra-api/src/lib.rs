//! DRA API - data model for structured device allocation
//!
//! Layer 0 of the resolver workspace. Defines devices and their typed
//! attributes, device classes, resource claims, allocation results and claim
//! status, together with the wire representation of those kinds and a
//! multi-document decoder.
//!
//! Unions that must have exactly one member are closed enums in the model;
//! the wire types in [`wire`] carry the optional-member form and report
//! violations as path-qualified [`FieldError`]s.

pub mod allocation;
pub mod attribute;
pub mod claim;
pub mod class;
pub mod decode;
pub mod device;
pub mod error;
pub mod node;
pub mod quantity;
pub mod status;
pub mod wire;

pub use allocation::{
    validate_driver_data, AllocatedDevice, AllocationResult, ConfigScope, ConfigSource, DriverConfiguration,
    DriverData, DriverRequestResult, RequestAllocationResult, StructuredDriverData, DRIVER_DATA_MAX_ENTRIES,
    DRIVER_DATA_MAX_SIZE,
};
pub use attribute::{is_qualified_name, AttributeType, AttributeValue, QualifiedName};
pub use claim::{
    effective_count, Claim, ClassReference, Configuration, Constraint, CountRange, DeviceFilter, MatchModel, Request,
    RequestBody, RequestDetail, Requirement, VendorConfiguration,
};
pub use class::{ClassClaimSpec, ClassRequestSpec, DeviceClass};
pub use decode::{decode_documents, DecodedObject, Document, KindRegistry, API_GROUP};
pub use device::{Device, DeviceId};
pub use error::{ApiError, ApiResult, FieldError, FieldErrorKind, FieldPath, ValidationErrors};
pub use node::{NodeSelector, NodeSelectorOperator, NodeSelectorRequirement, NodeSelectorTerm};
pub use quantity::Quantity;
pub use status::{ClaimStatus, ConsumerReference, MAX_RESERVED_FOR};
