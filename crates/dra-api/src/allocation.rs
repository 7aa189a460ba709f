//! Allocation results and the per-driver payloads derived from them.

use serde::{Deserialize, Serialize};

use crate::device::DeviceId;
use crate::error::{FieldErrorKind, FieldPath, ValidationErrors};
use crate::node::NodeSelector;

/// Maximum number of per-driver entries in one allocation.
pub const DRIVER_DATA_MAX_ENTRIES: usize = 32;
/// Maximum size in bytes of opaque driver data.
pub const DRIVER_DATA_MAX_SIZE: usize = 16 * 1024;

// ---------------------------------------------------------------------------
// Configuration provenance
// ---------------------------------------------------------------------------

/// Who supplied a configuration entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// From the claim or request itself.
    User,
    /// From a device class.
    Admin,
}

/// Where a configuration entry was declared, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfigScope {
    Claim,
    ClaimClass,
    Request,
    RequestClass,
}

impl ConfigScope {
    pub fn is_claim_scoped(self) -> bool {
        matches!(self, ConfigScope::Claim | ConfigScope::ClaimClass)
    }

    pub fn source(self) -> ConfigSource {
        match self {
            ConfigScope::Claim | ConfigScope::Request => ConfigSource::User,
            ConfigScope::ClaimClass | ConfigScope::RequestClass => ConfigSource::Admin,
        }
    }
}

/// A configuration entry as delivered to a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverConfiguration {
    pub source: ConfigSource,
    pub scope: ConfigScope,
    pub driver_name: String,
    pub parameters: serde_json::Value,
}

impl DriverConfiguration {
    pub fn is_admin(&self) -> bool {
        self.source == ConfigSource::Admin
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AllocatedDevice {
    Device(DeviceId),
}

impl AllocatedDevice {
    pub fn id(&self) -> &DeviceId {
        match self {
            AllocatedDevice::Device(id) => id,
        }
    }
}

/// Outcome for one request of a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAllocationResult {
    /// Position of the request in the claim's effective request list.
    pub request_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_name: Option<String>,
    /// Index of the chosen alternative for one-of requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative: Option<usize>,
    #[serde(default)]
    pub admin_access: bool,
    pub devices: Vec<AllocatedDevice>,
    /// Merged configuration, most specific first.
    #[serde(default)]
    pub config: Vec<DriverConfiguration>,
}

impl RequestAllocationResult {
    pub fn device_ids(&self) -> impl Iterator<Item = &DeviceId> {
        self.devices.iter().map(AllocatedDevice::id)
    }
}

/// The full allocation of a claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResult {
    pub results: Vec<RequestAllocationResult>,
    /// Nodes where the allocated devices are usable; `None` means all nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_on_nodes: Option<NodeSelector>,
    #[serde(default)]
    pub shareable: bool,
}

impl AllocationResult {
    /// Every allocated device, in result order. Admin results may repeat
    /// devices held by other requests.
    pub fn devices(&self) -> impl Iterator<Item = &DeviceId> {
        self.results.iter().flat_map(|r| r.device_ids())
    }

    pub fn result_for(&self, request_name: &str) -> Option<&RequestAllocationResult> {
        self.results
            .iter()
            .find(|r| r.request_name.as_deref() == Some(request_name))
    }

    /// Package the allocation per driver, in order of first device
    /// appearance.
    pub fn driver_data(&self) -> Vec<DriverData> {
        let mut drivers: Vec<&str> = Vec::new();
        for id in self.devices() {
            if !drivers.contains(&id.driver_name.as_str()) {
                drivers.push(&id.driver_name);
            }
        }

        let mut claim_config: Vec<&DriverConfiguration> = Vec::new();
        for entry in self.results.iter().flat_map(|r| &r.config) {
            if entry.scope.is_claim_scoped() && !claim_config.contains(&entry) {
                claim_config.push(entry);
            }
        }

        drivers
            .into_iter()
            .map(|driver| {
                let config = claim_config
                    .iter()
                    .filter(|c| c.driver_name == driver)
                    .map(|c| (*c).clone())
                    .collect();
                let results = self
                    .results
                    .iter()
                    .filter_map(|r| {
                        let devices: Vec<String> = r
                            .device_ids()
                            .filter(|id| id.driver_name == driver)
                            .map(|id| id.name.clone())
                            .collect();
                        if devices.is_empty() {
                            return None;
                        }
                        Some(DriverRequestResult {
                            request_index: r.request_index,
                            request_name: r.request_name.clone(),
                            admin_access: r.admin_access,
                            config: r
                                .config
                                .iter()
                                .filter(|c| !c.scope.is_claim_scoped() && c.driver_name == driver)
                                .cloned()
                                .collect(),
                            devices,
                        })
                    })
                    .collect();
                DriverData {
                    driver_name: driver.to_string(),
                    data: None,
                    structured: Some(StructuredDriverData { config, results }),
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Driver data
// ---------------------------------------------------------------------------

/// What one driver needs to prepare its devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverData {
    pub driver_name: String,
    /// Opaque data for drivers that allocate through a controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<StructuredDriverData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredDriverData {
    /// Claim and claim-class configuration for this driver.
    pub config: Vec<DriverConfiguration>,
    pub results: Vec<DriverRequestResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverRequestResult {
    pub request_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_name: Option<String>,
    #[serde(default)]
    pub admin_access: bool,
    /// Request and request-class configuration for this driver.
    pub config: Vec<DriverConfiguration>,
    pub devices: Vec<String>,
}

/// Boundary check for driver data lists.
pub fn validate_driver_data(entries: &[DriverData], path: &FieldPath) -> ValidationErrors {
    let mut errs = ValidationErrors::new();
    if entries.len() > DRIVER_DATA_MAX_ENTRIES {
        errs.push(
            path.clone(),
            FieldErrorKind::TooMany {
                max: DRIVER_DATA_MAX_ENTRIES,
                actual: entries.len(),
            },
        );
    }
    for (i, entry) in entries.iter().enumerate() {
        if entry.driver_name.is_empty() {
            errs.push(path.index(i).child("driverName"), FieldErrorKind::Required);
        }
        if let Some(data) = &entry.data {
            if data.len() > DRIVER_DATA_MAX_SIZE {
                errs.push(
                    path.index(i).child("data"),
                    FieldErrorKind::TooLong {
                        max: DRIVER_DATA_MAX_SIZE,
                        actual: data.len(),
                    },
                );
            }
        }
    }
    errs
}
