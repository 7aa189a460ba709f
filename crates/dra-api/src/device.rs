//! Devices advertised by drivers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeType, AttributeValue};

/// Identity of a device: unique per (driver, name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceId {
    pub driver_name: String,
    pub name: String,
}

impl DeviceId {
    pub fn new(driver_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            driver_name: driver_name.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.driver_name, self.name)
    }
}

/// One schedulable hardware unit and its attribute set.
///
/// Attribute names are fully qualified. A device is an immutable snapshot
/// for the duration of one resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub name: String,
    pub driver_name: String,
    /// Device type tag (`gpu`, `nic`, ...).
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Device {
    pub fn new(driver_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver_name: driver_name.into(),
            device_type: String::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> DeviceId {
        DeviceId::new(&self.driver_name, &self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Typed lookup: the attribute when present with type `ty`, otherwise
    /// `ty`'s zero value.
    pub fn typed_attribute(&self, name: &str, ty: AttributeType) -> AttributeValue {
        match self.attributes.get(name) {
            Some(value) if value.attribute_type() == ty => value.clone(),
            _ => ty.zero_value(),
        }
    }
}
