//! Device class catalog.

use std::collections::BTreeMap;
use std::sync::Arc;

use dra_api::{DecodedObject, DeviceClass, ValidationErrors};

/// Read-only set of device classes, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ClassCatalog {
    classes: BTreeMap<String, Arc<DeviceClass>>,
}

impl ClassCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a class.
    pub fn with_class(mut self, class: DeviceClass) -> Self {
        self.insert(class);
        self
    }

    pub fn insert(&mut self, class: DeviceClass) -> Option<Arc<DeviceClass>> {
        self.classes.insert(class.name.clone(), Arc::new(class))
    }

    /// Catalog of every class among decoded documents; other kinds are
    /// ignored. Invalid classes are reported instead of added.
    pub fn from_objects<'a>(objects: impl IntoIterator<Item = &'a DecodedObject>) -> Result<Self, ValidationErrors> {
        let mut catalog = Self::new();
        let mut errs = ValidationErrors::new();
        for object in objects {
            if let DecodedObject::DeviceClass(class) = object {
                let class_errs = class.validate();
                if class_errs.is_empty() {
                    catalog.insert(class.clone());
                } else {
                    errs.extend(class_errs);
                }
            }
        }
        errs.into_result(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<DeviceClass>> {
        self.classes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceClass> {
        self.classes.values().map(|c| c.as_ref())
    }
}
