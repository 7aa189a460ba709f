//! Device classes: reusable, admin-defined bundles of requirements,
//! constraints and configuration.

use crate::claim::{check_configs, validate_requests, Configuration, Constraint, Request, Requirement};
use crate::error::{FieldErrorKind, FieldPath, ValidationErrors};
use crate::node::NodeSelector;

/// Applies when the class is referenced at claim scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassClaimSpec {
    pub config: Vec<Configuration>,
    pub constraints: Vec<Constraint>,
}

/// Applies to every request allocated through the class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassRequestSpec {
    pub config: Vec<Configuration>,
    pub requirements: Vec<Requirement>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceClass {
    pub name: String,
    /// Set when claims for this class are allocated by an external
    /// controller rather than by structured resolution.
    pub controller_name: Option<String>,
    /// Nodes on which devices of this class can be used; `None` means all.
    pub suitable_nodes: Option<NodeSelector>,
    pub claim: ClassClaimSpec,
    pub request: ClassRequestSpec,
    /// Used when a claim referencing the class has no requests of its own.
    pub default_requests: Vec<Request>,
}

impl DeviceClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_controller(mut self, controller_name: impl Into<String>) -> Self {
        self.controller_name = Some(controller_name.into());
        self
    }

    pub fn with_suitable_nodes(mut self, selector: NodeSelector) -> Self {
        self.suitable_nodes = Some(selector);
        self
    }

    pub fn with_claim_config(mut self, config: Configuration) -> Self {
        self.claim.config.push(config);
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.claim.constraints.push(constraint);
        self
    }

    pub fn with_request_config(mut self, config: Configuration) -> Self {
        self.request.config.push(config);
        self
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.request.requirements.push(requirement);
        self
    }

    pub fn with_default_request(mut self, request: Request) -> Self {
        self.default_requests.push(request);
        self
    }

    pub fn is_externally_controlled(&self) -> bool {
        self.controller_name.as_deref().is_some_and(|c| !c.is_empty())
    }

    pub fn validate(&self) -> ValidationErrors {
        let mut errs = ValidationErrors::new();
        if self.name.is_empty() {
            errs.push(FieldPath::new("metadata").child("name"), FieldErrorKind::Required);
        }
        if let Some(nodes) = &self.suitable_nodes {
            nodes.validate(&FieldPath::new("suitableNodes"), &mut errs);
        }
        check_configs(&self.claim.config, &FieldPath::new("claim").child("config"), &mut errs);
        check_configs(&self.request.config, &FieldPath::new("request").child("config"), &mut errs);
        validate_requests(&self.default_requests, &FieldPath::new("defaultRequests"), &mut errs);
        errs
    }
}
