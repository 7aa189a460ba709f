//! Resolver configuration.
//!
//! Every field has a default, so a partial document (or none at all) yields
//! a usable configuration.

use serde::{Deserialize, Serialize};

/// How one-of alternatives interact with claim-wide constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlternativePolicy {
    /// The first satisfiable alternative of each request is kept, even when a
    /// claim constraint later fails.
    #[default]
    FirstSatisfiable,
    /// Try other alternatives (across requests) when a later request or a
    /// claim constraint fails.
    Backtrack,
}

/// Tie-break when more devices match than a request may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOrder {
    /// Stable inventory order.
    #[default]
    PoolOrder,
    /// Lexicographic by driver, then device name.
    DeviceName,
}

/// Treatment of devices lacking a match-constrained attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingAttributePolicy {
    /// Use the typed zero value; two devices lacking it are equal.
    #[default]
    DefaultValue,
    /// Leave such devices out of the comparison.
    Ignore,
    /// A device lacking the attribute violates the constraint.
    Require,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Race-loss retries before a transient failure is reported.
    pub max_retries: u32,
    pub alternative_policy: AlternativePolicy,
    /// Bound on alternative selections explored in backtracking mode.
    pub max_backtrack_steps: usize,
    pub selection_order: SelectionOrder,
    pub missing_attribute: MissingAttributePolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            alternative_policy: AlternativePolicy::default(),
            max_backtrack_steps: 64,
            selection_order: SelectionOrder::default(),
            missing_attribute: MissingAttributePolicy::default(),
        }
    }
}

impl ResolverConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_alternative_policy(mut self, policy: AlternativePolicy) -> Self {
        self.alternative_policy = policy;
        self
    }

    pub fn with_max_backtrack_steps(mut self, steps: usize) -> Self {
        self.max_backtrack_steps = steps;
        self
    }

    pub fn with_selection_order(mut self, order: SelectionOrder) -> Self {
        self.selection_order = order;
        self
    }

    pub fn with_missing_attribute(mut self, policy: MissingAttributePolicy) -> Self {
        self.missing_attribute = policy;
        self
    }

    /// Total attempts, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}
