//! Node eligibility predicates.
//!
//! A [`NodeSelector`] ORs its terms; each term ANDs its match expressions.
//! Allocation results carry the intersection of every contributing class
//! selector, computed as the cross product of their terms.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FieldErrorKind, FieldPath, ValidationErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeSelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Gt,
    Lt,
}

/// One label test.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: NodeSelectorOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl NodeSelectorRequirement {
    pub fn new(key: impl Into<String>, operator: NodeSelectorOperator, values: &[&str]) -> Self {
        Self {
            key: key.into(),
            operator,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let label = labels.get(&self.key);
        match self.operator {
            NodeSelectorOperator::In => label.is_some_and(|l| self.values.contains(l)),
            NodeSelectorOperator::NotIn => !label.is_some_and(|l| self.values.contains(l)),
            NodeSelectorOperator::Exists => label.is_some(),
            NodeSelectorOperator::DoesNotExist => label.is_none(),
            NodeSelectorOperator::Gt | NodeSelectorOperator::Lt => {
                let (Some(label), Some(bound)) = (label, self.values.first()) else {
                    return false;
                };
                match (label.parse::<i64>(), bound.parse::<i64>()) {
                    (Ok(l), Ok(b)) if self.operator == NodeSelectorOperator::Gt => l > b,
                    (Ok(l), Ok(b)) => l < b,
                    _ => false,
                }
            }
        }
    }

    fn validate(&self, path: &FieldPath, errs: &mut ValidationErrors) {
        if self.key.is_empty() {
            errs.push(path.child("key"), FieldErrorKind::Required);
        }
        let values = path.child("values");
        match self.operator {
            NodeSelectorOperator::In | NodeSelectorOperator::NotIn => {
                if self.values.is_empty() {
                    errs.push(values, FieldErrorKind::Required);
                }
            }
            NodeSelectorOperator::Exists | NodeSelectorOperator::DoesNotExist => {
                if !self.values.is_empty() {
                    errs.push(
                        values,
                        FieldErrorKind::Invalid {
                            value: format!("{:?}", self.values),
                            reason: "must be empty for Exists and DoesNotExist".to_string(),
                        },
                    );
                }
            }
            NodeSelectorOperator::Gt | NodeSelectorOperator::Lt => {
                let ok = self.values.len() == 1 && self.values[0].parse::<i64>().is_ok();
                if !ok {
                    errs.push(
                        values,
                        FieldErrorKind::Invalid {
                            value: format!("{:?}", self.values),
                            reason: "Gt and Lt take exactly one integer value".to_string(),
                        },
                    );
                }
            }
        }
    }
}

/// A conjunction of label tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorTerm {
    #[serde(default)]
    pub match_expressions: Vec<NodeSelectorRequirement>,
}

impl NodeSelectorTerm {
    pub fn new(match_expressions: Vec<NodeSelectorRequirement>) -> Self {
        Self { match_expressions }
    }

    /// An empty term matches nothing.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        !self.match_expressions.is_empty()
            && self.match_expressions.iter().all(|r| r.matches(labels))
    }
}

/// A disjunction of terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelector {
    pub node_selector_terms: Vec<NodeSelectorTerm>,
}

impl NodeSelector {
    pub fn new(node_selector_terms: Vec<NodeSelectorTerm>) -> Self {
        Self { node_selector_terms }
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.node_selector_terms.iter().any(|t| t.matches(labels))
    }

    /// Selector matching exactly the nodes both `self` and `other` match.
    pub fn intersect(&self, other: &NodeSelector) -> NodeSelector {
        let mut terms = Vec::with_capacity(self.node_selector_terms.len() * other.node_selector_terms.len());
        for left in &self.node_selector_terms {
            for right in &other.node_selector_terms {
                let mut exprs = left.match_expressions.clone();
                for expr in &right.match_expressions {
                    if !exprs.contains(expr) {
                        exprs.push(expr.clone());
                    }
                }
                let term = NodeSelectorTerm::new(exprs);
                if !terms.contains(&term) {
                    terms.push(term);
                }
            }
        }
        NodeSelector::new(terms)
    }

    /// Intersection of all selectors; `None` (every node) when there are none.
    pub fn intersect_all<'a>(selectors: impl IntoIterator<Item = &'a NodeSelector>) -> Option<NodeSelector> {
        selectors.into_iter().fold(None, |acc, next| match acc {
            None => Some(next.clone()),
            Some(acc) => Some(acc.intersect(next)),
        })
    }

    pub fn validate(&self, path: &FieldPath, errs: &mut ValidationErrors) {
        let terms = path.child("nodeSelectorTerms");
        if self.node_selector_terms.is_empty() {
            errs.push(terms.clone(), FieldErrorKind::Required);
        }
        for (i, term) in self.node_selector_terms.iter().enumerate() {
            let exprs = terms.index(i).child("matchExpressions");
            for (j, req) in term.match_expressions.iter().enumerate() {
                req.validate(&exprs.index(j), errs);
            }
        }
    }
}
