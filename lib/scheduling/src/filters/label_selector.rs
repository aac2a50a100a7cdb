// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! General set-based label selection, following the Kubernetes selector
//! semantics (`matchLabels` equality plus `matchExpressions` with `In`,
//! `NotIn`, `Exists` and `DoesNotExist`).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Deserialize;

use crate::cycle_state::CycleState;
use crate::plugin::registry::PluginHandle;
use crate::plugin::{Filter, Plugin, TypedName};
use crate::types::{Pod, Request};

/// Type name of the [`ByLabelSelector`] filter.
pub const BY_LABEL_SELECTOR_TYPE: &str = "by-label-selector";

/// Operator of a single selector requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// One set-based requirement against a label key.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
    #[serde(default)]
    pub values: Vec<String>,
}

impl Requirement {
    fn validate(&self) -> anyhow::Result<()> {
        match self.operator {
            Operator::In | Operator::NotIn if self.values.is_empty() => Err(anyhow::anyhow!(
                "selector requirement on '{}': operator {:?} needs at least one value",
                self.key,
                self.operator
            )),
            Operator::Exists | Operator::DoesNotExist if !self.values.is_empty() => {
                Err(anyhow::anyhow!(
                    "selector requirement on '{}': operator {:?} takes no values",
                    self.key,
                    self.operator
                ))
            }
            _ => Ok(()),
        }
    }

    fn matches(&self, labels: &HashMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::In => value.is_some_and(|v| self.values.iter().any(|want| want == v)),
            // A pod without the key satisfies NotIn, per the Kubernetes
            // selector semantics.
            Operator::NotIn => value.is_none_or(|v| !self.values.iter().any(|want| want == v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

/// A set-based label selector.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
    pub match_expressions: Vec<Requirement>,
}

impl LabelSelector {
    /// True when the labels satisfy every equality and every requirement.
    /// The empty selector matches everything.
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(key, want)| labels.get(key) == Some(want))
            && self.match_expressions.iter().all(|req| req.matches(labels))
    }

    fn validate(&self) -> anyhow::Result<()> {
        for requirement in &self.match_expressions {
            requirement.validate()?;
        }
        Ok(())
    }
}

/// Factory for the `by-label-selector` filter.
pub fn factory(
    name: &str,
    parameters: Option<&serde_json::Value>,
    _handle: &PluginHandle,
) -> anyhow::Result<Arc<dyn Plugin>> {
    let selector: LabelSelector = match parameters {
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
            anyhow::anyhow!(
                "failed to parse the parameters of the '{BY_LABEL_SELECTOR_TYPE}' filter: {e}"
            )
        })?,
        None => LabelSelector::default(),
    };

    Ok(Arc::new(ByLabelSelector::new(name, selector)?))
}

/// Keeps pods whose labels satisfy the configured selector.
pub struct ByLabelSelector {
    typed_name: TypedName,
    selector: LabelSelector,
}

impl ByLabelSelector {
    pub fn new(name: &str, selector: LabelSelector) -> anyhow::Result<Self> {
        selector.validate()?;
        Ok(Self {
            typed_name: TypedName::new(BY_LABEL_SELECTOR_TYPE, name),
            selector,
        })
    }
}

impl Plugin for ByLabelSelector {
    fn typed_name(&self) -> &TypedName {
        &self.typed_name
    }

    fn as_filter(&self) -> Option<&dyn Filter> {
        Some(self)
    }
}

impl Filter for ByLabelSelector {
    fn filter(
        &self,
        _state: &CycleState,
        _request: &Request,
        pods: Vec<Arc<Pod>>,
    ) -> Vec<Arc<Pod>> {
        pods.into_iter()
            .filter(|pod| self.selector.matches(&pod.labels))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_selector_matches_everything() {
        let selector = LabelSelector::default();
        assert!(selector.matches(&labels(&[])));
        assert!(selector.matches(&labels(&[("a", "b")])));
    }

    #[test]
    fn match_labels_is_conjunctive() {
        let selector = LabelSelector {
            match_labels: BTreeMap::from([
                ("app".to_string(), "vllm".to_string()),
                ("tier".to_string(), "gold".to_string()),
            ]),
            match_expressions: Vec::new(),
        };
        assert!(selector.matches(&labels(&[("app", "vllm"), ("tier", "gold")])));
        assert!(!selector.matches(&labels(&[("app", "vllm")])));
    }

    #[test]
    fn set_based_operators() {
        let in_req = Requirement {
            key: "tier".to_string(),
            operator: Operator::In,
            values: vec!["gold".to_string(), "silver".to_string()],
        };
        assert!(in_req.matches(&labels(&[("tier", "gold")])));
        assert!(!in_req.matches(&labels(&[("tier", "bronze")])));
        assert!(!in_req.matches(&labels(&[])));

        let not_in = Requirement {
            key: "tier".to_string(),
            operator: Operator::NotIn,
            values: vec!["bronze".to_string()],
        };
        assert!(not_in.matches(&labels(&[("tier", "gold")])));
        assert!(not_in.matches(&labels(&[]))); // absent key satisfies NotIn
        assert!(!not_in.matches(&labels(&[("tier", "bronze")])));

        let exists = Requirement {
            key: "gpu".to_string(),
            operator: Operator::Exists,
            values: Vec::new(),
        };
        assert!(exists.matches(&labels(&[("gpu", "a100")])));
        assert!(!exists.matches(&labels(&[])));

        let absent = Requirement {
            key: "gpu".to_string(),
            operator: Operator::DoesNotExist,
            values: Vec::new(),
        };
        assert!(absent.matches(&labels(&[])));
        assert!(!absent.matches(&labels(&[("gpu", "a100")])));
    }

    #[test]
    fn invalid_requirements_fail_construction() {
        let selector = LabelSelector {
            match_labels: BTreeMap::new(),
            match_expressions: vec![Requirement {
                key: "tier".to_string(),
                operator: Operator::In,
                values: Vec::new(),
            }],
        };
        assert!(ByLabelSelector::new("f", selector).is_err());

        let selector = LabelSelector {
            match_labels: BTreeMap::new(),
            match_expressions: vec![Requirement {
                key: "tier".to_string(),
                operator: Operator::Exists,
                values: vec!["spurious".to_string()],
            }],
        };
        assert!(ByLabelSelector::new("f", selector).is_err());
    }
}
