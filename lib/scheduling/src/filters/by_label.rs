// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;

use crate::cycle_state::CycleState;
use crate::plugin::registry::PluginHandle;
use crate::plugin::{Filter, Plugin, TypedName};
use crate::types::{Pod, Request};

/// Type name of the [`ByLabel`] filter.
pub const BY_LABEL_TYPE: &str = "by-label";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ByLabelParameters {
    label: String,
    valid_values: Vec<String>,
    allows_no_label: bool,
}

/// Factory for the `by-label` filter.
pub fn factory(
    name: &str,
    parameters: Option<&serde_json::Value>,
    _handle: &PluginHandle,
) -> anyhow::Result<Arc<dyn Plugin>> {
    let parameters: ByLabelParameters = match parameters {
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
            anyhow::anyhow!("failed to parse the parameters of the '{BY_LABEL_TYPE}' filter: {e}")
        })?,
        None => ByLabelParameters::default(),
    };

    Ok(Arc::new(ByLabel::new(
        name,
        parameters.label,
        parameters.allows_no_label,
        parameters.valid_values,
    )))
}

/// Keeps pods whose value at the configured label is one of the valid
/// values, or, when `allows_no_label` is set, pods without the label.
pub struct ByLabel {
    typed_name: TypedName,
    label: String,
    valid_values: HashSet<String>,
    allows_no_label: bool,
}

impl ByLabel {
    pub fn new(
        name: &str,
        label: impl Into<String>,
        allows_no_label: bool,
        valid_values: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            typed_name: TypedName::new(BY_LABEL_TYPE, name),
            label: label.into(),
            valid_values: valid_values.into_iter().collect(),
            allows_no_label,
        }
    }

    /// Same filter registered under a wrapper type name (the role filters).
    pub(crate) fn with_type(mut self, plugin_type: &'static str) -> Self {
        self.typed_name.plugin_type = plugin_type;
        self
    }
}

impl Plugin for ByLabel {
    fn typed_name(&self) -> &TypedName {
        &self.typed_name
    }

    fn as_filter(&self) -> Option<&dyn Filter> {
        Some(self)
    }
}

impl Filter for ByLabel {
    fn filter(
        &self,
        _state: &CycleState,
        _request: &Request,
        pods: Vec<Arc<Pod>>,
    ) -> Vec<Arc<Pod>> {
        pods.into_iter()
            .filter(|pod| match pod.labels.get(&self.label) {
                Some(value) => self.valid_values.contains(value),
                None => self.allows_no_label,
            })
            .collect()
    }
}
