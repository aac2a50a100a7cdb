// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use crate::cycle_state::CycleState;
use crate::plugin::registry::PluginHandle;
use crate::plugin::{Filter, Plugin, TypedName};
use crate::types::{Pod, Request};

/// Type name of the [`Passthrough`] filter.
pub const PASSTHROUGH_FILTER_TYPE: &str = "passthrough-filter";

/// Factory for the `passthrough-filter`.
pub fn factory(
    name: &str,
    _parameters: Option<&serde_json::Value>,
    _handle: &PluginHandle,
) -> anyhow::Result<Arc<dyn Plugin>> {
    Ok(Arc::new(Passthrough {
        typed_name: TypedName::new(PASSTHROUGH_FILTER_TYPE, name),
    }))
}

/// Identity filter, useful for composition and testing.
pub struct Passthrough {
    typed_name: TypedName,
}

impl Plugin for Passthrough {
    fn typed_name(&self) -> &TypedName {
        &self.typed_name
    }

    fn as_filter(&self) -> Option<&dyn Filter> {
        Some(self)
    }
}

impl Filter for Passthrough {
    fn filter(
        &self,
        _state: &CycleState,
        _request: &Request,
        pods: Vec<Arc<Pod>>,
    ) -> Vec<Arc<Pod>> {
        tracing::debug!(candidates = pods.len(), "passthrough filter called");
        pods
    }
}
