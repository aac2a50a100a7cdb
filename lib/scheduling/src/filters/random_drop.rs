// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use rand::Rng;
use serde::Deserialize;

use crate::cycle_state::CycleState;
use crate::plugin::registry::PluginHandle;
use crate::plugin::{Filter, Plugin, TypedName};
use crate::types::{Pod, Request};

/// Type name of the [`RandomDrop`] filter.
pub const RANDOM_DROP_FILTER_TYPE: &str = "random-drop-filter";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RandomDropParameters {
    probability: f64,
}

/// Factory for the `random-drop-filter`.
pub fn factory(
    name: &str,
    parameters: Option<&serde_json::Value>,
    _handle: &PluginHandle,
) -> anyhow::Result<Arc<dyn Plugin>> {
    let parameters: RandomDropParameters = match parameters {
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
            anyhow::anyhow!(
                "failed to parse the parameters of the '{RANDOM_DROP_FILTER_TYPE}' filter: {e}"
            )
        })?,
        None => RandomDropParameters::default(),
    };
    if !(0.0..=1.0).contains(&parameters.probability) {
        anyhow::bail!(
            "'{RANDOM_DROP_FILTER_TYPE}' probability must be within [0, 1], got {}",
            parameters.probability
        );
    }

    Ok(Arc::new(RandomDrop {
        typed_name: TypedName::new(RANDOM_DROP_FILTER_TYPE, name),
        probability: parameters.probability,
    }))
}

/// Independently drops each pod with the configured probability.
/// Testing only.
pub struct RandomDrop {
    typed_name: TypedName,
    probability: f64,
}

impl Plugin for RandomDrop {
    fn typed_name(&self) -> &TypedName {
        &self.typed_name
    }

    fn as_filter(&self) -> Option<&dyn Filter> {
        Some(self)
    }
}

impl Filter for RandomDrop {
    fn filter(
        &self,
        _state: &CycleState,
        _request: &Request,
        pods: Vec<Arc<Pod>>,
    ) -> Vec<Arc<Pod>> {
        let mut rng = rand::rng();
        pods.into_iter()
            .filter(|pod| {
                let keep = rng.random::<f64>() >= self.probability;
                if !keep {
                    tracing::debug!(pod = %pod.namespaced_name, "dropped");
                }
                keep
            })
            .collect()
    }
}
