// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::cycle_state::CycleState;
use crate::plugin::registry::PluginHandle;
use crate::plugin::{Plugin, Scorer, TypedName};
use crate::types::{NamespacedName, Pod, Request};

/// Type name of the [`LoadAware`] scorer.
pub const LOAD_AWARE_TYPE: &str = "load-aware-scorer";

/// Default waiting-queue depth at which a pod scores zero.
pub const QUEUE_THRESHOLD_DEFAULT: usize = 128;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LoadAwareParameters {
    threshold: i64,
}

impl Default for LoadAwareParameters {
    fn default() -> Self {
        Self {
            threshold: QUEUE_THRESHOLD_DEFAULT as i64,
        }
    }
}

/// Factory for the `load-aware-scorer`.
pub fn factory(
    name: &str,
    parameters: Option<&serde_json::Value>,
    _handle: &PluginHandle,
) -> anyhow::Result<Arc<dyn Plugin>> {
    let parameters: LoadAwareParameters = match parameters {
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
            anyhow::anyhow!("failed to parse the parameters of the '{LOAD_AWARE_TYPE}' scorer: {e}")
        })?,
        None => LoadAwareParameters::default(),
    };

    Ok(Arc::new(LoadAware::new(name, parameters.threshold)))
}

/// Scores pods by waiting-queue depth.
///
/// A pod with an empty queue scores 0.5; queued pods fall linearly from
/// 0.5 towards 0 at the threshold. The upper half of the range is reserved
/// for future capacity signals.
pub struct LoadAware {
    typed_name: TypedName,
    queue_threshold: f64,
}

impl LoadAware {
    pub fn new(name: &str, queue_threshold: i64) -> Self {
        let queue_threshold = if queue_threshold <= 0 {
            tracing::info!(
                configured = queue_threshold,
                default = QUEUE_THRESHOLD_DEFAULT,
                "queue threshold should be positive, using default"
            );
            QUEUE_THRESHOLD_DEFAULT as f64
        } else {
            queue_threshold as f64
        };

        Self {
            typed_name: TypedName::new(LOAD_AWARE_TYPE, name),
            queue_threshold,
        }
    }
}

impl Plugin for LoadAware {
    fn typed_name(&self) -> &TypedName {
        &self.typed_name
    }

    fn as_scorer(&self) -> Option<&dyn Scorer> {
        Some(self)
    }
}

#[async_trait]
impl Scorer for LoadAware {
    async fn score(
        &self,
        _token: &CancellationToken,
        _state: &mut CycleState,
        _request: &Request,
        pods: &[Arc<Pod>],
    ) -> HashMap<NamespacedName, f64> {
        pods.iter()
            .map(|pod| {
                let waiting = pod.metrics.waiting_queue_size as f64;
                let score = if waiting == 0.0 {
                    0.5
                } else {
                    0.5 * (1.0 - waiting.min(self.queue_threshold) / self.queue_threshold)
                };
                (pod.namespaced_name.clone(), score)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetricsSnapshot;

    fn pod(name: &str, waiting: usize) -> Arc<Pod> {
        Arc::new(Pod {
            namespaced_name: NamespacedName::new("default", name),
            address: "10.0.0.1".to_string(),
            labels: HashMap::new(),
            metrics: MetricsSnapshot {
                waiting_queue_size: waiting,
                ..MetricsSnapshot::default()
            },
        })
    }

    async fn score_of(scorer: &LoadAware, pod: Arc<Pod>) -> f64 {
        let request = Request {
            request_id: "req".to_string(),
            target_model: "m".to_string(),
            prompt: String::new(),
            headers: HashMap::new(),
        };
        let scores = scorer
            .score(
                &CancellationToken::new(),
                &mut CycleState::new(),
                &request,
                &[pod.clone()],
            )
            .await;
        scores[&pod.namespaced_name]
    }

    #[tokio::test]
    async fn idle_pod_scores_half() {
        let scorer = LoadAware::new("load", 128);
        assert_eq!(score_of(&scorer, pod("a", 0)).await, 0.5);
    }

    #[tokio::test]
    async fn saturated_pod_scores_zero() {
        let scorer = LoadAware::new("load", 128);
        assert_eq!(score_of(&scorer, pod("a", 128)).await, 0.0);
        // Beyond the threshold is clamped.
        assert_eq!(score_of(&scorer, pod("b", 4096)).await, 0.0);
    }

    #[tokio::test]
    async fn queued_pod_scores_between() {
        let scorer = LoadAware::new("load", 128);
        let score = score_of(&scorer, pod("a", 64)).await;
        assert_eq!(score, 0.25);
    }

    #[tokio::test]
    async fn non_positive_threshold_falls_back_to_default() {
        let scorer = LoadAware::new("load", 0);
        assert_eq!(score_of(&scorer, pod("a", 128)).await, 0.0);
    }
}
