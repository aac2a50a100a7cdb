// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use rand::Rng;

use crate::cycle_state::CycleState;
use crate::plugin::registry::PluginHandle;
use crate::plugin::{Picker, Plugin, TypedName};
use crate::types::{ProfileRunResult, ScoredPod};

/// Type name of the [`MaxScorePicker`].
pub const MAX_SCORE_PICKER_TYPE: &str = "max-score-picker";

/// Factory for the `max-score-picker`.
pub fn factory(
    name: &str,
    _parameters: Option<&serde_json::Value>,
    _handle: &PluginHandle,
) -> anyhow::Result<Arc<dyn Plugin>> {
    Ok(Arc::new(MaxScorePicker {
        typed_name: TypedName::new(MAX_SCORE_PICKER_TYPE, name),
    }))
}

/// Picks the single highest-scored pod, breaking ties uniformly at random.
pub struct MaxScorePicker {
    typed_name: TypedName,
}

impl Plugin for MaxScorePicker {
    fn typed_name(&self) -> &TypedName {
        &self.typed_name
    }

    fn as_picker(&self) -> Option<&dyn Picker> {
        Some(self)
    }
}

impl Picker for MaxScorePicker {
    fn pick(&self, _state: &mut CycleState, scored: Vec<ScoredPod>) -> ProfileRunResult {
        let Some(max_score) = scored
            .iter()
            .map(|candidate| candidate.score)
            .fold(None, |acc: Option<f64>, score| {
                Some(acc.map_or(score, |best| best.max(score)))
            })
        else {
            return ProfileRunResult::default();
        };

        let mut tied: Vec<ScoredPod> = scored
            .into_iter()
            .filter(|candidate| candidate.score == max_score)
            .collect();
        let chosen = tied.swap_remove(rand::rng().random_range(0..tied.len()));

        tracing::debug!(
            pod = %chosen.pod.namespaced_name,
            score = chosen.score,
            "picked max-score pod"
        );
        ProfileRunResult {
            target_pods: vec![chosen],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MetricsSnapshot, NamespacedName, Pod};
    use std::collections::HashMap;

    fn scored(name: &str, score: f64) -> ScoredPod {
        ScoredPod {
            pod: Arc::new(Pod {
                namespaced_name: NamespacedName::new("default", name),
                address: "10.0.0.1".to_string(),
                labels: HashMap::new(),
                metrics: MetricsSnapshot::default(),
            }),
            score,
        }
    }

    fn picker() -> MaxScorePicker {
        MaxScorePicker {
            typed_name: TypedName::new(MAX_SCORE_PICKER_TYPE, "picker"),
        }
    }

    #[test]
    fn picks_the_argmax() {
        let result = picker().pick(
            &mut CycleState::new(),
            vec![scored("a", 0.2), scored("b", 0.9), scored("c", 0.5)],
        );
        assert_eq!(result.target_pod().unwrap().namespaced_name.name, "b");
    }

    #[test]
    fn empty_candidates_yield_empty_result() {
        let result = picker().pick(&mut CycleState::new(), Vec::new());
        assert!(result.target_pod().is_none());
    }

    #[test]
    fn ties_stay_within_the_tied_set() {
        for _ in 0..32 {
            let result = picker().pick(
                &mut CycleState::new(),
                vec![scored("a", 0.9), scored("b", 0.9), scored("c", 0.1)],
            );
            let name = &result.target_pod().unwrap().namespaced_name.name;
            assert!(name == "a" || name == "b");
        }
    }
}
