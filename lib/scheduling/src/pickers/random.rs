// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use rand::Rng;

use crate::cycle_state::CycleState;
use crate::plugin::registry::PluginHandle;
use crate::plugin::{Picker, Plugin, TypedName};
use crate::types::{ProfileRunResult, ScoredPod};

/// Type name of the [`RandomPicker`].
pub const RANDOM_PICKER_TYPE: &str = "random-picker";

/// Factory for the `random-picker`.
pub fn factory(
    name: &str,
    _parameters: Option<&serde_json::Value>,
    _handle: &PluginHandle,
) -> anyhow::Result<Arc<dyn Plugin>> {
    Ok(Arc::new(RandomPicker {
        typed_name: TypedName::new(RANDOM_PICKER_TYPE, name),
    }))
}

/// Picks one pod uniformly at random, ignoring scores.
pub struct RandomPicker {
    typed_name: TypedName,
}

impl Plugin for RandomPicker {
    fn typed_name(&self) -> &TypedName {
        &self.typed_name
    }

    fn as_picker(&self) -> Option<&dyn Picker> {
        Some(self)
    }
}

impl Picker for RandomPicker {
    fn pick(&self, _state: &mut CycleState, mut scored: Vec<ScoredPod>) -> ProfileRunResult {
        if scored.is_empty() {
            return ProfileRunResult::default();
        }
        let chosen = scored.swap_remove(rand::rng().random_range(0..scored.len()));
        ProfileRunResult {
            target_pods: vec![chosen],
        }
    }
}
