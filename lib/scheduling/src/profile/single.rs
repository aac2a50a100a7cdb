// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use crate::cycle_state::CycleState;
use crate::plugin::registry::PluginHandle;
use crate::plugin::{Plugin, ProfileHandler, TypedName};
use crate::scheduler::SchedulerProfile;
use crate::types::{ProfileRunResult, Request, SchedulingResult};

/// Type name of the [`SingleProfileHandler`].
pub const SINGLE_PROFILE_HANDLER_TYPE: &str = "single-profile-handler";

/// Factory for the `single-profile-handler`.
pub fn factory(
    name: &str,
    _parameters: Option<&serde_json::Value>,
    _handle: &PluginHandle,
) -> anyhow::Result<Arc<dyn Plugin>> {
    Ok(Arc::new(SingleProfileHandler {
        typed_name: TypedName::new(SINGLE_PROFILE_HANDLER_TYPE, name),
    }))
}

/// Handler for configurations with exactly one profile: the first call
/// runs it, subsequent calls end the loop, and its run result becomes the
/// primary.
pub struct SingleProfileHandler {
    typed_name: TypedName,
}

impl Plugin for SingleProfileHandler {
    fn typed_name(&self) -> &TypedName {
        &self.typed_name
    }

    fn as_profile_handler(&self) -> Option<&dyn ProfileHandler> {
        Some(self)
    }
}

impl ProfileHandler for SingleProfileHandler {
    fn pick_profiles(
        &self,
        _state: &CycleState,
        _request: &Request,
        profiles: &HashMap<String, SchedulerProfile>,
        results: &HashMap<String, Option<ProfileRunResult>>,
    ) -> Vec<String> {
        profiles
            .keys()
            .filter(|name| !results.contains_key(*name))
            .cloned()
            .collect()
    }

    fn process_results(
        &self,
        _state: &CycleState,
        _request: &Request,
        results: HashMap<String, Option<ProfileRunResult>>,
    ) -> anyhow::Result<SchedulingResult> {
        let (name, result) = results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no scheduler profile was run"))?;
        let result =
            result.ok_or_else(|| anyhow::anyhow!("failed to run scheduler profile '{name}'"))?;

        Ok(SchedulingResult {
            primary_profile_name: name.clone(),
            profile_results: HashMap::from([(name, result)]),
        })
    }
}
