// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Prefill/decode disaggregation profile handler.
//!
//! Decode always runs first. Prefill is an optimization, run only when the
//! part of the prompt *not* already warm on the chosen decode pod is long
//! enough to be worth ingesting elsewhere; warmth comes from the prefix
//! scorer's cycle-state entry, so no re-hashing happens here. A prefill
//! failure never denies service: the decode result alone is returned.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::cycle_state::CycleState;
use crate::plugin::registry::PluginHandle;
use crate::plugin::{Plugin, ProfileHandler, TypedName};
use crate::scheduler::SchedulerProfile;
use crate::scorers::prefix_cache::{PREFIX_CACHE_SCORER_TYPE, PrefixCacheState};
use crate::types::{ProfileRunResult, Request, SchedulingResult};

/// Type name of the [`PdProfileHandler`].
pub const PD_PROFILE_HANDLER_TYPE: &str = "pd-profile-handler";

const DEFAULT_DECODE_PROFILE: &str = "decode";
const DEFAULT_PREFILL_PROFILE: &str = "prefill";
const DEFAULT_THRESHOLD: usize = 100;
const DEFAULT_BLOCK_SIZE: usize = epp_prefix_index::store::DEFAULT_BLOCK_SIZE;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PdParameters {
    decode_profile: String,
    prefill_profile: String,
    /// Instance name of the prefix-cache scorer whose cycle-state entry
    /// carries the per-pod block hits.
    prefix_plugin_name: String,
    /// Bytes of non-cached prompt suffix below which prefill is skipped.
    threshold: usize,
    /// Must equal the prefix scorer's block size.
    block_size: usize,
}

impl Default for PdParameters {
    fn default() -> Self {
        Self {
            decode_profile: DEFAULT_DECODE_PROFILE.to_string(),
            prefill_profile: DEFAULT_PREFILL_PROFILE.to_string(),
            prefix_plugin_name: PREFIX_CACHE_SCORER_TYPE.to_string(),
            threshold: DEFAULT_THRESHOLD,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Factory for the `pd-profile-handler`.
pub fn factory(
    name: &str,
    parameters: Option<&serde_json::Value>,
    _handle: &PluginHandle,
) -> anyhow::Result<Arc<dyn Plugin>> {
    let parameters: PdParameters = match parameters {
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
            anyhow::anyhow!(
                "failed to parse the parameters of the '{PD_PROFILE_HANDLER_TYPE}' profile handler: {e}"
            )
        })?,
        None => PdParameters::default(),
    };

    Ok(Arc::new(PdProfileHandler {
        typed_name: TypedName::new(PD_PROFILE_HANDLER_TYPE, name),
        parameters,
    }))
}

/// Two-phase profile handler for prefill/decode disaggregation.
pub struct PdProfileHandler {
    typed_name: TypedName,
    parameters: PdParameters,
}

impl PdProfileHandler {
    /// Fraction of the prompt already warm on the chosen decode pod,
    /// according to the prefix scorer's published hit counts.
    fn hit_percentage(
        &self,
        state: &CycleState,
        request: &Request,
        decode_result: &ProfileRunResult,
    ) -> f64 {
        let prefix_state = match state.read::<PrefixCacheState>(&self.parameters.prefix_plugin_name)
        {
            Ok(prefix_state) => prefix_state,
            Err(e) => {
                tracing::error!(error = %e, "unable to read prefix state");
                return 0.0;
            }
        };
        let Some(decode_pod) = decode_result.target_pod() else {
            return 0.0;
        };
        if request.prompt.is_empty() {
            return 0.0;
        }

        let block_hits = prefix_state
            .prefix_cache_servers
            .get(&decode_pod.namespaced_name)
            .copied()
            .unwrap_or(0);
        // The first hit is always the model-name seed.
        let hit_blocks = block_hits.saturating_sub(1);
        (hit_blocks * self.parameters.block_size) as f64 / request.prompt.len() as f64
    }
}

impl Plugin for PdProfileHandler {
    fn typed_name(&self) -> &TypedName {
        &self.typed_name
    }

    fn as_profile_handler(&self) -> Option<&dyn ProfileHandler> {
        Some(self)
    }
}

impl ProfileHandler for PdProfileHandler {
    fn pick_profiles(
        &self,
        state: &CycleState,
        request: &Request,
        profiles: &HashMap<String, SchedulerProfile>,
        results: &HashMap<String, Option<ProfileRunResult>>,
    ) -> Vec<String> {
        let decode = &self.parameters.decode_profile;
        if !results.contains_key(decode) {
            // Decode runs first, unconditionally.
            return vec![decode.clone()];
        }

        // When a profile run fails its result is None; a failed decode
        // ends the cycle here and is surfaced by process_results.
        let decode_result = match results.get(decode) {
            Some(Some(decode_result)) => decode_result,
            _ => return Vec::new(),
        };
        if profiles.len() == results.len() {
            return Vec::new(); // every configured profile already ran
        }

        let hit_percentage = self.hit_percentage(state, request, decode_result);
        let non_cached_bytes = (1.0 - hit_percentage) * request.prompt.len() as f64;
        if non_cached_bytes < self.parameters.threshold as f64 {
            tracing::debug!(
                hit_percentage,
                "non-cached suffix is smaller than threshold, using decode profile only"
            );
            return Vec::new();
        }

        vec![self.parameters.prefill_profile.clone()]
    }

    fn process_results(
        &self,
        _state: &CycleState,
        _request: &Request,
        mut results: HashMap<String, Option<ProfileRunResult>>,
    ) -> anyhow::Result<SchedulingResult> {
        let decode = &self.parameters.decode_profile;
        let Some(decode_result) = results.remove(decode).flatten() else {
            anyhow::bail!("failed to find available decode workers");
        };

        let mut profile_results =
            HashMap::from([(decode.clone(), decode_result)]);
        // A prefill failure is logged and discarded: disaggregation is an
        // optimization, decode alone still serves the request.
        match results.remove(&self.parameters.prefill_profile).flatten() {
            Some(prefill_result) => {
                profile_results.insert(self.parameters.prefill_profile.clone(), prefill_result);
            }
            None => {
                tracing::debug!("no prefill result, returning decode only");
            }
        }

        Ok(SchedulingResult {
            primary_profile_name: decode.clone(),
            profile_results,
        })
    }
}
