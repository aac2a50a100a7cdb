// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The scheduling engine.
//!
//! A [`SchedulerProfile`] is one ordered composition of filters, weighted
//! scorers and a picker; the [`Scheduler`] loops over the profile
//! handler's choices, runs the selected profiles against the candidate
//! pods and hands the per-profile outcomes back to the handler for the
//! final scheduling result.
//!
//! Every request gets a fresh cycle state and its own call; many requests
//! schedule in parallel, but one cycle runs its stages to completion with
//! no internal suspension beyond the scorers' external boundaries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::cycle_state::CycleState;
use crate::error::SchedulingError;
use crate::plugin::Plugin;
use crate::types::{NamespacedName, Pod, ProfileRunResult, Request, SchedulingResult, ScoredPod};

/// A scorer reference within a profile, with its configured weight.
pub struct WeightedScorer {
    pub plugin: Arc<dyn Plugin>,
    pub weight: i64,
}

/// Ordered composition of filters, weighted scorers and one picker.
pub struct SchedulerProfile {
    name: String,
    filters: Vec<Arc<dyn Plugin>>,
    scorers: Vec<WeightedScorer>,
    picker: Option<Arc<dyn Plugin>>,
}

impl SchedulerProfile {
    pub fn new(
        name: impl Into<String>,
        filters: Vec<Arc<dyn Plugin>>,
        scorers: Vec<WeightedScorer>,
        picker: Arc<dyn Plugin>,
    ) -> Self {
        Self {
            name: name.into(),
            filters,
            scorers,
            picker: Some(picker),
        }
    }

    #[cfg(test)]
    pub(crate) fn empty_for_tests(name: &str) -> Self {
        Self {
            name: name.to_string(),
            filters: Vec::new(),
            scorers: Vec::new(),
            picker: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the profile against the candidates: filters in declared
    /// order, then every scorer over the survivors with weighted-sum
    /// aggregation, then the picker.
    pub async fn run(
        &self,
        token: &CancellationToken,
        state: &mut CycleState,
        request: &Request,
        candidates: Vec<Arc<Pod>>,
    ) -> Result<ProfileRunResult, SchedulingError> {
        let mut pods = candidates;
        for plugin in &self.filters {
            let Some(filter) = plugin.as_filter() else {
                tracing::error!(plugin = %plugin.typed_name(), "configured filter lost its capability");
                continue;
            };
            pods = filter.filter(state, request, pods);
            if pods.is_empty() {
                return Err(SchedulingError::NoCandidates(self.name.clone()));
            }
        }

        let mut totals: HashMap<NamespacedName, f64> = pods
            .iter()
            .map(|pod| (pod.namespaced_name.clone(), 0.0))
            .collect();
        for weighted in &self.scorers {
            let Some(scorer) = weighted.plugin.as_scorer() else {
                tracing::error!(plugin = %weighted.plugin.typed_name(), "configured scorer lost its capability");
                continue;
            };
            let scores = scorer.score(token, state, request, &pods).await;
            for (pod, score) in scores {
                if let Some(total) = totals.get_mut(&pod) {
                    *total += weighted.weight as f64 * score;
                }
            }
        }

        let scored: Vec<ScoredPod> = pods
            .into_iter()
            .map(|pod| {
                let score = totals.get(&pod.namespaced_name).copied().unwrap_or(0.0);
                ScoredPod { pod, score }
            })
            .collect();

        let Some(picker) = self.picker.as_ref().and_then(|plugin| plugin.as_picker()) else {
            return Err(SchedulingError::Internal(format!(
                "profile '{}' has no picker",
                self.name
            )));
        };
        let result = picker.pick(state, scored);
        if result.target_pods.is_empty() {
            return Err(SchedulingError::NoCandidates(self.name.clone()));
        }
        Ok(result)
    }
}

/// Top-level engine: one instance serves every request concurrently.
pub struct Scheduler {
    profiles: HashMap<String, SchedulerProfile>,
    handler: Arc<dyn Plugin>,
}

impl Scheduler {
    /// `handler` must expose the profile-handler capability; the
    /// configuration loader guarantees it.
    pub fn new(profiles: HashMap<String, SchedulerProfile>, handler: Arc<dyn Plugin>) -> Self {
        Self { profiles, handler }
    }

    pub fn profiles(&self) -> &HashMap<String, SchedulerProfile> {
        &self.profiles
    }

    /// Schedules one request over the candidate pods.
    pub async fn schedule(
        &self,
        token: &CancellationToken,
        request: &Request,
        candidates: &[Arc<Pod>],
    ) -> Result<SchedulingResult, SchedulingError> {
        let started = Instant::now();
        let mut state = CycleState::new();
        let mut results: HashMap<String, Option<ProfileRunResult>> = HashMap::new();

        let Some(handler) = self.handler.as_profile_handler() else {
            return Err(SchedulingError::Internal(
                "configured profile handler lost its capability".to_string(),
            ));
        };

        // The handler must make monotonic progress; one iteration per
        // profile bounds the loop even against a faulty handler.
        for _ in 0..self.profiles.len() {
            let picked = handler.pick_profiles(&state, request, &self.profiles, &results);
            if picked.is_empty() {
                break;
            }

            for name in picked {
                if results.contains_key(&name) {
                    tracing::warn!(profile = %name, "handler picked an already-run profile, skipping");
                    continue;
                }
                let Some(profile) = self.profiles.get(&name) else {
                    tracing::warn!(profile = %name, "handler picked an unknown profile, skipping");
                    continue;
                };

                match profile
                    .run(token, &mut state, request, candidates.to_vec())
                    .await
                {
                    Ok(result) => {
                        results.insert(name, Some(result));
                    }
                    Err(e) => {
                        tracing::warn!(profile = %name, error = %e, "profile run failed");
                        results.insert(name, None);
                    }
                }
            }
        }

        let result = handler
            .process_results(&state, request, results)
            .map_err(SchedulingError::Handler)?;

        tracing::debug!(
            request_id = %request.request_id,
            primary_profile = %result.primary_profile_name,
            elapsed_us = started.elapsed().as_micros() as u64,
            "scheduling cycle complete"
        );
        Ok(result)
    }
}
