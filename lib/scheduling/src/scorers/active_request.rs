// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tracks in-flight requests per pod and spreads new requests away from
//! busy pods.
//!
//! Every dispatched request is held in a TTL cache under a
//! `podName.requestId` key with a mirror per-pod counter for fast scoring.
//! Most entries are removed by the post-response hook; the TTL plus the
//! eviction callback guarantee the counters do not leak when a response
//! never arrives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::notification::RemovalCause;
use moka::sync::Cache;
use parking_lot::RwLock;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::cycle_state::CycleState;
use crate::plugin::registry::PluginHandle;
use crate::plugin::{Plugin, PostResponse, PreRequest, Scorer, TypedName};
use crate::types::{NamespacedName, Pod, Request, SchedulingResult};

/// Type name of the [`ActiveRequest`] scorer.
pub const ACTIVE_REQUEST_TYPE: &str = "active-request-scorer";

/// Default time after which an in-flight request is considered stale and
/// dropped from the tracker.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ActiveRequestParameters {
    /// Duration string ("30s", "2m", "1h") after which an in-flight
    /// request is considered timed out and dropped.
    request_timeout: Option<String>,
}

#[derive(Debug, Clone)]
struct RequestEntry {
    pod_name: String,
    request_id: String,
}

impl RequestEntry {
    fn key(&self) -> String {
        format!("{}.{}", self.pod_name, self.request_id)
    }
}

type PodCounts = Arc<RwLock<HashMap<String, usize>>>;

/// Factory for the `active-request-scorer`.
pub fn factory(
    name: &str,
    parameters: Option<&serde_json::Value>,
    handle: &PluginHandle,
) -> anyhow::Result<Arc<dyn Plugin>> {
    let parameters: ActiveRequestParameters = match parameters {
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
            anyhow::anyhow!(
                "failed to parse the parameters of the '{ACTIVE_REQUEST_TYPE}' scorer: {e}"
            )
        })?,
        None => ActiveRequestParameters::default(),
    };

    let request_timeout = match parameters.request_timeout.as_deref() {
        None | Some("") => DEFAULT_REQUEST_TIMEOUT,
        Some(raw) => match humantime::parse_duration(raw) {
            Ok(timeout) if !timeout.is_zero() => timeout,
            Ok(_) | Err(_) => {
                tracing::error!(
                    configured = raw,
                    "invalid request timeout duration, using default request timeout"
                );
                DEFAULT_REQUEST_TIMEOUT
            }
        },
    };

    Ok(Arc::new(ActiveRequest::new(
        name,
        request_timeout,
        handle.token.clone(),
    )))
}

/// Scores pods by the number of requests currently in flight on each.
pub struct ActiveRequest {
    typed_name: TypedName,
    request_cache: Cache<String, RequestEntry>,
    pod_counts: PodCounts,
}

impl ActiveRequest {
    /// Creates the tracker and spawns its periodic expired-entry drain.
    /// Must be called within a tokio runtime.
    pub fn new(name: &str, request_timeout: Duration, token: CancellationToken) -> Self {
        let pod_counts: PodCounts = Arc::new(RwLock::new(HashMap::new()));

        // Expiry callback keeps the counters honest when a response never
        // arrives: explicit removals decrement in post_response instead.
        let counts_on_evict = pod_counts.clone();
        let request_cache: Cache<String, RequestEntry> = Cache::builder()
            .time_to_live(request_timeout)
            .eviction_listener(move |_key, entry: RequestEntry, cause| {
                if cause == RemovalCause::Expired {
                    decrement_pod_count(&counts_on_evict, &entry.pod_name);
                }
            })
            .build();

        let drain_cache = request_cache.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(request_timeout);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => drain_cache.run_pending_tasks(),
                }
            }
        });

        Self {
            typed_name: TypedName::new(ACTIVE_REQUEST_TYPE, name),
            request_cache,
            pod_counts,
        }
    }

    #[cfg(test)]
    fn drain_expired(&self) {
        self.request_cache.run_pending_tasks();
    }

    #[cfg(test)]
    fn count_for(&self, pod_name: &str) -> usize {
        self.pod_counts.read().get(pod_name).copied().unwrap_or(0)
    }
}

fn increment_pod_count(counts: &PodCounts, pod_name: &str) {
    *counts.write().entry(pod_name.to_string()).or_insert(0) += 1;
}

fn decrement_pod_count(counts: &PodCounts, pod_name: &str) {
    let mut counts = counts.write();
    match counts.get_mut(pod_name) {
        Some(count) if *count <= 1 => {
            counts.remove(pod_name);
        }
        Some(count) => *count -= 1,
        None => {
            tracing::error!(pod = pod_name, "active-request count underflow, ignoring");
        }
    }
}

impl Plugin for ActiveRequest {
    fn typed_name(&self) -> &TypedName {
        &self.typed_name
    }

    fn as_scorer(&self) -> Option<&dyn Scorer> {
        Some(self)
    }

    fn as_pre_request(&self) -> Option<&dyn PreRequest> {
        Some(self)
    }

    fn as_post_response(&self) -> Option<&dyn PostResponse> {
        Some(self)
    }
}

#[async_trait]
impl Scorer for ActiveRequest {
    async fn score(
        &self,
        _token: &CancellationToken,
        _state: &mut CycleState,
        _request: &Request,
        pods: &[Arc<Pod>],
    ) -> HashMap<NamespacedName, f64> {
        let tracked: HashMap<String, usize> = self.pod_counts.read().clone();
        let max_count = tracked.values().copied().max().unwrap_or(0);

        pods.iter()
            .map(|pod| {
                let score = match tracked.get(&pod.namespaced_name.to_string()).copied() {
                    Some(0) | None => 1.0, // no requests means highest score
                    Some(count) => (max_count - count) as f64 / max_count as f64,
                };
                (pod.namespaced_name.clone(), score)
            })
            .collect()
    }
}

#[async_trait]
impl PreRequest for ActiveRequest {
    async fn pre_request(
        &self,
        _token: &CancellationToken,
        request: &mut Request,
        result: &SchedulingResult,
        _target_port: u16,
    ) {
        for profile_result in result.profile_results.values() {
            let Some(target_pod) = profile_result.target_pod() else {
                continue;
            };

            let entry = RequestEntry {
                pod_name: target_pod.namespaced_name.to_string(),
                request_id: request.request_id.clone(),
            };
            self.request_cache.insert(entry.key(), entry.clone());
            increment_pod_count(&self.pod_counts, &entry.pod_name);

            tracing::debug!(entry = %entry.key(), "added request to cache");
        }
    }
}

#[async_trait]
impl PostResponse for ActiveRequest {
    async fn post_response(
        &self,
        _token: &CancellationToken,
        request: &mut Request,
        target_pod: &Pod,
    ) {
        let entry = RequestEntry {
            pod_name: target_pod.namespaced_name.to_string(),
            request_id: request.request_id.clone(),
        };

        if self.request_cache.remove(&entry.key()).is_some() {
            decrement_pod_count(&self.pod_counts, &entry.pod_name);
            tracing::debug!(entry = %entry.key(), "removed request from cache");
        } else {
            tracing::debug!(entry = %entry.key(), "request not found in cache");
        }
    }
}
