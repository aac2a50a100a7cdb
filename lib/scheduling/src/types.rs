// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Core data model shared by the scheduling pipeline.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Unique pod identity: namespace plus name.
///
/// Displayed (and compared as a session-token payload) in the
/// `namespace/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Point-in-time metrics snapshot for a candidate pod, provided by the
/// external datastore alongside the pod itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Number of requests waiting in the worker's queue.
    pub waiting_queue_size: usize,
    /// KV-cache utilization in [0, 1], when the worker reports it.
    #[serde(default)]
    pub kv_cache_usage: f64,
    /// Adapters / models currently active on the worker.
    #[serde(default)]
    pub active_models: Vec<String>,
}

/// A candidate worker pod. Identity is stable across a scheduling cycle;
/// the metrics snapshot is point-in-time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pod {
    pub namespaced_name: NamespacedName,
    pub address: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub metrics: MetricsSnapshot,
}

/// One inference request as seen by the picker.
///
/// Content is immutable for the lifetime of the request; the headers map is
/// the only field hooks mutate (session token in, prefiller URL out).
#[derive(Debug, Clone)]
pub struct Request {
    pub request_id: String,
    pub target_model: String,
    pub prompt: String,
    pub headers: HashMap<String, String>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// A pod together with its aggregated score.
#[derive(Debug, Clone)]
pub struct ScoredPod {
    pub pod: Arc<Pod>,
    pub score: f64,
}

/// Outcome of one profile run: the chosen pods in preference order
/// (normally a single entry) with their combined scores.
#[derive(Debug, Clone, Default)]
pub struct ProfileRunResult {
    pub target_pods: Vec<ScoredPod>,
}

impl ProfileRunResult {
    /// The pod the profile selected, if any.
    pub fn target_pod(&self) -> Option<&Arc<Pod>> {
        self.target_pods.first().map(|scored| &scored.pod)
    }
}

/// Final outcome of a scheduling cycle: every successful profile's result,
/// plus the name of the profile whose pod the proxy dispatches to. The
/// remaining entries are informational (e.g. the prefill pod in
/// disaggregated mode).
#[derive(Debug, Clone)]
pub struct SchedulingResult {
    pub primary_profile_name: String,
    pub profile_results: HashMap<String, ProfileRunResult>,
}

impl SchedulingResult {
    /// The dispatch target: the primary profile's chosen pod.
    pub fn primary_target(&self) -> Option<&Arc<Pod>> {
        self.profile_results
            .get(&self.primary_profile_name)
            .and_then(ProfileRunResult::target_pod)
    }
}
