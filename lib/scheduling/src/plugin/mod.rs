// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Plugin capability traits.
//!
//! Filters, scorers, pickers, profile handlers and the request-control
//! hooks are different *capabilities* of one plugin instance. A plugin
//! declares the capabilities it implements by overriding the matching
//! accessor on [`Plugin`]; a single instance may expose several (the
//! prefix scorer is both a scorer and a post-response hook). Capability
//! presence is checked once, when profiles are built from configuration —
//! at request time no plugin can be unknown.
//!
//! Pure computation is synchronous ([`Filter`], [`Picker`],
//! [`ProfileHandler`]); capabilities that may touch external state
//! ([`Scorer`], [`PreRequest`], [`PostResponse`]) are asynchronous and
//! receive the request's cancellation token so externally observable
//! boundaries stay cancellable.

pub mod registry;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cycle_state::CycleState;
use crate::scheduler::SchedulerProfile;
use crate::types::{NamespacedName, Pod, ProfileRunResult, Request, SchedulingResult, ScoredPod};

/// A plugin's identity: the registry type key plus the caller-assigned
/// instance name. Instance equality within a profile is by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedName {
    pub plugin_type: &'static str,
    pub name: String,
}

impl TypedName {
    pub fn new(plugin_type: &'static str, name: impl Into<String>) -> Self {
        Self {
            plugin_type,
            name: name.into(),
        }
    }
}

impl fmt::Display for TypedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.plugin_type, self.name)
    }
}

/// Base trait for every plugin instance.
///
/// The capability accessors default to `None`; implementations override
/// the ones they support and return `self`.
pub trait Plugin: Send + Sync {
    fn typed_name(&self) -> &TypedName;

    fn as_filter(&self) -> Option<&dyn Filter> {
        None
    }

    fn as_scorer(&self) -> Option<&dyn Scorer> {
        None
    }

    fn as_picker(&self) -> Option<&dyn Picker> {
        None
    }

    fn as_profile_handler(&self) -> Option<&dyn ProfileHandler> {
        None
    }

    fn as_pre_request(&self) -> Option<&dyn PreRequest> {
        None
    }

    fn as_post_response(&self) -> Option<&dyn PostResponse> {
        None
    }
}

/// Stateless predicate stage: keeps a subset of the candidate pods.
///
/// Filters run sequentially in declared order and observe each other only
/// through the pod list they return.
pub trait Filter: Send + Sync {
    fn filter(
        &self,
        state: &CycleState,
        request: &Request,
        pods: Vec<Arc<Pod>>,
    ) -> Vec<Arc<Pod>>;
}

/// Weighted scoring stage: maps every candidate to a score in [0, 1].
///
/// A scorer that cannot score (missing signal, backend error) returns an
/// empty map — it contributes nothing to the aggregate rather than
/// erroring. Scorers must be pure with respect to
/// `(request, cycle state, candidates)` plus their own internal state, and
/// may write to the cycle state only under their own instance name.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(
        &self,
        token: &CancellationToken,
        state: &mut CycleState,
        request: &Request,
        pods: &[Arc<Pod>],
    ) -> HashMap<NamespacedName, f64>;
}

/// Reduces the weighted-sum scored candidates to the profile's targets.
pub trait Picker: Send + Sync {
    fn pick(&self, state: &mut CycleState, scored: Vec<ScoredPod>) -> ProfileRunResult;
}

/// Decides which profiles run for a request and fuses their outcomes.
///
/// `pick_profiles` is called repeatedly; each returned set must name
/// configured profiles that have not run yet, and an empty return ends the
/// loop. `process_results` then collapses the per-profile outcomes
/// (`None` = attempted and failed) into the final scheduling result.
pub trait ProfileHandler: Send + Sync {
    fn pick_profiles(
        &self,
        state: &CycleState,
        request: &Request,
        profiles: &HashMap<String, SchedulerProfile>,
        results: &HashMap<String, Option<ProfileRunResult>>,
    ) -> Vec<String>;

    fn process_results(
        &self,
        state: &CycleState,
        request: &Request,
        results: HashMap<String, Option<ProfileRunResult>>,
    ) -> anyhow::Result<SchedulingResult>;
}

/// Runs after the scheduler returns, before the proxy forwards the
/// request: observes the complete scheduling result and may mutate the
/// request headers (e.g. inject the prefill-worker URL).
#[async_trait]
pub trait PreRequest: Send + Sync {
    async fn pre_request(
        &self,
        token: &CancellationToken,
        request: &mut Request,
        result: &SchedulingResult,
        target_port: u16,
    );
}

/// Runs when the proxy has a response for the request: may mutate the
/// request headers (session cookie) and update cross-request state
/// (prefix index, active-request counts).
#[async_trait]
pub trait PostResponse: Send + Sync {
    async fn post_response(
        &self,
        token: &CancellationToken,
        request: &mut Request,
        target_pod: &Pod,
    );
}
