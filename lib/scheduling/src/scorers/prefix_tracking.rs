// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Prefix-locality scorer, cache-tracking mode.
//!
//! Same external contract as the estimate mode, but the per-pod block-hit
//! counts come from an external KV-cache indexer that tracks the workers'
//! actual cache state instead of this picker's own scheduling history.
//! The indexer is an out-of-scope collaborator reached through
//! [`KvCacheIndex`]; an indexer failure degrades to an empty scoring so
//! the request still routes on the remaining signals.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::indexed_scores_to_normalized;
use super::prefix_cache::{PREFIX_CACHE_SCORER_TYPE, PrefixCacheState};
use crate::cycle_state::CycleState;
use crate::plugin::{Plugin, Scorer, TypedName};
use crate::types::{NamespacedName, Pod, Request};

/// Client for the external KV-cache indexer.
#[async_trait]
pub trait KvCacheIndex: Send + Sync {
    /// Returns, keyed by pod address, the number of leading prompt blocks
    /// each pod holds cached for the model.
    async fn pod_scores(
        &self,
        model: &str,
        prompt: &str,
    ) -> anyhow::Result<HashMap<String, usize>>;
}

/// Cache-tracking prefix-locality scorer.
pub struct KvCacheTracking {
    typed_name: TypedName,
    index: Arc<dyn KvCacheIndex>,
}

impl KvCacheTracking {
    pub fn new(name: &str, index: Arc<dyn KvCacheIndex>) -> Self {
        Self {
            typed_name: TypedName::new(PREFIX_CACHE_SCORER_TYPE, name),
            index,
        }
    }
}

impl Plugin for KvCacheTracking {
    fn typed_name(&self) -> &TypedName {
        &self.typed_name
    }

    fn as_scorer(&self) -> Option<&dyn Scorer> {
        Some(self)
    }
}

#[async_trait]
impl Scorer for KvCacheTracking {
    async fn score(
        &self,
        token: &CancellationToken,
        state: &mut CycleState,
        request: &Request,
        pods: &[Arc<Pod>],
    ) -> HashMap<NamespacedName, f64> {
        let indexed = tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!("request cancelled while querying the KV-cache index");
                return HashMap::new();
            }
            result = self.index.pod_scores(&request.target_model, &request.prompt) => {
                match result {
                    Ok(indexed) => indexed,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to get pod scores from the KV-cache index");
                        return HashMap::new();
                    }
                }
            }
        };
        tracing::debug!(matches = indexed.len(), "got KV-cache index scores");

        let address_to_name: HashMap<&str, &NamespacedName> = pods
            .iter()
            .map(|pod| (pod.address.as_str(), &pod.namespaced_name))
            .collect();
        state.write(
            self.typed_name.name.clone(),
            PrefixCacheState {
                prefix_cache_servers: indexed
                    .iter()
                    .filter_map(|(address, &blocks)| {
                        address_to_name
                            .get(address.as_str())
                            .map(|&name| (name.clone(), blocks + 1))
                    })
                    .collect(),
            },
        );

        indexed_scores_to_normalized(pods, |pod| pod.address.clone(), &indexed)
    }
}
