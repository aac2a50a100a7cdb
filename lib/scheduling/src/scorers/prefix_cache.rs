// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Prefix-locality scorer, estimate mode.
//!
//! Scores pods by how many leading blocks of the prompt they are estimated
//! to hold hot in KV cache. The estimate comes from a prefix index built
//! purely out of this picker's own scheduling history: every response adds
//! the chosen pod under the prompt's block hashes, every score walks the
//! chain until the first unknown block.
//!
//! The raw per-pod hit counts are also published into the cycle state so
//! the prefill/decode profile handler can reuse them without re-hashing
//! the prompt.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use epp_prefix_index::{PrefixStore, PrefixStoreConfig};

use super::indexed_scores_to_normalized;
use super::prefix_tracking::KvCacheTracking;
use crate::cycle_state::CycleState;
use crate::plugin::registry::PluginHandle;
use crate::plugin::{Plugin, PostResponse, Scorer, TypedName};
use crate::types::{NamespacedName, Pod, Request};

/// Type name of the prefix-cache scorer (both modes).
pub const PREFIX_CACHE_SCORER_TYPE: &str = "prefix-cache-scorer";

/// How long an idle pod stays in the hit bookkeeping.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
/// How often the idle cleaner runs.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Per-pod block-hit counts published into the cycle state under the
/// scorer's instance name. Counts include the model-name seed hit, so the
/// prefill/decode handler subtracts one to obtain content blocks.
#[derive(Debug, Clone, Default)]
pub struct PrefixCacheState {
    pub prefix_cache_servers: HashMap<NamespacedName, usize>,
}

/// Operating mode of the prefix-cache scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixCacheMode {
    /// Build a prefix-cache estimation index from scheduling history.
    #[default]
    Estimate,
    /// Query the external KV-cache indexer for actual cache state.
    CacheTracking,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PrefixCacheParameters {
    mode: PrefixCacheMode,
    block_size: Option<usize>,
    cache_capacity: Option<usize>,
    max_block_pods: Option<usize>,
    cleanup_interval: Option<String>,
    idle_timeout: Option<String>,
}

fn parse_duration_or(raw: Option<&str>, default: Duration, what: &str) -> Duration {
    match raw {
        None | Some("") => default,
        Some(raw) => match humantime::parse_duration(raw) {
            Ok(parsed) if !parsed.is_zero() => parsed,
            Ok(_) | Err(_) => {
                tracing::error!(configured = raw, what, "invalid duration, using default");
                default
            }
        },
    }
}

/// Factory for the `prefix-cache-scorer`; dispatches on the configured
/// mode.
pub fn factory(
    name: &str,
    parameters: Option<&serde_json::Value>,
    handle: &PluginHandle,
) -> anyhow::Result<Arc<dyn Plugin>> {
    let parameters: PrefixCacheParameters = match parameters {
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
            anyhow::anyhow!(
                "failed to parse the parameters of the '{PREFIX_CACHE_SCORER_TYPE}' scorer: {e}"
            )
        })?,
        None => PrefixCacheParameters::default(),
    };

    match parameters.mode {
        PrefixCacheMode::Estimate => {
            let mut config = PrefixStoreConfig::default();
            if let Some(capacity) = parameters.cache_capacity {
                config.cache_capacity = capacity;
            }
            if let Some(block_size) = parameters.block_size {
                config.block_size = block_size;
            }
            if let Some(max_block_pods) = parameters.max_block_pods {
                config.max_block_pods = max_block_pods;
            }

            Ok(Arc::new(PrefixCacheScorer::new(
                name,
                config,
                parse_duration_or(
                    parameters.cleanup_interval.as_deref(),
                    DEFAULT_CLEANUP_INTERVAL,
                    "cleanupInterval",
                ),
                parse_duration_or(
                    parameters.idle_timeout.as_deref(),
                    DEFAULT_IDLE_TIMEOUT,
                    "idleTimeout",
                ),
                handle.token.clone(),
            )))
        }
        PrefixCacheMode::CacheTracking => {
            let index = handle.kv_cache_index.clone().ok_or_else(|| {
                anyhow::anyhow!(
                    "'{PREFIX_CACHE_SCORER_TYPE}' in cache_tracking mode needs a KV-cache index client"
                )
            })?;
            Ok(Arc::new(KvCacheTracking::new(name, index)))
        }
    }
}

struct PodHits {
    last_update: Instant,
    prompt_hits: HashMap<String, usize>,
}

/// Estimate-mode prefix-locality scorer.
pub struct PrefixCacheScorer {
    typed_name: TypedName,
    store: Arc<PrefixStore<NamespacedName>>,
    pod_hits: Arc<RwLock<HashMap<NamespacedName, PodHits>>>,
}

impl PrefixCacheScorer {
    /// Creates the scorer and spawns the idle-session cleaner.
    /// Must be called within a tokio runtime.
    pub fn new(
        name: &str,
        config: PrefixStoreConfig,
        cleanup_interval: Duration,
        idle_timeout: Duration,
        token: CancellationToken,
    ) -> Self {
        let pod_hits: Arc<RwLock<HashMap<NamespacedName, PodHits>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let hits_for_cleanup = pod_hits.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        hits_for_cleanup
                            .write()
                            .retain(|_, hits| hits.last_update.elapsed() <= idle_timeout);
                    }
                }
            }
        });

        Self {
            typed_name: TypedName::new(PREFIX_CACHE_SCORER_TYPE, name),
            store: Arc::new(PrefixStore::new(config)),
            pod_hits,
        }
    }

    /// The scorer's block size in bytes. The prefill/decode handler must
    /// be configured with the same value.
    pub fn block_size(&self) -> usize {
        self.store.block_size()
    }

    /// Fraction of `prompt` estimated cached on `pod`, from the latest
    /// scoring pass.
    pub fn cached_percentage(&self, pod: &NamespacedName, prompt: &str) -> f64 {
        if prompt.is_empty() {
            return 0.0;
        }
        let hits = self.pod_hits.read();
        let Some(pod_hits) = hits.get(pod) else {
            return 0.0;
        };
        let Some(&blocks) = pod_hits.prompt_hits.get(prompt) else {
            return 0.0;
        };
        (blocks * self.store.block_size()) as f64 / prompt.len() as f64
    }
}

impl Plugin for PrefixCacheScorer {
    fn typed_name(&self) -> &TypedName {
        &self.typed_name
    }

    fn as_scorer(&self) -> Option<&dyn Scorer> {
        Some(self)
    }

    fn as_post_response(&self) -> Option<&dyn PostResponse> {
        Some(self)
    }
}

#[async_trait]
impl Scorer for PrefixCacheScorer {
    async fn score(
        &self,
        _token: &CancellationToken,
        state: &mut CycleState,
        request: &Request,
        pods: &[Arc<Pod>],
    ) -> HashMap<NamespacedName, f64> {
        let matched = self
            .store
            .find_matching_pods(&request.target_model, &request.prompt);
        tracing::debug!(matches = matched.len(), "got prefix-store matches");

        {
            let now = Instant::now();
            let mut pod_hits = self.pod_hits.write();
            for (pod, &blocks) in &matched {
                let hits = pod_hits.entry(pod.clone()).or_insert_with(|| PodHits {
                    last_update: now,
                    prompt_hits: HashMap::new(),
                });
                hits.last_update = now;
                hits.prompt_hits.insert(request.prompt.clone(), blocks);
            }
        }

        // One extra hit per matched pod: the model-name seed block the
        // prefill/decode handler subtracts.
        state.write(
            self.typed_name.name.clone(),
            PrefixCacheState {
                prefix_cache_servers: matched
                    .iter()
                    .map(|(pod, &blocks)| (pod.clone(), blocks + 1))
                    .collect(),
            },
        );

        indexed_scores_to_normalized(pods, |pod| pod.namespaced_name.clone(), &matched)
    }
}

#[async_trait]
impl PostResponse for PrefixCacheScorer {
    async fn post_response(
        &self,
        _token: &CancellationToken,
        request: &mut Request,
        target_pod: &Pod,
    ) {
        self.store.add_entry(
            &request.target_model,
            &request.prompt,
            &target_pod.namespaced_name,
        );
    }
}
