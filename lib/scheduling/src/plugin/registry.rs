// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Plugin registry: type name to factory.
//!
//! The registry is populated once at startup and read-only afterwards.
//! Factories consume the instance name, the parsed parameter blob from the
//! configuration and a [`PluginHandle`], and return a ready plugin
//! instance. An unknown plugin type at configuration time is fatal.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::Plugin;
use crate::scorers::prefix_tracking::KvCacheIndex;

/// Handle passed to plugin factories: process-lifetime cancellation for
/// background tasks, plus the external collaborators a plugin may need.
#[derive(Clone, Default)]
pub struct PluginHandle {
    /// Cancelled when the picker shuts down; factories hand it to the
    /// background tasks they spawn (TTL drains, idle cleaners).
    pub token: CancellationToken,
    /// Client for the external KV-cache indexer, required by the
    /// prefix-cache scorer in cache-tracking mode.
    pub kv_cache_index: Option<Arc<dyn KvCacheIndex>>,
}

impl PluginHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            kv_cache_index: None,
        }
    }

    pub fn with_kv_cache_index(mut self, index: Arc<dyn KvCacheIndex>) -> Self {
        self.kv_cache_index = Some(index);
        self
    }
}

/// Factory signature every registered plugin type provides.
pub type PluginFactory = fn(
    name: &str,
    parameters: Option<&serde_json::Value>,
    handle: &PluginHandle,
) -> anyhow::Result<Arc<dyn Plugin>>;

/// Process-wide mapping from plugin type name to factory.
pub struct PluginRegistry {
    factories: HashMap<&'static str, PluginFactory>,
}

impl PluginRegistry {
    /// An empty registry, for hosts that wire their own plugin set.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with every built-in plugin type registered.
    pub fn with_builtin_plugins() -> Self {
        let mut registry = Self::empty();
        registry
            .register(crate::filters::by_label::BY_LABEL_TYPE, crate::filters::by_label::factory)
            .register(
                crate::filters::label_selector::BY_LABEL_SELECTOR_TYPE,
                crate::filters::label_selector::factory,
            )
            .register(crate::filters::role::DECODE_FILTER_TYPE, crate::filters::role::decode_factory)
            .register(crate::filters::role::PREFILL_FILTER_TYPE, crate::filters::role::prefill_factory)
            .register(
                crate::filters::passthrough::PASSTHROUGH_FILTER_TYPE,
                crate::filters::passthrough::factory,
            )
            .register(
                crate::filters::random_drop::RANDOM_DROP_FILTER_TYPE,
                crate::filters::random_drop::factory,
            )
            .register(crate::pickers::max_score::MAX_SCORE_PICKER_TYPE, crate::pickers::max_score::factory)
            .register(crate::pickers::random::RANDOM_PICKER_TYPE, crate::pickers::random::factory)
            .register(crate::scorers::load_aware::LOAD_AWARE_TYPE, crate::scorers::load_aware::factory)
            .register(
                crate::scorers::session_affinity::SESSION_AFFINITY_TYPE,
                crate::scorers::session_affinity::factory,
            )
            .register(
                crate::scorers::active_request::ACTIVE_REQUEST_TYPE,
                crate::scorers::active_request::factory,
            )
            .register(
                crate::scorers::prefix_cache::PREFIX_CACHE_SCORER_TYPE,
                crate::scorers::prefix_cache::factory,
            )
            .register(
                crate::profile::single::SINGLE_PROFILE_HANDLER_TYPE,
                crate::profile::single::factory,
            )
            .register(crate::profile::pd::PD_PROFILE_HANDLER_TYPE, crate::profile::pd::factory)
            .register(
                crate::hooks::prefill_header::PREFILL_HEADER_TYPE,
                crate::hooks::prefill_header::factory,
            );
        registry
    }

    /// Registers a factory under a type name, replacing any previous one.
    pub fn register(&mut self, plugin_type: &'static str, factory: PluginFactory) -> &mut Self {
        self.factories.insert(plugin_type, factory);
        self
    }

    /// Looks up the factory for a plugin type.
    pub fn factory(&self, plugin_type: &str) -> Option<PluginFactory> {
        self.factories.get(plugin_type).copied()
    }
}
