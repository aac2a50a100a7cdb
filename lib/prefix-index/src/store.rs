// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Concurrent two-level LRU prefix store.
//!
//! Maps `(model, block hash)` to the bounded set of workers recently seen
//! serving that prefix block. The outer level is one LRU of block hashes
//! per model; each block holds an inner LRU of workers keyed by last-seen
//! time. Both levels evict strictly by recency, so the store stays bounded
//! no matter how much traffic flows through it.

use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};

use crate::hash::block_hash_chain;

/// Default maximum number of blocks each model's LRU can hold.
pub const DEFAULT_CACHE_CAPACITY: usize = 500_000;
/// Default number of prompt bytes per block.
pub const DEFAULT_BLOCK_SIZE: usize = 256;
/// Default maximum number of workers a single block records.
pub const DEFAULT_MAX_BLOCK_PODS: usize = 100;

/// Configuration for [`PrefixStore`].
#[derive(Debug, Clone)]
pub struct PrefixStoreConfig {
    /// Maximum number of blocks the per-model LRU can store.
    pub cache_capacity: usize,
    /// Length in bytes of the prompt chunk a block is keyed by.
    pub block_size: usize,
    /// Maximum number of pods a block can store.
    pub max_block_pods: usize,
}

impl Default for PrefixStoreConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            block_size: DEFAULT_BLOCK_SIZE,
            max_block_pods: DEFAULT_MAX_BLOCK_PODS,
        }
    }
}

/// One indexed prefix block: the workers recently seen serving it.
struct Block<P> {
    pods: LruCache<P, Instant>,
}

type ModelCache<P> = Arc<Mutex<LruCache<u64, Block<P>>>>;

/// In-memory prefix-to-workers index with chained xxh64 keys and LRU
/// eviction at both levels.
///
/// `P` is the worker identity type; the scheduling crate instantiates it
/// with the pod's namespaced name.
pub struct PrefixStore<P> {
    cache_capacity: NonZeroUsize,
    block_size: usize,
    max_block_pods: NonZeroUsize,

    // Written only when a model is seen for the first time.
    store: RwLock<HashMap<String, ModelCache<P>>>,
}

impl<P: Hash + Eq + Clone> PrefixStore<P> {
    /// Creates a store with the given configuration. Zero capacities are
    /// clamped to one; a zero block size falls back to the default.
    pub fn new(config: PrefixStoreConfig) -> Self {
        let block_size = if config.block_size == 0 {
            tracing::warn!(
                default = DEFAULT_BLOCK_SIZE,
                "block size must be positive, using default"
            );
            DEFAULT_BLOCK_SIZE
        } else {
            config.block_size
        };

        Self {
            cache_capacity: NonZeroUsize::new(config.cache_capacity)
                .unwrap_or(NonZeroUsize::MIN),
            block_size,
            max_block_pods: NonZeroUsize::new(config.max_block_pods)
                .unwrap_or(NonZeroUsize::MIN),
            store: RwLock::new(HashMap::new()),
        }
    }

    /// The configured block size in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Records that `pod` served `prompt` under `model`, touching one entry
    /// per full block. Prompts shorter than one block are ignored.
    pub fn add_entry(&self, model: &str, prompt: &str, pod: &P) {
        if model.is_empty() || prompt.len() < self.block_size {
            return;
        }

        let cache = self.model_cache(model);
        let mut cache = cache.lock();
        for block_hash in block_hash_chain(model, prompt.as_bytes(), self.block_size) {
            let block = cache.get_or_insert_mut(block_hash, || Block {
                pods: LruCache::new(self.max_block_pods),
            });
            block.pods.put(pod.clone(), Instant::now());
        }
    }

    /// Returns, for every pod that served a prefix of `prompt` under
    /// `model`, the number of consecutive leading blocks it matched.
    ///
    /// The walk stops at the first block absent from the index: this is a
    /// prefix match, never a substring match. Missing model or under-size
    /// prompt yields an empty map.
    pub fn find_matching_pods(&self, model: &str, prompt: &str) -> HashMap<P, usize> {
        let mut matched: HashMap<P, usize> = HashMap::new();
        if model.is_empty() || prompt.len() < self.block_size {
            return matched;
        }

        let Some(cache) = self.store.read().get(model).cloned() else {
            return matched;
        };

        let mut cache = cache.lock();
        for block_hash in block_hash_chain(model, prompt.as_bytes(), self.block_size) {
            let Some(block) = cache.get(&block_hash) else {
                break; // match consecutive blocks only
            };
            for (pod, _last_seen) in block.pods.iter() {
                *matched.entry(pod.clone()).or_default() += 1;
            }
        }

        matched
    }

    fn model_cache(&self, model: &str) -> ModelCache<P> {
        if let Some(cache) = self.store.read().get(model) {
            return cache.clone();
        }

        self.store
            .write()
            .entry(model.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(LruCache::new(self.cache_capacity))))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_store() -> PrefixStore<String> {
        PrefixStore::new(PrefixStoreConfig {
            cache_capacity: 16,
            block_size: 5,
            max_block_pods: 4,
        })
    }

    #[test]
    fn add_then_find_counts_full_blocks() {
        let store = small_store();
        let pod = "default/pod-a".to_string();
        store.add_entry("m", "0123456789a", &pod);

        let matched = store.find_matching_pods("m", "0123456789a");
        assert_eq!(matched.get(&pod), Some(&2)); // floor(11 / 5)
    }

    #[test]
    fn short_prompt_is_ignored() {
        let store = small_store();
        let pod = "default/pod-a".to_string();
        store.add_entry("m", "hi", &pod);
        assert!(store.find_matching_pods("m", "hi").is_empty());
    }

    #[test]
    fn unknown_model_matches_nothing() {
        let store = small_store();
        assert!(store.find_matching_pods("other", "0123456789").is_empty());
    }

    #[test]
    fn models_do_not_share_entries() {
        let store = small_store();
        let pod = "default/pod-a".to_string();
        store.add_entry("model-a", "0123456789", &pod);
        assert!(store.find_matching_pods("model-b", "0123456789").is_empty());
    }

    #[test]
    fn match_stops_at_first_missing_block() {
        let store = small_store();
        let pod = "default/pod-a".to_string();
        store.add_entry("m", "aaaaabbbbb", &pod);

        // Same first block, diverging second block: only one hit.
        let matched = store.find_matching_pods("m", "aaaaazzzzzccccc");
        assert_eq!(matched.get(&pod), Some(&1));
    }

    #[test]
    fn suffix_alone_never_matches() {
        // A pod that served only "bbbbb" must not surface for a prompt
        // whose *second* block is "bbbbb": the chain binds content to its
        // position in the prefix.
        let store = small_store();
        let pod = "default/pod-a".to_string();
        store.add_entry("m", "bbbbb", &pod);

        let matched = store.find_matching_pods("m", "aaaaabbbbb");
        assert!(!matched.contains_key(&pod));
    }

    #[test]
    fn block_pod_capacity_is_bounded() {
        let store = small_store(); // max_block_pods = 4
        for i in 0..6 {
            store.add_entry("m", "0123456789", &format!("default/pod-{i}"));
        }

        let matched = store.find_matching_pods("m", "0123456789");
        assert_eq!(matched.len(), 4);
        // The oldest entries were evicted.
        assert!(!matched.contains_key("default/pod-0"));
        assert!(!matched.contains_key("default/pod-1"));
        assert!(matched.contains_key("default/pod-5"));
    }

    #[test]
    fn model_lru_evicts_old_blocks() {
        let store = PrefixStore::new(PrefixStoreConfig {
            cache_capacity: 2,
            block_size: 5,
            max_block_pods: 4,
        });
        let pod = "default/pod-a".to_string();

        // Three blocks through a capacity-2 LRU: the first block is gone,
        // so the prefix walk misses immediately.
        store.add_entry("m", "aaaaabbbbbccccc", &pod);
        let matched = store.find_matching_pods("m", "aaaaabbbbbccccc");
        assert!(!matched.contains_key(&pod));
    }

    #[test]
    fn concurrent_adds_and_finds() {
        let store = Arc::new(PrefixStore::new(PrefixStoreConfig {
            cache_capacity: 1024,
            block_size: 5,
            max_block_pods: 8,
        }));

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let pod = format!("default/pod-{i}");
                    for _ in 0..200 {
                        store.add_entry("m", "0123456789", &pod);
                    }
                })
            })
            .collect();
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        store.find_matching_pods("m", "0123456789");
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }

        let matched = store.find_matching_pods("m", "0123456789");
        assert_eq!(matched.len(), 4);
        assert!(matched.values().all(|&hits| hits == 2));
    }
}
