// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Scorer plugins: weighted ranking stages over the filtered candidates.

pub mod active_request;
pub mod load_aware;
pub mod prefix_cache;
pub mod prefix_tracking;
pub mod session_affinity;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::types::{NamespacedName, Pod};

/// Min-max normalizes indexed hit counts into per-pod scores.
///
/// Pods present in `indexed` map linearly onto [0, 1]; when every indexed
/// count is equal they all score 1.0. Pods absent from `indexed` score 0.
pub(crate) fn indexed_scores_to_normalized<K>(
    pods: &[Arc<Pod>],
    pod_to_key: impl Fn(&Pod) -> K,
    indexed: &HashMap<K, usize>,
) -> HashMap<NamespacedName, f64>
where
    K: Hash + Eq,
{
    let min = indexed.values().copied().min();
    let max = indexed.values().copied().max();

    pods.iter()
        .map(|pod| {
            let score = match indexed.get(&pod_to_key(pod)) {
                Some(&count) => match (min, max) {
                    (Some(min), Some(max)) if min == max => 1.0,
                    (Some(min), Some(max)) => (count - min) as f64 / (max - min) as f64,
                    _ => 0.0,
                },
                None => 0.0,
            };
            (pod.namespaced_name.clone(), score)
        })
        .collect()
}
