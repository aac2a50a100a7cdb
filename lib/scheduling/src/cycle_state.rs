// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-request scratch state shared between stages of one scheduling cycle.

use std::any::Any;
use std::collections::HashMap;

/// Errors reading a typed cycle-state entry.
#[derive(Debug, thiserror::Error)]
pub enum CycleStateError {
    #[error("no cycle-state entry under key '{0}'")]
    NotFound(String),

    #[error("cycle-state entry under key '{0}' has an unexpected type")]
    WrongType(String),
}

/// Scratch map carrying hints between the stages of a single scheduling
/// cycle, keyed by plugin instance name.
///
/// Writers are plugins that want downstream stages to reuse intermediate
/// work (the prefix scorer publishes its per-pod block-hit counts here);
/// readers are profile handlers. A cycle state lives for exactly one
/// `schedule` call and is never shared across requests; no plugin may
/// retain a reference past the end of the cycle.
#[derive(Default)]
pub struct CycleState {
    entries: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous entry. Plugins
    /// write only under their own instance name.
    pub fn write<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Box::new(value));
    }

    /// Reads the entry under `key` as a `T`.
    pub fn read<T: Any + Send + Sync>(&self, key: &str) -> Result<&T, CycleStateError> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| CycleStateError::NotFound(key.to_string()))?;
        entry
            .downcast_ref::<T>()
            .ok_or_else(|| CycleStateError::WrongType(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let mut state = CycleState::new();
        state.write("prefix-cache-scorer", 42usize);
        assert_eq!(*state.read::<usize>("prefix-cache-scorer").unwrap(), 42);
    }

    #[test]
    fn missing_key() {
        let state = CycleState::new();
        assert!(matches!(
            state.read::<usize>("absent"),
            Err(CycleStateError::NotFound(_))
        ));
    }

    #[test]
    fn wrong_type() {
        let mut state = CycleState::new();
        state.write("key", "a string".to_string());
        assert!(matches!(
            state.read::<usize>("key"),
            Err(CycleStateError::WrongType(_))
        ));
    }
}
