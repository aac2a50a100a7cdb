// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Scheduling-time error surface.
//!
//! Configuration-time errors live in [`crate::config::ConfigError`]; those
//! are fatal at startup. Everything here is per-request: the RPC layer maps
//! a scheduling error to an HTTP 5xx and the proxy retries at its own
//! layer.

/// Errors surfaced by a scheduling cycle.
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    /// A filter chain left zero candidate pods. Recorded per profile; only
    /// surfaced when the primary profile is affected.
    #[error("no candidate pods survived the filter chain of profile '{0}'")]
    NoCandidates(String),

    /// The profile handler could not collapse the profile outcomes into a
    /// usable result (e.g. no decode workers available).
    #[error("profile handler failed to produce a scheduling result: {0}")]
    Handler(#[source] anyhow::Error),

    /// Invariant violation inside the pipeline (a plugin missing a
    /// capability the configuration promised). Logged where detected; the
    /// affected profile fails rather than crashing the process.
    #[error("{0}")]
    Internal(String),
}
