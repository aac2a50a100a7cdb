// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Endpoint-picker scheduling engine.
//!
//! For every inference request the front-door proxy asks this engine which
//! backend worker should serve it and how the request must be decorated.
//! The answer is computed by a pluggable pipeline: *filters* narrow the
//! candidate pods, weighted *scorers* rank them, a *picker* reduces them to
//! a target, and a *profile handler* decides which of the configured
//! profiles run and how their outcomes fuse into one scheduling result.
//! Pre-request and post-response *hooks* decorate the request and feed
//! state (prefix index, active-request counts) back into the scorers.
//!
//! The surrounding ext_proc server, pod discovery and metrics scraping are
//! external collaborators; this crate starts at the candidate-pod snapshot
//! and ends at the scheduling result.

pub mod config;
pub mod cycle_state;
pub mod error;
pub mod filters;
pub mod hooks;
pub mod pickers;
pub mod plugin;
pub mod profile;
pub mod scheduler;
pub mod scorers;
pub mod types;

pub use config::{LoadedConfig, load_config, load_config_file};
pub use cycle_state::CycleState;
pub use error::SchedulingError;
pub use plugin::registry::{PluginHandle, PluginRegistry};
pub use scheduler::{Scheduler, SchedulerProfile};
pub use types::{NamespacedName, Pod, ProfileRunResult, Request, SchedulingResult, ScoredPod};
