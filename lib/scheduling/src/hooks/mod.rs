// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Request-control hooks.
//!
//! Pre-request hooks run after the scheduler returns and before the proxy
//! forwards the request; they observe the complete scheduling result and
//! decorate the request (prefill-worker URL, active-request bookkeeping).
//! Post-response hooks run when the proxy has a response; they write the
//! session cookie and feed the prefix index and the active-request
//! tracker.

pub mod prefill_header;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::plugin::Plugin;
use crate::types::{Pod, Request, SchedulingResult};

/// Runs every configured pre-request and post-response hook, in plugin
/// declaration order.
pub struct RequestControl {
    pre_request: Vec<Arc<dyn Plugin>>,
    post_response: Vec<Arc<dyn Plugin>>,
}

impl RequestControl {
    /// Collects the hook capabilities out of the given plugin instances.
    pub fn new(plugins: impl IntoIterator<Item = Arc<dyn Plugin>>) -> Self {
        let mut pre_request = Vec::new();
        let mut post_response = Vec::new();
        for plugin in plugins {
            if plugin.as_pre_request().is_some() {
                pre_request.push(plugin.clone());
            }
            if plugin.as_post_response().is_some() {
                post_response.push(plugin.clone());
            }
        }
        Self {
            pre_request,
            post_response,
        }
    }

    /// Runs the pre-request hooks. `target_port` is the inference pool's
    /// worker port, injected by the datastore.
    pub async fn pre_request(
        &self,
        token: &CancellationToken,
        request: &mut Request,
        result: &SchedulingResult,
        target_port: u16,
    ) {
        for plugin in &self.pre_request {
            if let Some(hook) = plugin.as_pre_request() {
                hook.pre_request(token, request, result, target_port).await;
            }
        }
    }

    /// Runs the post-response hooks against the pod the proxy dispatched
    /// to.
    pub async fn post_response(
        &self,
        token: &CancellationToken,
        request: &mut Request,
        target_pod: &Pod,
    ) {
        for plugin in &self.post_response {
            if let Some(hook) = plugin.as_post_response() {
                hook.post_response(token, request, target_pod).await;
            }
        }
    }
}
