// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio_util::sync::CancellationToken;

use crate::cycle_state::CycleState;
use crate::plugin::registry::PluginHandle;
use crate::plugin::{Plugin, PostResponse, Scorer, TypedName};
use crate::types::{NamespacedName, Pod, Request};

/// Type name of the [`SessionAffinity`] scorer.
pub const SESSION_AFFINITY_TYPE: &str = "session-affinity-scorer";

/// Header carrying the session token on requests and responses.
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Factory for the `session-affinity-scorer`.
pub fn factory(
    name: &str,
    _parameters: Option<&serde_json::Value>,
    _handle: &PluginHandle,
) -> anyhow::Result<Arc<dyn Plugin>> {
    Ok(Arc::new(SessionAffinity {
        typed_name: TypedName::new(SESSION_AFFINITY_TYPE, name),
    }))
}

/// Routes subsequent requests of a session to the pod that served the
/// first one: the pod named by the session token scores 1.0, every other
/// candidate 0.0. On response, the chosen pod is re-encoded into the same
/// header so the proxy can relay it as a cookie.
pub struct SessionAffinity {
    typed_name: TypedName,
}

impl SessionAffinity {
    fn decode_token(&self, request: &Request) -> Option<String> {
        let token = request.header(SESSION_TOKEN_HEADER)?;
        if token.is_empty() {
            return None;
        }
        match BASE64.decode(token) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(name) => Some(name),
                Err(e) => {
                    tracing::error!(error = %e, "session token is not valid UTF-8");
                    None
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "error decoding session header");
                None
            }
        }
    }
}

impl Plugin for SessionAffinity {
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
impl Scorer for SessionAffinity {
    async fn score(
        &self,
        _token: &CancellationToken,
        _state: &mut CycleState,
        request: &Request,
        pods: &[Arc<Pod>],
    ) -> HashMap<NamespacedName, f64> {
        let session_pod = self.decode_token(request).unwrap_or_default();

        pods.iter()
            .map(|pod| {
                let score = if pod.namespaced_name.to_string() == session_pod {
                    1.0
                } else {
                    0.0
                };
                (pod.namespaced_name.clone(), score)
            })
            .collect()
    }
}

#[async_trait]
impl PostResponse for SessionAffinity {
    async fn post_response(
        &self,
        _token: &CancellationToken,
        request: &mut Request,
        target_pod: &Pod,
    ) {
        request.headers.insert(
            SESSION_TOKEN_HEADER.to_string(),
            BASE64.encode(target_pod.namespaced_name.to_string()),
        );
    }
}
