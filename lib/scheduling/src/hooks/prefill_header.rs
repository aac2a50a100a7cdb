// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::plugin::registry::PluginHandle;
use crate::plugin::{Plugin, PreRequest, TypedName};
use crate::types::{Request, SchedulingResult};

/// Type name of the [`PrefillHeaderHandler`].
pub const PREFILL_HEADER_TYPE: &str = "prefill-header";

/// Header carrying the prefill worker URL (with scheme).
pub const PREFILLER_URL_HEADER: &str = "x-prefiller-url";
/// Header carrying the bare prefill worker host:port.
pub const PREFILLER_HOST_PORT_HEADER: &str = "x-prefiller-host-port";

const DEFAULT_PREFILL_PROFILE: &str = "prefill";

/// Which header convention the deployment uses for the prefill worker.
/// Proxies and pickers must agree on one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderStyle {
    /// `x-prefiller-url: http://host:port`
    #[default]
    Url,
    /// `x-prefiller-host-port: host:port`
    HostPort,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PrefillHeaderParameters {
    prefill_profile: String,
    header_style: HeaderStyle,
}

impl Default for PrefillHeaderParameters {
    fn default() -> Self {
        Self {
            prefill_profile: DEFAULT_PREFILL_PROFILE.to_string(),
            header_style: HeaderStyle::default(),
        }
    }
}

/// Factory for the `prefill-header` pre-request plugin.
pub fn factory(
    name: &str,
    parameters: Option<&serde_json::Value>,
    _handle: &PluginHandle,
) -> anyhow::Result<Arc<dyn Plugin>> {
    let parameters: PrefillHeaderParameters = match parameters {
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
            anyhow::anyhow!(
                "failed to parse the parameters of the '{PREFILL_HEADER_TYPE}' pre-request plugin: {e}"
            )
        })?,
        None => PrefillHeaderParameters::default(),
    };

    Ok(Arc::new(PrefillHeaderHandler {
        typed_name: TypedName::new(PREFILL_HEADER_TYPE, name),
        prefill_profile: parameters.prefill_profile,
        header_style: parameters.header_style,
    }))
}

/// Wires the prefill profile's chosen pod into a request header so the
/// proxy can send the prompt there for ingestion.
pub struct PrefillHeaderHandler {
    typed_name: TypedName,
    prefill_profile: String,
    header_style: HeaderStyle,
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}") // IPv6 literal
    } else {
        format!("{host}:{port}")
    }
}

impl Plugin for PrefillHeaderHandler {
    fn typed_name(&self) -> &TypedName {
        &self.typed_name
    }

    fn as_pre_request(&self) -> Option<&dyn PreRequest> {
        Some(self)
    }
}

#[async_trait]
impl PreRequest for PrefillHeaderHandler {
    async fn pre_request(
        &self,
        _token: &CancellationToken,
        request: &mut Request,
        result: &SchedulingResult,
        target_port: u16,
    ) {
        let Some(prefill_pod) = result
            .profile_results
            .get(&self.prefill_profile)
            .and_then(|run| run.target_pod())
        else {
            // Prefill was skipped or failed: nothing to wire up.
            return;
        };

        request.headers.remove(PREFILLER_URL_HEADER);
        request.headers.remove(PREFILLER_HOST_PORT_HEADER);

        let host_port = join_host_port(&prefill_pod.address, target_port);
        match self.header_style {
            HeaderStyle::Url => {
                request
                    .headers
                    .insert(PREFILLER_URL_HEADER.to_string(), format!("http://{host_port}"));
            }
            HeaderStyle::HostPort => {
                request
                    .headers
                    .insert(PREFILLER_HOST_PORT_HEADER.to_string(), host_port);
            }
        }
    }
}
