// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Prefill/decode role filters for disaggregated serving.
//!
//! Both are fixed configurations of the [`ByLabel`] filter over the
//! `llm-d.ai/role` pod label.

use std::sync::Arc;

use super::by_label::ByLabel;
use crate::plugin::Plugin;
use crate::plugin::registry::PluginHandle;

/// Type name of the decode-role filter.
pub const DECODE_FILTER_TYPE: &str = "decode-filter";
/// Type name of the prefill-role filter.
pub const PREFILL_FILTER_TYPE: &str = "prefill-filter";

/// Pod label carrying the worker's disaggregation role.
pub const ROLE_LABEL: &str = "llm-d.ai/role";
/// Role of designated prefill workers.
pub const ROLE_PREFILL: &str = "prefill";
/// Role of designated decode workers.
pub const ROLE_DECODE: &str = "decode";
/// Role of workers that can act as both prefill and decode.
pub const ROLE_BOTH: &str = "both";

/// Factory for the `prefill-filter`: keeps pods labeled with the prefill
/// role only.
pub fn prefill_factory(
    name: &str,
    _parameters: Option<&serde_json::Value>,
    _handle: &PluginHandle,
) -> anyhow::Result<Arc<dyn Plugin>> {
    // TODO: doesn't the "both" role also imply prefill?
    Ok(Arc::new(
        ByLabel::new(name, ROLE_LABEL, false, [ROLE_PREFILL.to_string()])
            .with_type(PREFILL_FILTER_TYPE),
    ))
}

/// Factory for the `decode-filter`: keeps pods labeled decode or both;
/// pods without the role label are treated as decode.
pub fn decode_factory(
    name: &str,
    _parameters: Option<&serde_json::Value>,
    _handle: &PluginHandle,
) -> anyhow::Result<Arc<dyn Plugin>> {
    Ok(Arc::new(
        ByLabel::new(
            name,
            ROLE_LABEL,
            true,
            [ROLE_DECODE.to_string(), ROLE_BOTH.to_string()],
        )
        .with_type(DECODE_FILTER_TYPE),
    ))
}
