// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! YAML configuration loader.
//!
//! Parses the `EndpointPickerConfig` document, instantiates every declared
//! plugin exactly once through the registry, builds the scheduling
//! profiles and wires the request-control hooks. Every validation failure
//! here is fatal at startup; at request time no plugin can be unknown.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::hooks::RequestControl;
use crate::plugin::Plugin;
use crate::plugin::registry::{PluginHandle, PluginRegistry};
use crate::profile::single::SINGLE_PROFILE_HANDLER_TYPE;
use crate::scheduler::{Scheduler, SchedulerProfile, WeightedScorer};

/// The apiVersion this loader understands.
pub const API_VERSION: &str = "inference.networking.x-k8s.io/v1alpha1";
/// The kind this loader understands.
pub const KIND: &str = "EndpointPickerConfig";

const DEFAULT_SCORER_WEIGHT: i64 = 1;

/// Configuration-time errors. All fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("unsupported apiVersion '{0}', expected '{expected}'", expected = API_VERSION)]
    UnsupportedApiVersion(String),

    #[error("unsupported kind '{0}', expected '{expected}'", expected = KIND)]
    UnsupportedKind(String),

    #[error("unknown plugin type '{0}'")]
    UnknownPluginType(String),

    #[error("duplicate plugin name '{0}'")]
    DuplicatePluginName(String),

    #[error("failed to instantiate plugin '{name}': {source}")]
    Plugin {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no scheduling profiles configured")]
    NoProfiles,

    #[error("duplicate scheduling profile name '{0}'")]
    DuplicateProfileName(String),

    #[error("profile '{profile}' references unknown plugin '{plugin_ref}'")]
    UnknownPluginRef { profile: String, plugin_ref: String },

    #[error("profile '{profile}' reference '{plugin_ref}' is not a filter, scorer or picker")]
    UnusablePlugin { profile: String, plugin_ref: String },

    #[error("profile '{profile}' sets a weight on '{plugin_ref}', which is not a scorer")]
    InvalidWeight { profile: String, plugin_ref: String },

    #[error("profile '{0}' must contain exactly one picker")]
    ProfileWithoutPicker(String),

    #[error("profile '{profile}' contains a second picker '{plugin_ref}'")]
    MultiplePickers { profile: String, plugin_ref: String },

    #[error("more than one profile-handler plugin is configured")]
    MultipleProfileHandlers,

    #[error("a profile-handler plugin is required when more than one profile is configured")]
    MissingProfileHandler,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    api_version: String,
    kind: String,
    #[serde(default)]
    plugins: Vec<RawPlugin>,
    #[serde(default)]
    scheduling_profiles: Vec<RawProfile>,
}

#[derive(Debug, Deserialize)]
struct RawPlugin {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    plugin_type: String,
    #[serde(default)]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    name: String,
    #[serde(default)]
    plugins: Vec<RawPluginRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPluginRef {
    plugin_ref: String,
    #[serde(default)]
    weight: Option<i64>,
}

/// Everything a host needs out of one configuration document.
pub struct LoadedConfig {
    pub scheduler: Scheduler,
    pub request_control: RequestControl,
    /// Every instantiated plugin by instance name.
    pub plugins: HashMap<String, Arc<dyn Plugin>>,
}

/// Loads a configuration from inline text.
pub fn load_config(
    text: &str,
    registry: &PluginRegistry,
    handle: &PluginHandle,
) -> Result<LoadedConfig, ConfigError> {
    let raw: RawConfig = serde_yaml::from_str(text)?;
    if raw.api_version != API_VERSION {
        return Err(ConfigError::UnsupportedApiVersion(raw.api_version));
    }
    if raw.kind != KIND {
        return Err(ConfigError::UnsupportedKind(raw.kind));
    }
    if raw.scheduling_profiles.is_empty() {
        return Err(ConfigError::NoProfiles);
    }

    // Instantiate each declared plugin exactly once, in declaration order.
    let mut ordered_plugins: Vec<Arc<dyn Plugin>> = Vec::with_capacity(raw.plugins.len());
    let mut plugins: HashMap<String, Arc<dyn Plugin>> = HashMap::new();
    for raw_plugin in &raw.plugins {
        let name = match raw_plugin.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => raw_plugin.plugin_type.as_str(),
        };
        if plugins.contains_key(name) {
            return Err(ConfigError::DuplicatePluginName(name.to_string()));
        }

        let factory = registry
            .factory(&raw_plugin.plugin_type)
            .ok_or_else(|| ConfigError::UnknownPluginType(raw_plugin.plugin_type.clone()))?;
        let plugin =
            factory(name, raw_plugin.parameters.as_ref(), handle).map_err(|source| {
                ConfigError::Plugin {
                    name: name.to_string(),
                    source,
                }
            })?;

        tracing::debug!(
            plugin_type = %raw_plugin.plugin_type,
            name,
            "instantiated plugin"
        );
        ordered_plugins.push(plugin.clone());
        plugins.insert(name.to_string(), plugin);
    }

    let mut profiles: HashMap<String, SchedulerProfile> = HashMap::new();
    for raw_profile in &raw.scheduling_profiles {
        if profiles.contains_key(&raw_profile.name) {
            return Err(ConfigError::DuplicateProfileName(raw_profile.name.clone()));
        }
        let profile = build_profile(raw_profile, &plugins)?;
        profiles.insert(raw_profile.name.clone(), profile);
    }

    let handler = select_profile_handler(&ordered_plugins, profiles.len(), registry, handle)?;
    let request_control = RequestControl::new(ordered_plugins.iter().cloned());

    Ok(LoadedConfig {
        scheduler: Scheduler::new(profiles, handler),
        request_control,
        plugins,
    })
}

/// Loads a configuration from a file.
pub fn load_config_file(
    path: impl AsRef<Path>,
    registry: &PluginRegistry,
    handle: &PluginHandle,
) -> Result<LoadedConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    load_config(&text, registry, handle)
}

fn build_profile(
    raw_profile: &RawProfile,
    plugins: &HashMap<String, Arc<dyn Plugin>>,
) -> Result<SchedulerProfile, ConfigError> {
    let mut filters = Vec::new();
    let mut scorers = Vec::new();
    let mut picker: Option<Arc<dyn Plugin>> = None;

    for reference in &raw_profile.plugins {
        let plugin = plugins.get(&reference.plugin_ref).ok_or_else(|| {
            ConfigError::UnknownPluginRef {
                profile: raw_profile.name.clone(),
                plugin_ref: reference.plugin_ref.clone(),
            }
        })?;

        let is_scorer = plugin.as_scorer().is_some();
        if reference.weight.is_some() && !is_scorer {
            return Err(ConfigError::InvalidWeight {
                profile: raw_profile.name.clone(),
                plugin_ref: reference.plugin_ref.clone(),
            });
        }

        // A plugin joins every profile role it implements.
        let mut usable = false;
        if plugin.as_filter().is_some() {
            filters.push(plugin.clone());
            usable = true;
        }
        if is_scorer {
            scorers.push(WeightedScorer {
                plugin: plugin.clone(),
                weight: reference.weight.unwrap_or(DEFAULT_SCORER_WEIGHT),
            });
            usable = true;
        }
        if plugin.as_picker().is_some() {
            if picker.is_some() {
                return Err(ConfigError::MultiplePickers {
                    profile: raw_profile.name.clone(),
                    plugin_ref: reference.plugin_ref.clone(),
                });
            }
            picker = Some(plugin.clone());
            usable = true;
        }
        if !usable {
            return Err(ConfigError::UnusablePlugin {
                profile: raw_profile.name.clone(),
                plugin_ref: reference.plugin_ref.clone(),
            });
        }
    }

    let picker = picker.ok_or_else(|| ConfigError::ProfileWithoutPicker(raw_profile.name.clone()))?;
    Ok(SchedulerProfile::new(
        raw_profile.name.clone(),
        filters,
        scorers,
        picker,
    ))
}

fn select_profile_handler(
    plugins: &[Arc<dyn Plugin>],
    profile_count: usize,
    registry: &PluginRegistry,
    handle: &PluginHandle,
) -> Result<Arc<dyn Plugin>, ConfigError> {
    let mut handlers = plugins
        .iter()
        .filter(|plugin| plugin.as_profile_handler().is_some());
    match (handlers.next(), handlers.next()) {
        (Some(handler), None) => Ok(handler.clone()),
        (Some(_), Some(_)) => Err(ConfigError::MultipleProfileHandlers),
        (None, _) if profile_count == 1 => {
            // A lone profile gets the single-profile handler implicitly.
            let factory = registry
                .factory(SINGLE_PROFILE_HANDLER_TYPE)
                .ok_or(ConfigError::MissingProfileHandler)?;
            factory(SINGLE_PROFILE_HANDLER_TYPE, None, handle).map_err(|source| {
                ConfigError::Plugin {
                    name: SINGLE_PROFILE_HANDLER_TYPE.to_string(),
                    source,
                }
            })
        }
        (None, _) => Err(ConfigError::MissingProfileHandler),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PluginRegistry {
        PluginRegistry::with_builtin_plugins()
    }

    fn load(text: &str) -> Result<LoadedConfig, ConfigError> {
        load_config(text, &registry(), &PluginHandle::default())
    }

    const VALID: &str = r#"
apiVersion: inference.networking.x-k8s.io/v1alpha1
kind: EndpointPickerConfig
plugins:
- type: decode-filter
- type: load-aware-scorer
  parameters:
    threshold: 64
- type: max-score-picker
schedulingProfiles:
- name: default
  plugins:
  - pluginRef: decode-filter
  - pluginRef: load-aware-scorer
    weight: 2
  - pluginRef: max-score-picker
"#;

    #[tokio::test]
    async fn valid_single_profile_config_loads() {
        let loaded = load(VALID).unwrap();
        assert_eq!(loaded.plugins.len(), 3);
        assert!(loaded.scheduler.profiles().contains_key("default"));
    }

    #[tokio::test]
    async fn plugin_name_defaults_to_type() {
        let loaded = load(VALID).unwrap();
        assert!(loaded.plugins.contains_key("load-aware-scorer"));
    }

    #[test]
    fn wrong_api_version_is_rejected() {
        let text = VALID.replace("v1alpha1", "v9");
        assert!(matches!(
            load(&text),
            Err(ConfigError::UnsupportedApiVersion(_))
        ));
    }

    #[test]
    fn unknown_plugin_type_is_fatal() {
        let text = VALID.replace("type: max-score-picker", "type: no-such-picker");
        assert!(matches!(load(&text), Err(ConfigError::UnknownPluginType(_))));
    }

    #[test]
    fn duplicate_plugin_name_is_fatal() {
        let text = r#"
apiVersion: inference.networking.x-k8s.io/v1alpha1
kind: EndpointPickerConfig
plugins:
- type: max-score-picker
  name: picker
- type: random-picker
  name: picker
schedulingProfiles:
- name: default
  plugins:
  - pluginRef: picker
"#;
        assert!(matches!(
            load(text),
            Err(ConfigError::DuplicatePluginName(_))
        ));
    }

    #[test]
    fn dangling_plugin_ref_is_fatal() {
        let text = VALID.replace("pluginRef: decode-filter", "pluginRef: missing");
        assert!(matches!(
            load(&text),
            Err(ConfigError::UnknownPluginRef { .. })
        ));
    }

    #[test]
    fn profile_needs_a_picker() {
        let text = r#"
apiVersion: inference.networking.x-k8s.io/v1alpha1
kind: EndpointPickerConfig
plugins:
- type: load-aware-scorer
schedulingProfiles:
- name: default
  plugins:
  - pluginRef: load-aware-scorer
"#;
        assert!(matches!(
            load(text),
            Err(ConfigError::ProfileWithoutPicker(_))
        ));
    }

    #[test]
    fn two_pickers_in_one_profile_are_rejected() {
        let text = r#"
apiVersion: inference.networking.x-k8s.io/v1alpha1
kind: EndpointPickerConfig
plugins:
- type: max-score-picker
- type: random-picker
schedulingProfiles:
- name: default
  plugins:
  - pluginRef: max-score-picker
  - pluginRef: random-picker
"#;
        assert!(matches!(
            load(text),
            Err(ConfigError::MultiplePickers { .. })
        ));
    }

    #[test]
    fn weight_on_a_non_scorer_is_rejected() {
        let text = r#"
apiVersion: inference.networking.x-k8s.io/v1alpha1
kind: EndpointPickerConfig
plugins:
- type: max-score-picker
schedulingProfiles:
- name: default
  plugins:
  - pluginRef: max-score-picker
    weight: 3
"#;
        assert!(matches!(load(text), Err(ConfigError::InvalidWeight { .. })));
    }

    #[test]
    fn multi_profile_config_needs_a_handler() {
        let text = r#"
apiVersion: inference.networking.x-k8s.io/v1alpha1
kind: EndpointPickerConfig
plugins:
- type: prefill-filter
- type: decode-filter
- type: max-score-picker
schedulingProfiles:
- name: prefill
  plugins:
  - pluginRef: prefill-filter
  - pluginRef: max-score-picker
- name: decode
  plugins:
  - pluginRef: decode-filter
  - pluginRef: max-score-picker
"#;
        assert!(matches!(load(text), Err(ConfigError::MissingProfileHandler)));
    }

    #[tokio::test]
    async fn pd_config_loads_with_handler() {
        let text = r#"
apiVersion: inference.networking.x-k8s.io/v1alpha1
kind: EndpointPickerConfig
plugins:
- type: prefill-filter
- type: decode-filter
- type: prefix-cache-scorer
  parameters:
    blockSize: 5
- type: max-score-picker
- type: pd-profile-handler
  parameters:
    threshold: 10
    blockSize: 5
- type: prefill-header
schedulingProfiles:
- name: prefill
  plugins:
  - pluginRef: prefill-filter
  - pluginRef: prefix-cache-scorer
  - pluginRef: max-score-picker
- name: decode
  plugins:
  - pluginRef: decode-filter
  - pluginRef: prefix-cache-scorer
    weight: 2
  - pluginRef: max-score-picker
"#;
        let loaded = load(text).unwrap();
        assert_eq!(loaded.scheduler.profiles().len(), 2);
        assert!(loaded.plugins.contains_key("pd-profile-handler"));
    }

    #[test]
    fn hook_plugin_inside_a_profile_is_rejected() {
        let text = r#"
apiVersion: inference.networking.x-k8s.io/v1alpha1
kind: EndpointPickerConfig
plugins:
- type: prefill-header
- type: max-score-picker
schedulingProfiles:
- name: default
  plugins:
  - pluginRef: prefill-header
  - pluginRef: max-score-picker
"#;
        assert!(matches!(load(text), Err(ConfigError::UnusablePlugin { .. })));
    }
}
