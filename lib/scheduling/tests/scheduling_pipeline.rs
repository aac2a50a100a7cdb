// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scheduling scenarios: configuration in, scheduling result
//! and decorated headers out.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio_util::sync::CancellationToken;

use epp_scheduling::hooks::prefill_header::PREFILLER_URL_HEADER;
use epp_scheduling::scorers::session_affinity::SESSION_TOKEN_HEADER;
use epp_scheduling::types::{MetricsSnapshot, NamespacedName, Pod};
use epp_scheduling::{LoadedConfig, PluginHandle, PluginRegistry, Request, load_config};

const TARGET_PORT: u16 = 8000;

fn load(text: &str) -> LoadedConfig {
    // First caller wins; later calls fail harmlessly once a subscriber is
    // installed. RUST_LOG steers verbosity when debugging a scenario.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    load_config(
        text,
        &PluginRegistry::with_builtin_plugins(),
        &PluginHandle::default(),
    )
    .expect("configuration must load")
}

fn pod(name: &str, address: &str, role: Option<&str>) -> Arc<Pod> {
    let mut labels = HashMap::new();
    if let Some(role) = role {
        labels.insert("llm-d.ai/role".to_string(), role.to_string());
    }
    Arc::new(Pod {
        namespaced_name: NamespacedName::new("default", name),
        address: address.to_string(),
        labels,
        metrics: MetricsSnapshot::default(),
    })
}

fn request(id: &str, prompt: &str) -> Request {
    Request {
        request_id: id.to_string(),
        target_model: "food-review".to_string(),
        prompt: prompt.to_string(),
        headers: HashMap::new(),
    }
}

const DEFAULT_CONFIG: &str = r#"
apiVersion: inference.networking.x-k8s.io/v1alpha1
kind: EndpointPickerConfig
plugins:
- type: decode-filter
- type: load-aware-scorer
- type: max-score-picker
schedulingProfiles:
- name: default
  plugins:
  - pluginRef: decode-filter
  - pluginRef: load-aware-scorer
  - pluginRef: max-score-picker
"#;

#[tokio::test]
async fn single_decode_pod_short_prompt() {
    let loaded = load(DEFAULT_CONFIG);
    let candidates = vec![pod("pod-dec", "10.0.0.1", Some("decode"))];

    let result = loaded
        .scheduler
        .schedule(&CancellationToken::new(), &request("r1", "hi"), &candidates)
        .await
        .unwrap();

    assert_eq!(result.primary_profile_name, "default");
    assert_eq!(
        result.primary_target().unwrap().namespaced_name,
        NamespacedName::new("default", "pod-dec")
    );
}

const PD_CONFIG: &str = r#"
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
  - pluginRef: max-score-picker
"#;

fn pd_candidates() -> Vec<Arc<Pod>> {
    vec![
        pod("pod-p", "10.0.0.2", Some("prefill")),
        pod("pod-d", "10.0.0.1", Some("decode")),
    ]
}

#[tokio::test]
async fn pd_short_prompt_below_threshold_skips_prefill() {
    let loaded = load(PD_CONFIG);

    let result = loaded
        .scheduler
        .schedule(
            &CancellationToken::new(),
            &request("r1", "12345"),
            &pd_candidates(),
        )
        .await
        .unwrap();

    assert_eq!(result.primary_profile_name, "decode");
    assert_eq!(
        result.primary_target().unwrap().namespaced_name,
        NamespacedName::new("default", "pod-d")
    );
    assert!(!result.profile_results.contains_key("prefill"));
}

#[tokio::test]
async fn pd_long_cold_prompt_runs_prefill_and_sets_header() {
    let loaded = load(PD_CONFIG);
    let token = CancellationToken::new();
    let mut req = request("r1", "12345678906");

    let result = loaded
        .scheduler
        .schedule(&token, &req, &pd_candidates())
        .await
        .unwrap();

    assert_eq!(result.primary_profile_name, "decode");
    assert_eq!(
        result.primary_target().unwrap().namespaced_name,
        NamespacedName::new("default", "pod-d")
    );
    assert_eq!(
        result.profile_results["prefill"]
            .target_pod()
            .unwrap()
            .namespaced_name,
        NamespacedName::new("default", "pod-p")
    );

    loaded
        .request_control
        .pre_request(&token, &mut req, &result, TARGET_PORT)
        .await;
    assert_eq!(
        req.header(PREFILLER_URL_HEADER),
        Some("http://10.0.0.2:8000")
    );
}

#[tokio::test]
async fn pd_warm_cache_skips_prefill_on_repeat() {
    let loaded = load(PD_CONFIG);
    let token = CancellationToken::new();
    let candidates = pd_candidates();
    let prompt = "12345678906";

    // Cold round: prefill runs.
    let mut req = request("r1", prompt);
    let result = loaded
        .scheduler
        .schedule(&token, &req, &candidates)
        .await
        .unwrap();
    assert!(result.profile_results.contains_key("prefill"));

    // The response from the decode pod warms the prefix index.
    let target = result.primary_target().unwrap().clone();
    loaded
        .request_control
        .post_response(&token, &mut req, &target)
        .await;

    // Warm round, same prompt: the non-cached suffix is now below the
    // threshold, so only decode runs and no prefill header is written.
    let mut repeat = request("r2", prompt);
    let result = loaded
        .scheduler
        .schedule(&token, &repeat, &candidates)
        .await
        .unwrap();
    assert_eq!(result.primary_profile_name, "decode");
    assert!(!result.profile_results.contains_key("prefill"));

    loaded
        .request_control
        .pre_request(&token, &mut repeat, &result, TARGET_PORT)
        .await;
    assert_eq!(repeat.header(PREFILLER_URL_HEADER), None);
}

const SESSION_CONFIG: &str = r#"
apiVersion: inference.networking.x-k8s.io/v1alpha1
kind: EndpointPickerConfig
plugins:
- type: decode-filter
- type: session-affinity-scorer
- type: load-aware-scorer
- type: max-score-picker
schedulingProfiles:
- name: default
  plugins:
  - pluginRef: decode-filter
  - pluginRef: session-affinity-scorer
  - pluginRef: load-aware-scorer
  - pluginRef: max-score-picker
"#;

#[tokio::test]
async fn session_token_pins_the_pod() {
    let loaded = load(SESSION_CONFIG);
    let token = CancellationToken::new();
    let candidates = vec![
        pod("pod-a", "10.0.0.1", Some("decode")),
        pod("pod-b", "10.0.0.2", Some("decode")),
    ];

    for id in ["r1", "r2"] {
        let mut req = request(id, "hello");
        req.headers.insert(
            SESSION_TOKEN_HEADER.to_string(),
            BASE64.encode("default/pod-b"),
        );

        let result = loaded
            .scheduler
            .schedule(&token, &req, &candidates)
            .await
            .unwrap();
        assert_eq!(
            result.primary_target().unwrap().namespaced_name,
            NamespacedName::new("default", "pod-b")
        );
    }
}

const SPREAD_CONFIG: &str = r#"
apiVersion: inference.networking.x-k8s.io/v1alpha1
kind: EndpointPickerConfig
plugins:
- type: decode-filter
- type: active-request-scorer
- type: load-aware-scorer
- type: max-score-picker
schedulingProfiles:
- name: default
  plugins:
  - pluginRef: decode-filter
  - pluginRef: active-request-scorer
    weight: 100
  - pluginRef: load-aware-scorer
  - pluginRef: max-score-picker
"#;

#[tokio::test]
async fn in_flight_request_spreads_the_next_one() {
    let loaded = load(SPREAD_CONFIG);
    let token = CancellationToken::new();
    let candidates = vec![
        pod("pod-a", "10.0.0.1", Some("decode")),
        pod("pod-b", "10.0.0.2", Some("decode")),
    ];

    let mut first = request("r1", "hello");
    let first_result = loaded
        .scheduler
        .schedule(&token, &first, &candidates)
        .await
        .unwrap();
    let first_target = first_result.primary_target().unwrap().clone();

    // First request is dispatched and still in flight.
    loaded
        .request_control
        .pre_request(&token, &mut first, &first_result, TARGET_PORT)
        .await;

    let second_result = loaded
        .scheduler
        .schedule(&token, &request("r2", "hello"), &candidates)
        .await
        .unwrap();
    let second_target = second_result.primary_target().unwrap();
    assert_ne!(
        second_target.namespaced_name, first_target.namespaced_name,
        "second request must land on the other decode pod"
    );
}
