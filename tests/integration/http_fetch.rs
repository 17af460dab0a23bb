//! `http::client::fetch_provider` exercised against a real HTTP server.
//!
//! The six shipped `ProviderDescriptor`s hardcode production hostnames in
//! `build_request` (a plain `fn` pointer, so it cannot capture a mock
//! server's dynamically-assigned port). These tests build a synthetic
//! descriptor whose `build_request` reads the mock base URL from a
//! process-wide `OnceLock`, set once per test before the request is issued.

use std::sync::OnceLock;

use ipcheck_core::credential::FailureKind;
use ipcheck_core::http::client::{MAX_RESPONSE_BYTES, fetch_provider};
use ipcheck_core::provider::{FetchContext, ProviderDescriptor, ProviderKind, RequestSpec};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static BASE_URL: OnceLock<String> = OnceLock::new();

fn set_base_url(url: String) {
	// Each test process only ever targets one mock server at a time; tests in
	// this file run against a shared `OnceLock`, so keep them single-threaded
	// within the file (the default `cargo test` per-binary thread pool still
	// runs files concurrently, each with its own `OnceLock`).
	let _ = BASE_URL.set(url);
}

fn build_request(_ctx: &FetchContext) -> RequestSpec {
	let base = BASE_URL.get().expect("base url set before first request");
	let url = url::Url::parse(&format!("{base}/lookup")).unwrap();

	RequestSpec { url, headers: vec![("x-test-provider", "synthetic".to_string())] }
}

fn descriptor() -> ProviderDescriptor {
	ProviderDescriptor {
		name: "synthetic",
		kind: ProviderKind::NoKey,
		requires_key: false,
		enabled: |_| true,
		build_request,
		check_error: |payload: &Value| payload.get("error").and_then(Value::as_str).map(str::to_string),
		transform: |payload: &Value| {
			let mut map = ipcheck_core::types::NormalizedMap::new();
			if let Some(country) = payload.get("country").and_then(Value::as_str) {
				map.insert("country".to_string(), country.into());
			}
			map
		},
		raw_data_transform: None,
	}
}

fn ctx<'a>() -> FetchContext<'a> {
	FetchContext { ip: "8.8.8.8", asn: None, key: None }
}

#[tokio::test]
async fn successful_response_is_transformed() {
	let server = MockServer::start().await;
	Mock::given(method("GET")).and(path("/lookup")).respond_with(ResponseTemplate::new(200).set_body_json(json!({"country": "US"}))).mount(&server).await;
	set_base_url(server.uri());

	let outcome = fetch_provider(&reqwest::Client::new(), &descriptor(), &ctx(), std::time::Duration::from_secs(5)).await.expect("fetch succeeds");

	assert_eq!(outcome.data.get("country").and_then(|v| v.as_str()), Some("US"));
}

#[tokio::test]
async fn non_2xx_status_is_reported_as_http_failure() {
	let server = MockServer::start().await;
	Mock::given(method("GET")).and(path("/lookup")).respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable")).mount(&server).await;
	set_base_url(server.uri());

	let err = fetch_provider(&reqwest::Client::new(), &descriptor(), &ctx(), std::time::Duration::from_secs(5)).await.unwrap_err();

	assert_eq!(err.0, FailureKind::Http { status: 503 });
	assert!(err.1.contains("upstream unavailable"));
}

#[tokio::test]
async fn logical_failure_in_200_payload_is_classified_as_http_failure() {
	let server = MockServer::start().await;
	Mock::given(method("GET")).and(path("/lookup")).respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "invalid ip supplied"}))).mount(&server).await;
	set_base_url(server.uri());

	let err = fetch_provider(&reqwest::Client::new(), &descriptor(), &ctx(), std::time::Duration::from_secs(5)).await.unwrap_err();

	assert_eq!(err.1, "invalid ip supplied");
}

#[tokio::test]
async fn oversized_response_is_rejected_before_parsing() {
	let server = MockServer::start().await;
	let oversized = "x".repeat((MAX_RESPONSE_BYTES + 1) as usize);
	Mock::given(method("GET")).and(path("/lookup")).respond_with(ResponseTemplate::new(200).set_body_string(oversized)).mount(&server).await;
	set_base_url(server.uri());

	let err = fetch_provider(&reqwest::Client::new(), &descriptor(), &ctx(), std::time::Duration::from_secs(5)).await.unwrap_err();

	assert!(err.1.contains("exceeds"));
}
