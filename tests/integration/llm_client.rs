//! `HttpLlmClient` against a mock OpenAI-compatible chat completion endpoint.

use ipcheck_core::llm::{Analysis, HttpLlmClient, summarize};
use ipcheck_core::types::{DerivedRecord, DerivedSummary, RecordMeta};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn record() -> DerivedRecord {
	DerivedRecord {
		ip: "1.2.3.4".to_string(),
		summary: DerivedSummary::default(),
		fields: BTreeMap::new(),
		providers: BTreeMap::new(),
		meta: RecordMeta {
			sources: vec!["ipguide".to_string()],
			api_errors: Vec::new(),
			cached: false,
			cached_api_count: 0,
			total_api_count: 1,
			timestamp: chrono::Utc::now(),
		},
	}
}

#[tokio::test]
async fn successful_chat_completion_is_used_verbatim() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/chat/completions"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"choices": [{"message": {"content": "**Verdict:** looks clean."}}]
		})))
		.mount(&server)
		.await;

	let client = HttpLlmClient::new(reqwest::Client::new(), server.uri(), "test-key", "gpt-test", Duration::from_secs(5));

	let Analysis { reasoning, debug } = summarize(&client, "1.2.3.4", &record()).await;

	assert_eq!(reasoning, "**Verdict:** looks clean.");
	assert!(debug.is_none());
}

#[tokio::test]
async fn non_2xx_response_becomes_failure_sentinel_without_poisoning_caller() {
	let server = MockServer::start().await;
	Mock::given(method("POST")).and(path("/chat/completions")).respond_with(ResponseTemplate::new(401).set_body_string("invalid api key")).mount(&server).await;

	let client = HttpLlmClient::new(reqwest::Client::new(), server.uri(), "test-key", "gpt-test", Duration::from_secs(5));

	let analysis = summarize(&client, "1.2.3.4", &record()).await;

	assert!(analysis.reasoning.starts_with("AI Analysis Failed"));
	assert!(analysis.debug.is_some());
}

#[tokio::test]
async fn malformed_response_body_becomes_failure_sentinel() {
	let server = MockServer::start().await;
	Mock::given(method("POST")).and(path("/chat/completions")).respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": "shape"}))).mount(&server).await;

	let client = HttpLlmClient::new(reqwest::Client::new(), server.uri(), "test-key", "gpt-test", Duration::from_secs(5));

	let analysis = summarize(&client, "1.2.3.4", &record()).await;

	assert!(analysis.reasoning.starts_with("AI Analysis Failed"));
}
