//! Credential pool rotation driven by real HTTP responses from a mock
//! provider, covering the 429-cooldown and stuck-key scenarios end to end.

use ipcheck_core::credential::{CredentialPool, FailureKind, run_with_pool};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn fetch_with_key(client: &reqwest::Client, server: &MockServer, key: String) -> Result<String, (FailureKind, String)> {
	let response = client
		.get(format!("{}/lookup", server.uri()))
		.header("x-api-key", key)
		.send()
		.await
		.map_err(|err| (FailureKind::Transport, err.to_string()))?;

	let status = response.status();
	let body = response.text().await.unwrap_or_default();

	if status.is_success() {
		Ok(body)
	} else {
		Err((FailureKind::Http { status: status.as_u16() }, body))
	}
}

#[tokio::test]
async fn single_key_pool_cools_down_after_repeated_429s_then_exhausts() {
	let server = MockServer::start().await;
	Mock::given(method("GET")).and(path("/lookup")).and(header("x-api-key", "only-key")).respond_with(ResponseTemplate::new(429).set_body_string("rate limited")).mount(&server).await;

	let pool = CredentialPool::new("mock-provider", &["only-key".to_string()]).unwrap();
	let client = reqwest::Client::new();

	let result: ipcheck_core::Result<String> = run_with_pool(&pool, |key| {
		let client = client.clone();
		let server = &server;

		async move { fetch_with_key(&client, server, key).await }
	})
	.await;

	assert!(result.is_err());

	let status = pool.status().await;
	assert_eq!(status.len(), 1);
	assert!(!status[0].1, "the only key should be marked unhealthy after repeated 429s");
}

#[tokio::test]
async fn three_key_pool_routes_around_one_stuck_key() {
	let server = MockServer::start().await;
	Mock::given(method("GET")).and(path("/lookup")).and(header("x-api-key", "bad-key")).respond_with(ResponseTemplate::new(401).set_body_string("invalid api key")).mount(&server).await;
	Mock::given(method("GET")).and(path("/lookup")).and(header("x-api-key", "good-key-1")).respond_with(ResponseTemplate::new(200).set_body_string("ok")).mount(&server).await;
	Mock::given(method("GET")).and(path("/lookup")).and(header("x-api-key", "good-key-2")).respond_with(ResponseTemplate::new(200).set_body_string("ok")).mount(&server).await;

	let pool = CredentialPool::new("mock-provider", &["bad-key".to_string(), "good-key-1".to_string(), "good-key-2".to_string()]).unwrap();
	let client = reqwest::Client::new();

	// Drive the bad key into cooldown first.
	for _ in 0..2 {
		pool.mark_failure("bad-key").await;
	}

	for _ in 0..6 {
		let result: ipcheck_core::Result<String> = run_with_pool(&pool, |key| {
			let client = client.clone();
			let server = &server;

			async move { fetch_with_key(&client, server, key).await }
		})
		.await;

		assert_eq!(result.unwrap(), "ok");
	}

	let status = pool.status().await;
	let bad = status.iter().find(|(key, ..)| key == "bad-key").unwrap();
	assert!(!bad.1, "bad-key should still be hidden, never having recovered");
}
