//! Execute one provider fetch attempt: build the request from a
//! `ProviderDescriptor`, issue it, and either run `transform` on a
//! successful payload or classify the failure for the credential pool.

// crates.io
use reqwest::Client;
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	credential::FailureKind,
	provider::{FetchContext, ProviderDescriptor},
	types::NormalizedMap,
};

/// Response bodies larger than this are rejected rather than buffered in
/// full; an ambient robustness guard, not a documented provider contract.
pub const MAX_RESPONSE_BYTES: u64 = 2 * 1024 * 1024;

/// What one successful provider fetch produced.
#[derive(Clone, Debug)]
pub struct FetchOutcome {
	/// The flat normalized projection.
	pub data: NormalizedMap,
	/// Optional preserved payload for UI/debugging.
	pub raw_data: Option<Value>,
}

/// Fetch and normalize one provider's response for one attempt.
///
/// Returns `Err((FailureKind, message))` on any failure — transport error,
/// non-2xx status, or a logical failure caught by `check_error` — so the
/// caller (the credential pool executor loop, or a direct call for no-key
/// providers) can classify and decide whether to retry.
pub async fn fetch_provider(
	client: &Client,
	descriptor: &ProviderDescriptor,
	ctx: &FetchContext<'_>,
	timeout: Duration,
) -> std::result::Result<FetchOutcome, (FailureKind, String)> {
	let request = (descriptor.build_request)(ctx);

	let mut builder = client.get(request.url.clone()).timeout(timeout);
	for (name, value) in &request.headers {
		builder = builder.header(*name, value);
	}

	let start = Instant::now();
	let response = builder.send().await.map_err(|err| (FailureKind::Transport, err.to_string()))?;
	let status = response.status();

	if !status.is_success() {
		let body = response.text().await.unwrap_or_default();

		tracing::debug!(provider = descriptor.name, %status, elapsed = ?start.elapsed(), "provider returned non-2xx");

		return Err((FailureKind::Http { status: status.as_u16() }, body));
	}

	let bytes = response.bytes().await.map_err(|err| (FailureKind::Transport, err.to_string()))?;

	if bytes.len() as u64 > MAX_RESPONSE_BYTES {
		return Err((
			FailureKind::Transport,
			format!("response size {size} bytes exceeds the {limit} byte guard", size = bytes.len(), limit = MAX_RESPONSE_BYTES),
		));
	}

	let payload: Value = serde_json::from_slice(&bytes).map_err(|err| (FailureKind::Transport, err.to_string()))?;

	if let Some(message) = (descriptor.check_error)(&payload) {
		return Err((FailureKind::Http { status: status.as_u16() }, message));
	}

	let data = (descriptor.transform)(&payload);
	let raw_data = descriptor.raw_data_transform.map(|f| f(&payload));

	tracing::debug!(provider = descriptor.name, elapsed = ?start.elapsed(), "provider fetch complete");

	Ok(FetchOutcome { data, raw_data })
}
