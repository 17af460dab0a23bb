//! Credential pool: rotates multiple API keys per provider, tracks per-key
//! health, and hides keys that are failing or rate-limited until they cool
//! down.

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// crates.io
use tokio::sync::RwLock;
// self
use crate::_prelude::*;

/// How long a failing key stays hidden before being re-probed.
pub const COOLDOWN: Duration = Duration::from_secs(5 * 60);
/// How long since the last failure before `failureCount` decays, provided it
/// hasn't reached the unhealthy threshold.
pub const FAILURE_DECAY: Duration = Duration::from_secs(2 * 60);
/// Consecutive failures after which a key is marked unhealthy.
pub const UNHEALTHY_THRESHOLD: u32 = 2;
/// Upper bound on attempts the executor loop makes against one pool.
pub const MAX_ATTEMPTS: usize = 3;

const KEY_RELATED_SUBSTRINGS: &[&str] = &[
	"rate limit",
	"quota",
	"limit exceeded",
	"request quota",
	"invalid key",
	"invalid api key",
	"unauthorized",
	"too many requests",
	"daily limit",
	"monthly limit",
	"exceeded",
	"throttl",
];

/// Per-key health bookkeeping.
#[derive(Clone, Debug)]
struct KeyHealth {
	key: String,
	is_healthy: bool,
	last_failure_at: Option<Instant>,
	failure_count: u32,
	success_count: u64,
}
impl KeyHealth {
	fn new(key: String) -> Self {
		Self { key, is_healthy: true, last_failure_at: None, failure_count: 0, success_count: 0 }
	}
}

/// Read-only snapshot of one key's health, for status/metrics reporting.
#[derive(Clone, Copy, Debug)]
pub struct KeyStatus<'a> {
	/// The key itself (callers should avoid logging this verbatim).
	pub key: &'a str,
	/// Whether the key currently passes `getNext()`'s health check.
	pub is_healthy: bool,
	/// Current consecutive failure count.
	pub failure_count: u32,
	/// Total successes recorded over the pool's lifetime.
	pub success_count: u64,
}

/// Why a provider call failed, as classified by the caller before reporting
/// it back to the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
	/// HTTP status plus response body, classified via `is_key_related_error`.
	Http { status: u16 },
	/// A non-HTTP transport failure (timeout, connection error).
	Transport,
}

/// Whether a given HTTP status/body combination indicates the key itself is
/// the problem (bad credential, rate limit, quota) rather than a transient
/// upstream fault.
pub fn is_key_related_error(status: Option<u16>, body: &str) -> bool {
	if matches!(status, Some(401) | Some(403) | Some(429)) {
		return true;
	}

	let lower = body.to_ascii_lowercase();

	KEY_RELATED_SUBSTRINGS.iter().any(|needle| lower.contains(needle))
}

/// Rotating pool of API keys for a single provider.
///
/// Keys are probed starting at a shared cursor; a key that has failed twice
/// in a row is hidden until `COOLDOWN` has elapsed since its last failure.
#[derive(Debug)]
pub struct CredentialPool {
	provider: String,
	keys: RwLock<Vec<KeyHealth>>,
	cursor: AtomicUsize,
}
impl CredentialPool {
	/// Build a pool from an ordered key list. Returns `None` when empty — a
	/// provider with no configured keys has no pool at all.
	pub fn new(provider: impl Into<String>, keys: &[String]) -> Option<Self> {
		if keys.is_empty() {
			return None;
		}

		Some(Self {
			provider: provider.into(),
			keys: RwLock::new(keys.iter().cloned().map(KeyHealth::new).collect()),
			cursor: AtomicUsize::new(0),
		})
	}

	/// Number of keys in the pool.
	pub async fn len(&self) -> usize {
		self.keys.read().await.len()
	}

	/// Whether the pool has no keys. `CredentialPool::new` never returns a
	/// pool with zero keys, so this is always `false`; kept for API symmetry.
	pub async fn is_empty(&self) -> bool {
		self.keys.read().await.is_empty()
	}

	/// Sweep expired cooldowns/decays, then return the next healthy key
	/// starting at the shared cursor. Returns `None` when every key in the
	/// pool is currently unhealthy.
	pub async fn get_next(&self) -> Option<String> {
		let now = Instant::now();
		let mut keys = self.keys.write().await;

		for health in keys.iter_mut() {
			let Some(last_failure_at) = health.last_failure_at else { continue };

			if now.duration_since(last_failure_at) >= COOLDOWN {
				health.is_healthy = true;
				health.failure_count = 0;
			} else if now.duration_since(last_failure_at) > FAILURE_DECAY && health.failure_count < UNHEALTHY_THRESHOLD
			{
				health.failure_count = 0;
			}
		}

		let len = keys.len();
		if len == 0 {
			return None;
		}

		for step in 0..len {
			let index = (self.cursor.fetch_add(1, Ordering::Relaxed) + step) % len;

			if keys[index].is_healthy {
				return Some(keys[index].key.clone());
			}
		}

		None
	}

	/// Record a successful call against `key`: bump its success counter and,
	/// if it had accumulated failures, mark it healthy again immediately.
	pub async fn mark_success(&self, key: &str) {
		let mut keys = self.keys.write().await;

		if let Some(health) = keys.iter_mut().find(|h| h.key == key) {
			health.success_count += 1;

			if health.failure_count > 0 {
				health.failure_count = 0;
				health.is_healthy = true;
			}
		}
	}

	/// Record a failed call against `key`, applying decay before counting the
	/// new failure, and marking the key unhealthy once it crosses the
	/// threshold.
	pub async fn mark_failure(&self, key: &str) {
		let now = Instant::now();
		let mut keys = self.keys.write().await;

		if let Some(health) = keys.iter_mut().find(|h| h.key == key) {
			if let Some(last_failure_at) = health.last_failure_at
				&& now.duration_since(last_failure_at) > FAILURE_DECAY
			{
				health.failure_count = 0;
			}

			health.failure_count += 1;
			health.last_failure_at = Some(now);

			if health.failure_count >= UNHEALTHY_THRESHOLD {
				health.is_healthy = false;
			}
		}
	}

	/// Read-only health snapshot of every key, for status/metrics reporting.
	pub async fn status(&self) -> Vec<(String, bool, u32, u64)> {
		self.keys
			.read()
			.await
			.iter()
			.map(|h| (h.key.clone(), h.is_healthy, h.failure_count, h.success_count))
			.collect()
	}

	/// Provider id this pool belongs to.
	pub fn provider(&self) -> &str {
		&self.provider
	}
}

/// Run `attempt` through the pool's executor loop: up to `min(pool size, 3)`
/// attempts, rotating keys on key-related or 5xx failures, stopping
/// immediately on any other error.
///
/// `attempt` receives the key to use and returns `Ok(T)` on success or
/// `Err((FailureKind, String))` — the failure kind plus a message. A
/// non-key-related failure stops the loop immediately and propagates as
/// `Error::ProviderFailed`; only a key-related/5xx failure that exhausts
/// every attempt becomes `Error::CredentialsExhausted`.
pub async fn run_with_pool<T, F, Fut>(pool: &CredentialPool, mut attempt: F) -> Result<T>
where
	F: FnMut(String) -> Fut,
	Fut: std::future::Future<Output = std::result::Result<T, (FailureKind, String)>>,
{
	let attempts = MAX_ATTEMPTS.min(pool.len().await.max(1));
	let mut last_message = String::from("no key available");

	for _ in 0..attempts {
		let Some(key) = pool.get_next().await else {
			last_message = "no key available".to_string();
			break;
		};

		match attempt(key.clone()).await {
			Ok(value) => {
				pool.mark_success(&key).await;

				return Ok(value);
			},
			Err((kind, message)) => {
				let key_related = match kind {
					FailureKind::Http { status } => is_key_related_error(Some(status), &message) || status >= 500,
					FailureKind::Transport => false,
				};

				if !key_related {
					return Err(Error::ProviderFailed { provider: pool.provider().to_string(), message });
				}

				last_message = message;
				pool.mark_failure(&key).await;
			},
		}
	}

	Err(Error::CredentialsExhausted { provider: pool.provider().to_string(), last_message })
}
