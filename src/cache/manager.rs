//! Key scheme and typed accessors layered over a `CacheBackend`.

// self
use crate::{_prelude::*, cache::backend::CacheBackend, types::CachedBundle};
#[cfg(feature = "metrics")] use crate::metrics;

/// Bumped to invalidate every existing key without a schema migration, per
/// spec.md §6.3.
pub const CACHE_VERSION: &str = "v1";

/// TTL applied to a negative-cache entry (all providers failed).
pub const NEGATIVE_TTL: Duration = Duration::from_secs(60);

fn merged_key(ip: &str) -> String {
	format!("{CACHE_VERSION}:merged:{ip}")
}

fn ai_key(ip: &str) -> String {
	format!("{CACHE_VERSION}:ai:analysis:{ip}")
}

/// Typed façade over a `CacheBackend`: merged-record bundles (positive and
/// negative) plus LLM analysis text.
///
/// Every method is fail-open: a backend error is logged and treated as a
/// miss, matching spec.md §4.4/§5's "cache errors never abort aggregation"
/// rule.
#[derive(Debug)]
pub struct CacheManager<B> {
	backend: B,
	positive_ttl: Duration,
}
impl<B: CacheBackend> CacheManager<B> {
	/// Build a manager over the given backend, using `positive_ttl` for
	/// successful-aggregation bundles.
	pub fn new(backend: B, positive_ttl: Duration) -> Self {
		Self { backend, positive_ttl }
	}

	/// Look up the cached bundle for an IP, regardless of positive/negative status.
	#[tracing::instrument(level = "debug", skip(self))]
	pub async fn get_merged(&self, ip: &str) -> Option<CachedBundle> {
		let bundle = match self.backend.get(&merged_key(ip)).await {
			Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
				Ok(bundle) => Some(bundle),
				Err(err) => {
					tracing::warn!(ip, error = %err, "cached bundle failed to deserialize, treating as miss");

					None
				},
			},
			Ok(None) => None,
			Err(err) => {
				tracing::warn!(ip, error = %err, "cache read failed, treating as miss");

				None
			},
		};

		#[cfg(feature = "metrics")]
		match &bundle {
			Some(bundle) => metrics::record_cache_hit(bundle.is_negative_cache),
			None => metrics::record_cache_miss(),
		}

		bundle
	}

	/// Persist a bundle as a positive-TTL entry.
	#[tracing::instrument(level = "debug", skip(self, bundle))]
	pub async fn set_positive(&self, ip: &str, bundle: &CachedBundle) {
		self.write(ip, bundle, self.positive_ttl).await;
	}

	/// Persist a bundle as a negative-TTL entry (`isNegativeCache=true`, short TTL).
	#[tracing::instrument(level = "debug", skip(self, bundle))]
	pub async fn set_negative(&self, ip: &str, bundle: &CachedBundle) {
		self.write(ip, bundle, NEGATIVE_TTL).await;
	}

	async fn write(&self, ip: &str, bundle: &CachedBundle, ttl: Duration) {
		let Ok(bytes) = serde_json::to_vec(bundle) else {
			tracing::warn!(ip, "failed to serialize cache bundle, skipping write");

			return;
		};

		if let Err(err) = self.backend.set(&merged_key(ip), bytes, ttl).await {
			tracing::warn!(ip, error = %err, "cache write failed, continuing without it");
		}
	}

	/// Look up cached LLM analysis text for an IP.
	pub async fn get_ai_analysis(&self, ip: &str) -> Option<String> {
		match self.backend.get(&ai_key(ip)).await {
			Ok(Some(bytes)) => String::from_utf8(bytes).ok(),
			_ => None,
		}
	}

	/// Persist LLM analysis text for an IP, using the configured positive TTL.
	pub async fn set_ai_analysis(&self, ip: &str, reasoning: &str) {
		if let Err(err) = self.backend.set(&ai_key(ip), reasoning.as_bytes().to_vec(), self.positive_ttl).await {
			tracing::warn!(ip, error = %err, "AI analysis cache write failed, continuing without it");
		}
	}
}

#[cfg(test)]
mod tests {
	use chrono::Utc;

	use super::*;
	use crate::cache::backend::InMemoryBackend;

	fn bundle(successful: Vec<&str>, is_negative: bool) -> CachedBundle {
		CachedBundle {
			merged: Default::default(),
			successful: successful.into_iter().map(str::to_string).collect(),
			errors: Vec::new(),
			asn: None,
			cached_at: Utc::now(),
			is_negative_cache: is_negative,
		}
	}

	#[tokio::test]
	async fn positive_entry_round_trips() {
		let manager = CacheManager::new(InMemoryBackend::new(), Duration::from_secs(900));
		manager.set_positive("1.2.3.4", &bundle(vec!["ipinfo"], false)).await;

		let hit = manager.get_merged("1.2.3.4").await.expect("hit");
		assert!(!hit.is_negative_cache);
		assert_eq!(hit.successful, vec!["ipinfo".to_string()]);
	}

	#[tokio::test]
	async fn negative_entry_is_marked() {
		let manager = CacheManager::new(InMemoryBackend::new(), Duration::from_secs(900));
		manager.set_negative("1.2.3.4", &bundle(vec![], true)).await;

		let hit = manager.get_merged("1.2.3.4").await.expect("hit");
		assert!(hit.is_negative_cache);
	}

	#[tokio::test]
	async fn miss_returns_none() {
		let manager = CacheManager::new(InMemoryBackend::new(), Duration::from_secs(900));
		assert!(manager.get_merged("9.9.9.9").await.is_none());
	}

	#[tokio::test]
	async fn ai_analysis_round_trips() {
		let manager = CacheManager::new(InMemoryBackend::new(), Duration::from_secs(900));
		manager.set_ai_analysis("1.2.3.4", "This IP looks clean.").await;

		assert_eq!(manager.get_ai_analysis("1.2.3.4").await.as_deref(), Some("This IP looks clean."));
	}
}
