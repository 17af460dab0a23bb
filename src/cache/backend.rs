//! Pluggable storage behind the opaque TTL cache.
//!
//! The default backend is an in-process map; the optional `redis` feature
//! adds a Redis-backed implementation behind the same trait, generalizing
//! the teacher's `RedisPersistence` from warm-restart snapshotting to the
//! cache's primary store.

// std
use std::collections::HashMap;
// crates.io
#[cfg(feature = "redis")] use redis::AsyncCommands;
use tokio::sync::RwLock;
// self
use crate::_prelude::*;

/// Opaque byte-string key/value store with per-entry TTL.
///
/// Implementations must be **fail-open**: a storage error on read or write
/// degrades to "as if absent" rather than aborting the caller's aggregation,
/// per spec.md §4.4/§5. Concretely, `CacheManager` logs backend errors at
/// `tracing::warn!` and proceeds as on a miss.
pub trait CacheBackend: Send + Sync {
	/// Fetch a value by key, if present and unexpired.
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

	/// Store a value under `key` with the given TTL, replacing any existing entry.
	async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
}

#[derive(Debug)]
struct Slot {
	value: Vec<u8>,
	expires_at: Instant,
}

/// Default in-process backend: a single `RwLock<HashMap>` guarded the same
/// way the teacher guards `RegistryState`.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
	slots: RwLock<HashMap<String, Slot>>,
}
impl InMemoryBackend {
	/// Construct an empty backend.
	pub fn new() -> Self {
		Self::default()
	}
}
impl CacheBackend for InMemoryBackend {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
		let slots = self.slots.read().await;

		Ok(slots.get(key).filter(|slot| Instant::now() < slot.expires_at).map(|slot| slot.value.clone()))
	}

	async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
		let mut slots = self.slots.write().await;

		slots.insert(key.to_string(), Slot { value, expires_at: Instant::now() + ttl });

		Ok(())
	}
}

/// Redis-backed cache store, enabled by the `redis` feature.
#[cfg(feature = "redis")]
#[derive(Clone, Debug)]
pub struct RedisBackend {
	client: redis::Client,
}
#[cfg(feature = "redis")]
impl RedisBackend {
	/// Build a backend from a configured Redis client.
	pub fn new(client: redis::Client) -> Self {
		Self { client }
	}
}
#[cfg(feature = "redis")]
impl CacheBackend for RedisBackend {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
		let mut conn = self.client.get_multiplexed_async_connection().await?;
		let value: Option<Vec<u8>> = conn.get(key).await?;

		Ok(value)
	}

	async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
		let mut conn = self.client.get_multiplexed_async_connection().await?;
		let ttl_secs = ttl.as_secs().max(1);

		conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration as StdDuration;

	use super::*;

	#[tokio::test]
	async fn miss_then_hit_then_expiry() {
		let backend = InMemoryBackend::new();

		assert!(backend.get("k").await.unwrap().is_none());

		backend.set("k", b"v".to_vec(), Duration::from_millis(50)).await.unwrap();
		assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));

		tokio::time::sleep(StdDuration::from_millis(80)).await;
		assert!(backend.get("k").await.unwrap().is_none());
	}
}
