//! Single-IP Aggregator: cache-first, two-wave provider fan-out and merge.
//!
//! Wave 1 covers every enabled no-key and key-not-ASN provider. Once Wave 1
//! completes, the best ASN candidate is derived and, if present, Wave 2 runs
//! every enabled ASN-dependent provider. The merged result is written back to
//! the cache (positive on any success, negative on total failure) before
//! being handed to the caller. This module stops at the merged record; turning
//! that into a `DerivedRecord` is `derive`'s job.

// std
use std::collections::BTreeMap;
// crates.io
use futures::stream::{self, StreamExt};
use reqwest::Client;
// self
use crate::{
	_prelude::*,
	cache::{backend::CacheBackend, manager::CacheManager},
	config::Config,
	credential::{self, CredentialPool},
	provider::{self, FetchContext, ProviderDescriptor},
	types::{ApiErrorEntry, CachedBundle, MergedRecord, ProviderResult},
};
#[cfg(feature = "metrics")] use crate::metrics;

/// Upper bound on simultaneous outbound requests issued for one IP, within
/// one wave. A single IP's aggregation can never monopolize the connection
/// budget beyond this.
pub const DEFAULT_WAVE_CONCURRENCY: usize = 4;

/// Shared keys, in priority order, consulted when deriving the ASN used to
/// gate Wave 2. Heterogeneous naming/casing across providers is intentional.
const ASN_KEYS: [&str; 3] = ["asn", "ASN", "as"];

/// Result of aggregating one IP: the merged flat record plus bookkeeping
/// about which providers contributed it and whether it came from cache.
#[derive(Clone, Debug)]
pub struct SingleIpOutcome {
	/// The IP this outcome describes.
	pub ip: String,
	/// Best-known ASN, if one was derived (explicit hint or Wave-1 merge).
	pub asn: Option<String>,
	/// Shallow overlay of every successful provider's `data`, completion order.
	pub merged: MergedRecord,
	/// Providers that succeeded, in completion order.
	pub successful: Vec<String>,
	/// Providers that failed, with messages.
	pub errors: Vec<ApiErrorEntry>,
	/// Per-provider outcome. Populated in full on a fresh aggregation; on a
	/// cache hit, only `status`/`error` are known (the cache bundle does not
	/// retain individual provider payloads), so `data`/`raw_data` are empty.
	pub providers: BTreeMap<String, ProviderResult>,
	/// Whether this outcome was served from the cache rather than freshly fetched.
	pub cached: bool,
	/// Of the providers attempted, how many were served from cache (0 or all).
	pub cached_api_count: u32,
	/// Total providers attempted (successes plus failures).
	pub total_api_count: u32,
}

/// Orchestrates per-IP provider fan-out, merging, and caching.
pub struct Aggregator<B> {
	config: Config,
	client: Client,
	cache: CacheManager<B>,
	pools: BTreeMap<&'static str, CredentialPool>,
	wave_concurrency: usize,
}
impl<B: CacheBackend> Aggregator<B> {
	/// Build an aggregator over the given cache backend, constructing one
	/// credential pool per configured (non-empty) provider key list.
	pub fn new(config: Config, backend: B) -> Result<Self> {
		let client = Client::builder().build()?;
		let cache = CacheManager::new(backend, config.cache_ttl);

		let mut pools = BTreeMap::new();
		for descriptor in provider::registry() {
			if !descriptor.requires_key {
				continue;
			}

			if let Some(keys) = config.credentials_for(descriptor.name)
				&& let Some(pool) = CredentialPool::new(descriptor.name, keys.as_slice())
			{
				pools.insert(descriptor.name, pool);
			}
		}

		Ok(Self { config, client, cache, pools, wave_concurrency: DEFAULT_WAVE_CONCURRENCY })
	}

	/// Resolve one IP with no ASN hint; Wave 2 only runs if Wave 1 itself
	/// surfaces an ASN.
	pub async fn check_ip(&self, ip: &str) -> Result<SingleIpOutcome> {
		self.resolve(ip, None).await
	}

	/// Resolve one IP, seeding Wave 2's ASN from an upstream edge probe
	/// rather than waiting on Wave 1 to surface one.
	pub async fn check_ip_with_asn(&self, ip: &str, asn: &str) -> Result<SingleIpOutcome> {
		self.resolve(ip, Some(asn)).await
	}

	/// Resolve one IP: serve from cache when present, otherwise fan out
	/// across both waves, merge, and persist the result.
	#[tracing::instrument(level = "debug", skip(self))]
	pub async fn resolve(&self, ip: &str, asn_hint: Option<&str>) -> Result<SingleIpOutcome> {
		let ip = normalize_ip(ip)?;

		if let Some(bundle) = self.cache.get_merged(&ip).await {
			return Ok(from_cached_bundle(ip, bundle));
		}

		let partitioned = provider::partition_enabled(&self.config);
		let mut wave1 = partitioned.no_key;
		wave1.extend(partitioned.key_not_asn);

		let wave1_results = self.run_wave(&wave1, &ip, None).await;
		let mut merged = MergedRecord::new();
		let mut successful = Vec::new();
		let mut providers = BTreeMap::new();
		let mut errors = Vec::new();

		for result in wave1_results {
			absorb(result, &mut merged, &mut successful, &mut errors, &mut providers);
		}

		let asn = derive_asn(asn_hint, &merged);

		if let Some(asn) = asn.as_deref()
			&& !partitioned.asn_dependent.is_empty()
		{
			let wave2_results = self.run_wave(&partitioned.asn_dependent, &ip, Some(asn)).await;

			for result in wave2_results {
				absorb(result, &mut merged, &mut successful, &mut errors, &mut providers);
			}
		}

		let total_api_count = (successful.len() + errors.len()) as u32;

		if !successful.is_empty() {
			let bundle = CachedBundle {
				merged: merged.clone(),
				successful: successful.clone(),
				errors: errors.clone(),
				asn: asn.clone(),
				cached_at: Utc::now(),
				is_negative_cache: false,
			};

			self.cache.set_positive(&ip, &bundle).await;
		} else if !errors.is_empty() {
			let bundle = CachedBundle {
				merged: merged.clone(),
				successful: successful.clone(),
				errors: errors.clone(),
				asn: asn.clone(),
				cached_at: Utc::now(),
				is_negative_cache: true,
			};

			self.cache.set_negative(&ip, &bundle).await;
		}

		Ok(SingleIpOutcome {
			ip,
			asn,
			merged,
			successful,
			errors,
			providers,
			cached: false,
			cached_api_count: 0,
			total_api_count,
		})
	}

	async fn run_wave(&self, descriptors: &[ProviderDescriptor], ip: &str, asn: Option<&str>) -> Vec<ProviderResult> {
		stream::iter(descriptors.iter().map(|descriptor| self.fetch_one(descriptor, ip, asn)))
			.buffer_unordered(self.wave_concurrency)
			.collect()
			.await
	}

	async fn fetch_one(&self, descriptor: &ProviderDescriptor, ip: &str, asn: Option<&str>) -> ProviderResult {
		let timeout = self.config.api_timeout;
		let start = Instant::now();

		if descriptor.requires_key {
			let Some(pool) = self.pools.get(descriptor.name) else {
				return ProviderResult::failure(descriptor.name, "no credentials configured for this provider");
			};

			let client = &self.client;
			let outcome = credential::run_with_pool(pool, |key| async move {
				let ctx = FetchContext { ip, asn, key: Some(&key) };

				crate::http::client::fetch_provider(client, descriptor, &ctx, timeout).await
			})
			.await;

			match outcome {
				Ok(outcome) => {
					#[cfg(feature = "metrics")]
					metrics::record_provider_success(descriptor.name, start.elapsed());

					ProviderResult::success(descriptor.name, outcome.data, outcome.raw_data)
				},
				Err(Error::CredentialsExhausted { provider, last_message }) => {
					#[cfg(feature = "metrics")]
					{
						metrics::record_credentials_exhausted(descriptor.name);
						metrics::record_provider_error(descriptor.name);
					}

					ProviderResult::failure(provider, format!("All API keys exhausted: {last_message}"))
				},
				Err(err) => {
					#[cfg(feature = "metrics")]
					metrics::record_provider_error(descriptor.name);

					ProviderResult::failure(descriptor.name, err.to_string())
				},
			}
		} else {
			let ctx = FetchContext { ip, asn, key: None };

			match crate::http::client::fetch_provider(&self.client, descriptor, &ctx, timeout).await {
				Ok(outcome) => {
					#[cfg(feature = "metrics")]
					metrics::record_provider_success(descriptor.name, start.elapsed());

					ProviderResult::success(descriptor.name, outcome.data, outcome.raw_data)
				},
				Err((_kind, message)) => {
					#[cfg(feature = "metrics")]
					metrics::record_provider_error(descriptor.name);

					ProviderResult::failure(descriptor.name, message)
				},
			}
		}
	}
}

fn absorb(
	result: ProviderResult,
	merged: &mut MergedRecord,
	successful: &mut Vec<String>,
	errors: &mut Vec<ApiErrorEntry>,
	providers: &mut BTreeMap<String, ProviderResult>,
) {
	if result.is_success() {
		successful.push(result.source.clone());
		merged.extend(result.data.clone());
	} else {
		errors.push(ApiErrorEntry {
			source: result.source.clone(),
			error: result.error.clone().unwrap_or_default(),
		});
	}

	providers.insert(result.source.clone(), result);
}

fn from_cached_bundle(ip: String, bundle: CachedBundle) -> SingleIpOutcome {
	let total_api_count = bundle.total_api_count();
	let mut providers = BTreeMap::new();

	for source in &bundle.successful {
		providers.insert(source.clone(), ProviderResult::success(source.clone(), MergedRecord::new(), None));
	}
	for entry in &bundle.errors {
		providers.insert(entry.source.clone(), ProviderResult::failure(entry.source.clone(), entry.error.clone()));
	}

	SingleIpOutcome {
		ip,
		asn: bundle.asn,
		merged: bundle.merged,
		successful: bundle.successful,
		errors: bundle.errors,
		providers,
		cached: true,
		cached_api_count: total_api_count,
		total_api_count,
	}
}

/// Prefer an explicit ASN hint; otherwise fall back to the first populated
/// shared key among `asn | ASN | as`, matching the heterogeneous naming
/// providers use for the same concept.
fn derive_asn(explicit: Option<&str>, merged: &MergedRecord) -> Option<String> {
	if let Some(asn) = explicit.map(str::trim).filter(|a| !a.is_empty()) {
		return Some(asn.to_string());
	}

	ASN_KEYS.iter().find_map(|key| merged.get(*key).and_then(|v| v.as_str()).map(str::trim).filter(|v| !v.is_empty()).map(str::to_string))
}

/// Strip an IPv6 zone id (`fe80::1%eth0` → `fe80::1`) and validate the
/// remainder parses as an IP address. The address is never rewritten beyond
/// this.
fn normalize_ip(raw: &str) -> Result<String> {
	let candidate = raw.split('%').next().unwrap_or(raw).trim();

	candidate.parse::<std::net::IpAddr>().map(|_| candidate.to_string()).map_err(|_| Error::InvalidIp(raw.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::ScalarValue;

	#[test]
	fn normalize_ip_strips_zone_id() {
		assert_eq!(normalize_ip("fe80::1%eth0").unwrap(), "fe80::1");
	}

	#[test]
	fn normalize_ip_rejects_garbage() {
		assert!(normalize_ip("not-an-ip").is_err());
	}

	#[test]
	fn derive_asn_prefers_explicit_hint() {
		let mut merged = MergedRecord::new();
		merged.insert("asn".into(), ScalarValue::from("AS1111"));

		assert_eq!(derive_asn(Some("AS9999"), &merged).as_deref(), Some("AS9999"));
	}

	#[test]
	fn derive_asn_falls_back_through_shared_keys() {
		let mut merged = MergedRecord::new();
		merged.insert("as".into(), ScalarValue::from("AS45102"));

		assert_eq!(derive_asn(None, &merged).as_deref(), Some("AS45102"));
	}

	#[test]
	fn derive_asn_is_none_when_nothing_present() {
		assert_eq!(derive_asn(None, &MergedRecord::new()), None);
	}
}
