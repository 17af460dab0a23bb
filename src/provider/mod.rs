//! Provider registry: a declarative table describing how to call, validate,
//! and normalize each third-party reputation/geolocation API.
//!
//! Each provider is plain data plus function pointers — no per-provider
//! state, no trait objects — so the registry itself stays a read-only table
//! built once at startup and shared across every aggregation, mirroring how
//! the teacher's `RegistryState` treats its provider table as read-only
//! after construction.

mod abuseipdb;
mod cloudflare_asn;
mod ip2location;
mod ipguide;
mod ipinfo;
mod ipqs;

// self
use crate::{_prelude::*, config::Config, types::NormalizedMap};

/// Which wave a provider belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
	/// Fetched without any credential.
	NoKey,
	/// Requires a credential but not an ASN; fetched in Wave 1.
	KeyNotAsn,
	/// Requires a credential and the ASN derived from Wave 1; fetched in Wave 2.
	AsnDependent,
}

/// Inputs available when building a provider's request.
#[derive(Clone, Copy, Debug)]
pub struct FetchContext<'a> {
	/// Target IP.
	pub ip: &'a str,
	/// ASN discovered from Wave 1, present only when building an ASN-dependent request.
	pub asn: Option<&'a str>,
	/// Rotated credential for this attempt, present only for key-bearing providers.
	pub key: Option<&'a str>,
}

/// A fully-built outbound request, independent of any particular HTTP client.
#[derive(Clone, Debug)]
pub struct RequestSpec {
	/// Target URL, with query parameters already applied.
	pub url: url::Url,
	/// Additional headers to send, e.g. a bearer token or API-key header.
	pub headers: Vec<(&'static str, String)>,
}

/// Declarative description of one provider.
pub struct ProviderDescriptor {
	/// Stable identifier, e.g. `"ipinfo"`.
	pub name: &'static str,
	/// Which wave this provider participates in.
	pub kind: ProviderKind,
	/// Whether this provider consumes a credential pool key.
	pub requires_key: bool,
	/// Whether this provider is enabled given the current configuration.
	pub enabled: fn(&Config) -> bool,
	/// Build the outbound request for one fetch attempt.
	pub build_request: fn(&FetchContext) -> RequestSpec,
	/// Inspect a successfully-parsed 200 payload for a logical (non-HTTP) failure.
	pub check_error: fn(&serde_json::Value) -> Option<String>,
	/// Project a payload into the flat normalized map.
	pub transform: fn(&serde_json::Value) -> NormalizedMap,
	/// Optional projection of the payload to retain for UI/debugging.
	pub raw_data_transform: Option<fn(&serde_json::Value) -> serde_json::Value>,
}
impl std::fmt::Debug for ProviderDescriptor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ProviderDescriptor").field("name", &self.name).field("kind", &self.kind).finish()
	}
}

/// The full provider table: `ipguide`, `ipinfo`, `ipqs`, `abuseipdb`,
/// `ip2location`, `cloudflare_asn`, per spec.md §8's boundary-scenario list.
pub fn registry() -> Vec<ProviderDescriptor> {
	vec![
		ipguide::descriptor(),
		ipinfo::descriptor(),
		ipqs::descriptor(),
		abuseipdb::descriptor(),
		ip2location::descriptor(),
		cloudflare_asn::descriptor(),
	]
}

/// Partition of the registry into the three disjoint groups the Single-IP
/// Aggregator fans out over.
#[derive(Debug, Default)]
pub struct PartitionedProviders {
	/// Fetched without credentials, Wave 1.
	pub no_key: Vec<ProviderDescriptor>,
	/// Require a credential but not an ASN, Wave 1.
	pub key_not_asn: Vec<ProviderDescriptor>,
	/// Require a credential and the ASN, Wave 2.
	pub asn_dependent: Vec<ProviderDescriptor>,
}

/// Enumerate enabled providers from `registry()` and partition them by kind.
pub fn partition_enabled(config: &Config) -> PartitionedProviders {
	let mut partitioned = PartitionedProviders::default();

	for descriptor in registry() {
		if !(descriptor.enabled)(config) {
			continue;
		}

		match descriptor.kind {
			ProviderKind::NoKey => partitioned.no_key.push(descriptor),
			ProviderKind::KeyNotAsn => partitioned.key_not_asn.push(descriptor),
			ProviderKind::AsnDependent => partitioned.asn_dependent.push(descriptor),
		}
	}

	partitioned
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn registry_lists_the_six_spec_providers() {
		let names: Vec<_> = registry().into_iter().map(|d| d.name).collect();

		assert_eq!(names, ["ipguide", "ipinfo", "ipqs", "abuseipdb", "ip2location", "cloudflare_asn"]);
	}

	#[test]
	fn no_key_provider_is_enabled_without_config() {
		let config = Config::from_lookup(|_| None);
		let partitioned = partition_enabled(&config);

		assert!(partitioned.no_key.iter().any(|d| d.name == "ipguide"));
		assert!(partitioned.key_not_asn.is_empty());
		assert!(partitioned.asn_dependent.is_empty());
	}

	#[test]
	fn key_providers_enable_once_credentials_are_configured() {
		let config = Config::from_lookup(|key| match key {
			"IPINFO_TOKEN" => Some("token-a".to_string()),
			"CLOUDFLARE_API_TOKEN" => Some("token-b".to_string()),
			_ => None,
		});
		let partitioned = partition_enabled(&config);

		assert!(partitioned.key_not_asn.iter().any(|d| d.name == "ipinfo"));
		assert!(partitioned.asn_dependent.iter().any(|d| d.name == "cloudflare_asn"));
	}
}
