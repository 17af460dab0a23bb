//! Environment configuration: deployment mode, CORS allowlist, timeouts,
//! cache TTL, provider credentials, and LLM settings.
//!
//! Values are parsed once at construction (`Config::from_env`) and then
//! treated as immutable for the process lifetime, the same validate-on-
//! construct discipline the registry applies to provider registrations.

// std
use std::{collections::BTreeMap, env, time::Duration};
// self
use crate::{
	_prelude::*,
	security::{OriginPattern, parse_allowed_origins},
};

const DEFAULT_API_TIMEOUT_MS: u64 = 5_000;
const MIN_API_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_FRONTEND_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CONNECTIVITY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CACHE_TTL_SECONDS: u64 = 900;
const MIN_CACHE_TTL_SECONDS: u64 = 60;
const DEFAULT_LLM_MODEL: &str = "gpt-3.5-turbo";

/// Deployment mode, affects nothing in this crate beyond being surfaced for
/// callers that want to branch logging verbosity or error detail exposure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
	/// Local/dev-time mode.
	Development,
	/// Default, production mode.
	Production,
}
impl Environment {
	fn parse(raw: &str) -> Self {
		match raw.trim().to_ascii_lowercase().as_str() {
			"development" | "dev" => Self::Development,
			_ => Self::Production,
		}
	}
}

/// A provider's configured credential string, before it is split into a
/// rotation pool by `crate::credential::CredentialPool`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CredentialKeys(Vec<String>);
impl CredentialKeys {
	/// Parse a comma-separated env value into an ordered, de-duplicated key list.
	pub fn parse(raw: &str) -> Self {
		let mut seen = std::collections::HashSet::new();
		let keys = raw
			.split(',')
			.map(str::trim)
			.filter(|key| !key.is_empty())
			.filter(|key| seen.insert((*key).to_string()))
			.map(str::to_string)
			.collect();

		Self(keys)
	}

	/// Whether any key is configured.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// The ordered key list.
	pub fn as_slice(&self) -> &[String] {
		&self.0
	}
}

/// LLM transport configuration. `None` when `LLM_API_KEY`/`LLM_BASE_URL` are
/// unset, in which case `Aggregator::summarize` callers should surface a
/// "service unconfigured" outcome rather than attempting a request.
#[derive(Clone, Debug)]
pub struct LlmConfig {
	/// API key sent with every completion request.
	pub api_key: String,
	/// Base URL of the OpenAI-compatible chat completion endpoint.
	pub base_url: String,
	/// Model identifier, default `"gpt-3.5-turbo"`.
	pub model: String,
}

/// Fully parsed process configuration.
#[derive(Clone, Debug)]
pub struct Config {
	/// Deployment mode.
	pub environment: Environment,
	/// Parsed `ALLOWED_ORIGINS` CORS patterns.
	pub allowed_origins: Vec<OriginPattern>,
	/// Per-provider outbound request timeout.
	pub api_timeout: Duration,
	/// Timeout advertised to the frontend, in milliseconds.
	pub frontend_timeout_ms: u64,
	/// Timeout advertised for connectivity probes, in milliseconds.
	pub connectivity_timeout_ms: u64,
	/// Positive cache TTL.
	pub cache_ttl: Duration,
	/// Configured credential keys, keyed by provider id.
	pub credentials: BTreeMap<&'static str, CredentialKeys>,
	/// LLM transport configuration, when both `LLM_API_KEY` and `LLM_BASE_URL` are set.
	pub llm: Option<LlmConfig>,
}
impl Config {
	/// Load configuration from process environment variables, applying every
	/// default/coercion rule documented for each field.
	pub fn from_env() -> Self {
		Self::from_lookup(|key| env::var(key).ok())
	}

	/// Load configuration from an arbitrary lookup function — used by tests to
	/// avoid mutating real process environment variables.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
		let environment =
			lookup("ENVIRONMENT").map(|raw| Environment::parse(&raw)).unwrap_or(Environment::Production);

		let allowed_origins =
			lookup("ALLOWED_ORIGINS").map(|raw| parse_allowed_origins(&raw)).unwrap_or_default();

		let api_timeout_ms = lookup("API_TIMEOUT_MS")
			.and_then(|raw| raw.trim().parse::<u64>().ok())
			.map(|ms| ms.max(MIN_API_TIMEOUT_MS))
			.unwrap_or(DEFAULT_API_TIMEOUT_MS);

		let frontend_timeout_ms = lookup("FRONTEND_TIMEOUT_MS")
			.and_then(|raw| raw.trim().parse::<u64>().ok())
			.unwrap_or(DEFAULT_FRONTEND_TIMEOUT_MS);

		let connectivity_timeout_ms = lookup("CONNECTIVITY_TIMEOUT_MS")
			.and_then(|raw| raw.trim().parse::<u64>().ok())
			.unwrap_or(DEFAULT_CONNECTIVITY_TIMEOUT_MS);

		let cache_ttl_seconds = lookup("CACHE_TTL_SECONDS")
			.and_then(|raw| raw.trim().parse::<u64>().ok())
			.map(|secs| if secs < MIN_CACHE_TTL_SECONDS { DEFAULT_CACHE_TTL_SECONDS } else { secs })
			.unwrap_or(DEFAULT_CACHE_TTL_SECONDS);

		let mut credentials = BTreeMap::new();
		for (env_var, provider) in [
			("IPQS_KEY", "ipqs"),
			("ABUSEIPDB_KEY", "abuseipdb"),
			("IP2LOCATION_KEY", "ip2location"),
			("IPINFO_TOKEN", "ipinfo"),
			("CLOUDFLARE_API_TOKEN", "cloudflare_asn"),
		] {
			let keys = lookup(env_var).map(|raw| CredentialKeys::parse(&raw)).unwrap_or_default();
			credentials.insert(provider, keys);
		}

		let llm = match (lookup("LLM_API_KEY"), lookup("LLM_BASE_URL")) {
			(Some(api_key), Some(base_url)) if !api_key.trim().is_empty() && !base_url.trim().is_empty() => {
				let model = lookup("LLM_MODEL").filter(|m| !m.trim().is_empty()).unwrap_or_else(|| {
					DEFAULT_LLM_MODEL.to_string()
				});

				Some(LlmConfig { api_key, base_url, model })
			},
			_ => None,
		};

		Self {
			environment,
			allowed_origins,
			api_timeout: Duration::from_millis(api_timeout_ms),
			frontend_timeout_ms,
			connectivity_timeout_ms,
			cache_ttl: Duration::from_secs(cache_ttl_seconds),
			credentials,
			llm,
		}
	}

	/// Credential keys configured for the given provider id, if any.
	pub fn credentials_for(&self, provider: &str) -> Option<&CredentialKeys> {
		self.credentials.get(provider)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn lookup_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
		move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
	}

	#[test]
	fn defaults_apply_when_unset() {
		let config = Config::from_lookup(lookup_from(&[]));

		assert_eq!(config.api_timeout, Duration::from_millis(DEFAULT_API_TIMEOUT_MS));
		assert_eq!(config.cache_ttl, Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS));
		assert_eq!(config.environment, Environment::Production);
		assert!(config.llm.is_none());
	}

	#[test]
	fn low_cache_ttl_is_coerced_to_default() {
		let config = Config::from_lookup(lookup_from(&[("CACHE_TTL_SECONDS", "10")]));
		assert_eq!(config.cache_ttl, Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS));
	}

	#[test]
	fn api_timeout_is_floored_at_minimum() {
		let config = Config::from_lookup(lookup_from(&[("API_TIMEOUT_MS", "10")]));
		assert_eq!(config.api_timeout, Duration::from_millis(MIN_API_TIMEOUT_MS));
	}

	#[test]
	fn credential_keys_split_trim_and_dedup() {
		let keys = CredentialKeys::parse(" a, b ,a,c");
		assert_eq!(keys.as_slice(), &["a".to_string(), "b".to_string(), "c".to_string()]);
	}

	#[test]
	fn llm_requires_both_key_and_base_url() {
		let config = Config::from_lookup(lookup_from(&[("LLM_API_KEY", "secret")]));
		assert!(config.llm.is_none());

		let config = Config::from_lookup(lookup_from(&[
			("LLM_API_KEY", "secret"),
			("LLM_BASE_URL", "https://llm.internal/v1"),
		]));
		let llm = config.llm.expect("llm configured");
		assert_eq!(llm.model, DEFAULT_LLM_MODEL);
	}

	#[test]
	fn development_environment_is_recognised() {
		let config = Config::from_lookup(lookup_from(&[("ENVIRONMENT", "development")]));
		assert_eq!(config.environment, Environment::Development);
	}
}
