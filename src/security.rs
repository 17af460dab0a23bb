//! Security utilities: HTTPS enforcement and CORS-origin allowlist matching.
//!
//! These helpers validate configuration, not network traffic: HTTPS
//! enforcement keeps provider and LLM endpoints from being silently
//! downgraded, and origin matching implements the `ALLOWED_ORIGINS` pattern
//! language from spec.md §6.2. The HTTP layer that actually applies CORS
//! headers is an external collaborator; only the matching predicate lives
//! here.

// crates.io
use url::Url;
// self
use crate::_prelude::*;

/// Ensure the provided URL uses HTTPS.
pub fn enforce_https(url: &Url) -> Result<()> {
	if url.scheme() == "https" {
		Ok(())
	} else {
		Err(Error::Security(format!("{url} must use HTTPS.")))
	}
}

/// Canonicalize a hostname: trim, drop a trailing dot, lowercase.
pub fn canonicalize_host(value: &str) -> Option<String> {
	let trimmed = value.trim();
	if trimmed.is_empty() {
		return None;
	}

	let without_trailing_dot = trimmed.trim_end_matches('.');
	if without_trailing_dot.is_empty() {
		return None;
	}

	Some(without_trailing_dot.to_ascii_lowercase())
}

/// A parsed `ALLOWED_ORIGINS` entry.
///
/// `*.example.com` matches exactly one additional label (`api.example.com`)
/// plus the bare domain (`example.com`); it does not match deeper
/// subdomains (`a.b.example.com`). A pattern without a leading `*.` must
/// match the origin host exactly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OriginPattern {
	/// Exact hostname match.
	Exact(String),
	/// Bare domain or exactly one label of subdomain.
	OneLabelWildcard(String),
}
impl OriginPattern {
	/// Parse a single raw `ALLOWED_ORIGINS` entry.
	pub fn parse(raw: &str) -> Option<Self> {
		let trimmed = raw.trim();
		if trimmed.is_empty() {
			return None;
		}

		if let Some(domain) = trimmed.strip_prefix("*.") {
			canonicalize_host(domain).map(Self::OneLabelWildcard)
		} else {
			canonicalize_host(trimmed).map(Self::Exact)
		}
	}

	/// Whether this pattern matches the given (already-canonicalized) host.
	pub fn matches(&self, host: &str) -> bool {
		match self {
			Self::Exact(exact) => host == exact,
			Self::OneLabelWildcard(domain) => {
				if host == domain {
					return true;
				}

				match host.strip_suffix(domain).and_then(|prefix| prefix.strip_suffix('.')) {
					Some(label) => !label.is_empty() && !label.contains('.'),
					None => false,
				}
			},
		}
	}
}

/// Parse the comma-separated `ALLOWED_ORIGINS` configuration value.
pub fn parse_allowed_origins(raw: &str) -> Vec<OriginPattern> {
	raw.split(',').filter_map(OriginPattern::parse).collect()
}

/// Evaluate whether a request origin's host is allowed.
///
/// An empty pattern list allows nothing: `ALLOWED_ORIGINS` is an explicit
/// allowlist, not a default-allow switch.
pub fn origin_is_allowed(origin_host: &str, patterns: &[OriginPattern]) -> bool {
	let Some(host) = canonicalize_host(origin_host) else {
		return false;
	};

	patterns.iter().any(|pattern| pattern.matches(&host))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wildcard_matches_bare_domain_and_one_label() {
		let patterns = parse_allowed_origins("*.example.com");

		assert!(origin_is_allowed("example.com", &patterns));
		assert!(origin_is_allowed("api.example.com", &patterns));
		assert!(!origin_is_allowed("a.b.example.com", &patterns));
		assert!(!origin_is_allowed("other.org", &patterns));
	}

	#[test]
	fn exact_pattern_requires_exact_match() {
		let patterns = parse_allowed_origins("app.internal.test");

		assert!(origin_is_allowed("APP.internal.test", &patterns));
		assert!(!origin_is_allowed("sub.app.internal.test", &patterns));
	}

	#[test]
	fn enforce_https_rejects_insecure_scheme() {
		let http = Url::parse("http://example.com/llm").unwrap();
		assert!(enforce_https(&http).is_err());
	}

	#[test]
	fn empty_allowlist_allows_nothing() {
		assert!(!origin_is_allowed("example.com", &[]));
	}
}
