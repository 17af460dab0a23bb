//! Core data model: the flat normalized map, per-provider results, the merged
//! record, and the user-visible derived record.

// std
use std::collections::BTreeMap;
// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::_prelude::*;

/// Scalar value used in the flat normalized map that providers contribute to.
///
/// Untagged so the wire representation is a plain JSON scalar, matching the
/// shape of the third-party payloads being projected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
	/// UTF-8 string value.
	Str(String),
	/// Numeric value (providers use both integers and floats).
	Num(f64),
	/// Boolean flag value.
	Bool(bool),
	/// Absent/unknown value.
	Null,
}
impl ScalarValue {
	/// Borrow as `&str` when the value is a string.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(s) => Some(s),
			_ => None,
		}
	}

	/// Coerce to `f64` when the value is numeric.
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Self::Num(n) => Some(*n),
			_ => None,
		}
	}

	/// Coerce to `bool` when the value is boolean.
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(b) => Some(*b),
			_ => None,
		}
	}

	/// Whether the value is present (non-null, non-empty-string).
	pub fn is_present(&self) -> bool {
		match self {
			Self::Null => false,
			Self::Str(s) => !s.trim().is_empty(),
			_ => true,
		}
	}
}
impl From<String> for ScalarValue {
	fn from(value: String) -> Self {
		Self::Str(value)
	}
}
impl From<&str> for ScalarValue {
	fn from(value: &str) -> Self {
		Self::Str(value.to_string())
	}
}
impl From<f64> for ScalarValue {
	fn from(value: f64) -> Self {
		Self::Num(value)
	}
}
impl From<bool> for ScalarValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}
impl<T> From<Option<T>> for ScalarValue
where
	T: Into<ScalarValue>,
{
	fn from(value: Option<T>) -> Self {
		value.map(Into::into).unwrap_or(ScalarValue::Null)
	}
}

/// Flat, namespaced string-to-scalar map produced by a provider's `transform`.
///
/// `BTreeMap` keeps iteration deterministic for tests; the spec documents
/// merge order as best-effort and not semantically significant, so
/// determinism here is a testing convenience, not a guarantee callers should
/// depend on.
pub type NormalizedMap = BTreeMap<String, ScalarValue>;

/// Outcome of one provider's fetch attempt for one IP.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderResult {
	/// Stable provider identifier, e.g. `"ipinfo"`.
	pub source: String,
	/// Whether the provider call succeeded.
	pub status: ProviderStatus,
	/// Flat normalized projection used for merging. Empty on error.
	#[serde(default)]
	pub data: NormalizedMap,
	/// Opaque preserved payload for debugging/UI.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub raw_data: Option<serde_json::Value>,
	/// Human message when `status == Error`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
impl ProviderResult {
	/// Build a successful result.
	pub fn success(source: impl Into<String>, data: NormalizedMap, raw_data: Option<serde_json::Value>) -> Self {
		Self { source: source.into(), status: ProviderStatus::Success, data, raw_data, error: None }
	}

	/// Build a failed result.
	pub fn failure(source: impl Into<String>, error: impl Into<String>) -> Self {
		Self {
			source: source.into(),
			status: ProviderStatus::Error,
			data: NormalizedMap::new(),
			raw_data: None,
			error: Some(error.into()),
		}
	}

	/// Whether this result succeeded.
	pub fn is_success(&self) -> bool {
		matches!(self.status, ProviderStatus::Success)
	}
}

/// Success/error outcome of a single provider call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
	/// The provider returned usable data.
	Success,
	/// The provider failed (HTTP error, logical error, or credential exhaustion).
	Error,
}

/// Result of shallow-overlaying all successful provider `data` maps, in
/// provider-completion order. Overlay order is documented as not
/// semantically significant: namespacing keeps collisions rare, and
/// derivation always reads specific source-prefixed keys rather than the
/// shared ones when it needs unambiguous provenance.
pub type MergedRecord = NormalizedMap;

/// A single vote contributed toward the IP-type tally.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TypeSourceDetail {
	/// Provider that contributed this vote.
	pub source: String,
	/// Raw, unnormalized label as reported by the provider.
	pub raw_type: String,
	/// Normalized category this label mapped to.
	pub normalized_type: String,
}

/// Winner of the IP-type vote plus its supporting evidence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IpType {
	/// Winning normalized category, or `"unknown"` if no provider voted.
	pub value: String,
	/// All votes cast, in the fixed evaluation order.
	pub votes: Vec<TypeSourceDetail>,
}

/// Native-vs-broadcast judgment for an IP.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IpSource {
	/// Geographic country code derived from geolocation providers.
	pub geo_country: Option<String>,
	/// Registry country code derived from the ASN registry.
	pub registry_country: Option<String>,
	/// `true` if native, `false` if broadcast, `None` if undetermined.
	pub is_native: Option<bool>,
	/// Human-readable explanation of the judgment.
	pub reason: String,
}

/// Location portion of the derived summary.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LocationSummary {
	/// City name, when a provider supplies one.
	pub city: Option<String>,
	/// Region/state name.
	pub region: Option<String>,
	/// Uppercased ISO country code.
	pub country: Option<String>,
	/// IANA timezone name.
	pub timezone: Option<String>,
	/// Latitude in decimal degrees.
	pub lat: Option<f64>,
	/// Longitude in decimal degrees.
	pub lon: Option<f64>,
	/// Pre-formatted "lat,lon" string, when a provider supplies one directly.
	pub location_str: Option<String>,
}

/// Network portion of the derived summary.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkSummary {
	/// ISP/carrier name.
	pub isp: Option<String>,
	/// Organization name, when distinct from the ISP.
	pub organization: Option<String>,
	/// Autonomous system number, as a string (providers format it inconsistently).
	pub asn: Option<String>,
}

/// Risk portion of the derived summary.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RiskSummary {
	/// Fraud score from a reputation provider, scale varies by source.
	pub fraud_score: Option<f64>,
	/// Abuse score from a reputation provider.
	pub abuse_score: Option<f64>,
	/// Total abuse reports filed against this IP.
	pub total_reports: Option<f64>,
	/// Timestamp of the most recent abuse report, as reported upstream.
	pub last_reported_at: Option<String>,
	/// Whether any provider flagged this IP as a VPN exit.
	pub is_vpn: Option<bool>,
	/// Whether any provider flagged this IP as an open proxy.
	pub is_proxy: Option<bool>,
	/// Whether any provider flagged this IP as a Tor exit.
	pub is_tor: Option<bool>,
	/// Whether the winning IP-type vote or a hosting flag marks this as hosting/datacenter.
	pub is_hosting: bool,
}

/// Optional edge-side metrics, supplied only when an edge snapshot is given.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EdgeMetrics {
	/// Edge colo/PoP identifier.
	pub colo: Option<String>,
	/// Bot-likelihood score supplied by the edge.
	pub bot_score: Option<f64>,
	/// Whether the connection arrived over a WARP tunnel.
	pub is_warp: Option<bool>,
}

/// Everything the user-visible summary exposes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DerivedSummary {
	/// Geographic location fields.
	pub location: LocationSummary,
	/// Network/ownership fields.
	pub network: NetworkSummary,
	/// Winning IP-type vote, with supporting evidence.
	pub ip_type: Option<IpType>,
	/// Native-vs-broadcast judgment.
	pub ip_source: Option<IpSource>,
	/// Risk/abuse fields.
	pub risk: RiskSummary,
	/// Edge-supplied metrics, present only when an edge snapshot was given.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub edge: Option<EdgeMetrics>,
}

/// Provenance entry: one provider's contribution to a user-visible field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldSourceEntry {
	/// Provider that contributed this value.
	pub source: String,
	/// The value as that provider reported it.
	pub value: ScalarValue,
}

/// Per-field provenance: the chosen value plus every contributing provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldProvenance {
	/// The chosen value: first non-empty among `sources`, in walk order.
	pub value: ScalarValue,
	/// Every provider that reported a non-null/non-empty value for this field.
	pub sources: Vec<FieldSourceEntry>,
}

/// Metadata about how a `DerivedRecord` was produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordMeta {
	/// Providers that succeeded, in completion order.
	pub sources: Vec<String>,
	/// Providers that failed, with their error messages.
	pub api_errors: Vec<ApiErrorEntry>,
	/// Whether this record was served from cache.
	pub cached: bool,
	/// Number of the attempted providers that were served from cache.
	pub cached_api_count: u32,
	/// Total number of providers attempted.
	pub total_api_count: u32,
	/// Wall-clock time the record was produced or retrieved.
	pub timestamp: DateTime<Utc>,
}

/// One provider-level failure surfaced in `meta.apiErrors`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiErrorEntry {
	/// Provider that failed.
	pub source: String,
	/// Human-readable failure message.
	pub error: String,
}

/// The user-visible, fully derived result for one IP.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DerivedRecord {
	/// The IP this record describes.
	pub ip: String,
	/// Derived judgments (location, network, type, native/broadcast, risk).
	pub summary: DerivedSummary,
	/// Per-field provenance for the fields walked by the derivation layer.
	pub fields: BTreeMap<String, FieldProvenance>,
	/// Every provider's raw outcome, keyed by provider id.
	pub providers: BTreeMap<String, ProviderResult>,
	/// Production metadata (sources, errors, cache status, timestamp).
	pub meta: RecordMeta,
}

/// Bundle persisted in the cache for one IP's merged data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachedBundle {
	/// The merged flat map from the aggregation that produced this bundle.
	pub merged: MergedRecord,
	/// Providers that succeeded when this bundle was produced.
	pub successful: Vec<String>,
	/// Providers that failed when this bundle was produced.
	pub errors: Vec<ApiErrorEntry>,
	/// Best-known ASN at the time of caching, if any was derived.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub asn: Option<String>,
	/// When this bundle was written to the cache.
	pub cached_at: DateTime<Utc>,
	/// `true` when every provider failed and this is a negative-cache entry.
	#[serde(default)]
	pub is_negative_cache: bool,
}
impl CachedBundle {
	/// Number of providers attempted (successes plus failures) when this bundle was produced.
	pub fn total_api_count(&self) -> u32 {
		(self.successful.len() + self.errors.len()) as u32
	}
}

/// An edge-supplied geo/ASN hint, authoritative for colo/TLS but subordinate
/// to provider responses for geography/ASN after aggregation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EdgeSnapshot {
	/// Edge colo/PoP identifier.
	pub colo: Option<String>,
	/// ASN hint supplied by the edge, used to seed Wave 2 before providers confirm it.
	pub asn: Option<String>,
	/// Country hint supplied by the edge.
	pub country: Option<String>,
	/// Bot-likelihood score supplied by the edge.
	pub bot_score: Option<f64>,
	/// Whether the connection arrived over a WARP tunnel.
	pub is_warp: Option<bool>,
}

/// One item in a batch streaming request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchItem {
	/// The IP to aggregate.
	pub ip: String,
	/// Caller-supplied exit-type label, carried through to output but not interpreted here.
	#[serde(default)]
	pub exit_type: Option<String>,
	/// Optional edge-supplied geo/ASN snapshot for this IP.
	#[serde(default)]
	pub edge: Option<EdgeSnapshot>,
}

/// Progress counters attached to every streamed event.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Progress {
	/// Unique IPs completed so far.
	pub completed: u32,
	/// Total unique IPs in this batch.
	pub total: u32,
}

/// Events emitted by the batch streaming scheduler, in completion order.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BatchEvent {
	/// One unique IP finished aggregating.
	Result {
		/// The IP this result is for.
		ip: String,
		/// The derived record.
		result: Box<DerivedRecord>,
		/// Batch progress after this event.
		progress: Progress,
	},
	/// One unique IP's aggregation threw rather than returning an error-bearing result.
	ItemError {
		/// The IP that failed.
		ip: String,
		/// Machine-readable error code, e.g. `"ITEM_FAILED"`.
		code: String,
		/// Human-readable error message.
		error: String,
		/// Batch progress after this event.
		progress: Progress,
	},
	/// All unique IPs have finished.
	Done {
		/// Final progress, with `completed == total`.
		progress: Progress,
	},
	/// The stream aborted entirely; this is always the last event.
	StreamError {
		/// Machine-readable error code, e.g. `"STREAM_ERROR"`.
		code: String,
	},
}
