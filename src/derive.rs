//! Derivation layer: turns a merged flat record into the user-visible
//! `DerivedRecord` — IP-type vote, native/broadcast judgment, hosting flag,
//! risk summary, and per-field provenance.

// std
use std::collections::BTreeMap;
// self
use crate::{
	_prelude::*,
	aggregate::SingleIpOutcome,
	types::{
		DerivedRecord, DerivedSummary, EdgeMetrics, EdgeSnapshot, FieldProvenance, FieldSourceEntry, IpSource, IpType,
		LocationSummary, MergedRecord, NetworkSummary, RecordMeta, RiskSummary, ScalarValue, TypeSourceDetail,
	},
};

/// Source keys consulted for the IP-type vote, in the fixed tie-break order:
/// IPQS, then AbuseIPDB, then IP2Location, then ipinfo's hosting flag.
const VOTE_SOURCES: [(&str, &str); 3] =
	[("ipqs", "ipqs_connection_type"), ("abuseipdb", "abuseipdb_usage_type"), ("ip2location", "ip2location_usage")];

/// Fixed category pattern tables. `library` deliberately folds into `education`.
const CATEGORY_PATTERNS: [(&str, &[&str]); 6] = [
	("residential", &["RESIDENTIAL", "HOME", "BROADBAND", "FIXED LINE ISP", "ISP"]),
	("mobile", &["MOBILE", "CELLULAR", "WIRELESS"]),
	("datacenter", &["DATACENTER", "DATA CENTER", "HOSTING", "SERVER", "DCH"]),
	("commercial", &["COMMERCIAL", "BUSINESS", "CORPORATE"]),
	("education", &["EDUCATION", "UNIVERSITY", "SCHOOL", "LIBRARY", "ACADEMIC"]),
	("government", &["GOVERNMENT", "MILITARY", "GOV"]),
];

/// Build the user-visible derived record from one IP's aggregation outcome.
///
/// `edge` carries an optional upstream edge snapshot (colo, bot score, WARP
/// flag); it is authoritative for those edge-only fields but never overrides
/// geography/ASN judgments, which always come from provider responses.
pub fn derive(outcome: SingleIpOutcome, edge: Option<EdgeSnapshot>) -> DerivedRecord {
	let merged = &outcome.merged;

	let votes = collect_votes(merged);
	let winner = winning_category(&votes);
	let ip_type = IpType { value: winner.clone(), votes: votes.clone() };
	let ip_source = derive_ip_source(merged);
	let is_hosting = compute_is_hosting(merged, &winner);
	let risk = risk_summary(merged, is_hosting);

	let location = LocationSummary {
		city: first_str(merged, &["ipinfo_city", "ip2location_city"]),
		region: first_str(merged, &["ipinfo_region", "ip2location_region"]),
		country: ip_source.geo_country.clone(),
		timezone: first_str(merged, &["ipinfo_timezone", "ip2location_timezone"]),
		lat: first_f64(merged, &["ipinfo_lat", "ip2location_lat"]),
		lon: first_f64(merged, &["ipinfo_lon", "ip2location_lon"]),
		location_str: merged.get("ipinfo_loc").and_then(ScalarValue::as_str).map(str::to_string),
	};

	let network = NetworkSummary {
		isp: first_str(merged, &["ipqs_isp", "ip2location_isp", "ipguide_isp", "abuseipdb_isp"]),
		organization: first_str(
			merged,
			&["ipqs_organization", "ipinfo_organization", "ipguide_organization", "cloudflare_asn_organization"],
		),
		asn: first_str(merged, &["asn", "ipinfo_asn", "as"]),
	};

	let edge_metrics = edge.map(|snapshot| EdgeMetrics {
		colo: snapshot.colo,
		bot_score: snapshot.bot_score,
		is_warp: snapshot.is_warp,
	});

	let summary = DerivedSummary {
		location,
		network,
		ip_type: Some(ip_type),
		ip_source: Some(ip_source),
		risk,
		edge: edge_metrics,
	};

	let mut fields = BTreeMap::new();

	fields.insert(
		"timezone".to_string(),
		field_provenance(merged, &[("ipinfo", "ipinfo_timezone"), ("ip2location", "ip2location_timezone")]),
	);
	fields.insert(
		"isp".to_string(),
		field_provenance(
			merged,
			&[("ipqs", "ipqs_isp"), ("ip2location", "ip2location_isp"), ("ipguide", "ipguide_isp"), ("abuseipdb", "abuseipdb_isp")],
		),
	);
	fields.insert(
		"organization".to_string(),
		field_provenance(
			merged,
			&[
				("ipqs", "ipqs_organization"),
				("ipinfo", "ipinfo_organization"),
				("ipguide", "ipguide_organization"),
				("cloudflare_asn", "cloudflare_asn_organization"),
			],
		),
	);
	fields.insert(
		"asn".to_string(),
		field_provenance(merged, &[("ipguide", "ipguide_asn"), ("ipinfo", "ipinfo_asn"), ("ip2location", "as")]),
	);
	fields.insert("coordinates".to_string(), coordinates_provenance(merged));
	fields.insert("location".to_string(), field_provenance(merged, &[("ipinfo", "ipinfo_loc")]));
	fields.insert(
		"ipType".to_string(),
		FieldProvenance {
			value: ScalarValue::Str(winner),
			sources: votes
				.iter()
				.map(|vote| FieldSourceEntry { source: vote.source.clone(), value: ScalarValue::Str(vote.raw_type.clone()) })
				.collect(),
		},
	);

	let meta = RecordMeta {
		sources: outcome.successful,
		api_errors: outcome.errors,
		cached: outcome.cached,
		cached_api_count: outcome.cached_api_count,
		total_api_count: outcome.total_api_count,
		timestamp: Utc::now(),
	};

	DerivedRecord { ip: outcome.ip, summary, fields, providers: outcome.providers, meta }
}

fn collect_votes(merged: &MergedRecord) -> Vec<TypeSourceDetail> {
	let mut votes = Vec::new();

	for (source, key) in VOTE_SOURCES {
		let Some(raw) = merged.get(key).and_then(ScalarValue::as_str).filter(|raw| !raw.trim().is_empty()) else {
			continue;
		};
		let normalized = normalize_type(raw);

		if normalized != "unknown" {
			votes.push(TypeSourceDetail { source: source.to_string(), raw_type: raw.to_string(), normalized_type: normalized });
		}
	}

	if merged.get("ipinfo_hosting").and_then(ScalarValue::as_bool) == Some(true) {
		votes.push(TypeSourceDetail {
			source: "ipinfo".to_string(),
			raw_type: "hosting".to_string(),
			normalized_type: "datacenter".to_string(),
		});
	}

	votes
}

/// Normalize a raw provider label to one of the fixed categories, or
/// `"unknown"` when nothing matches.
fn normalize_type(raw: &str) -> String {
	let upper = raw.trim().to_ascii_uppercase();

	if upper.is_empty() {
		return "unknown".to_string();
	}

	for (category, patterns) in CATEGORY_PATTERNS {
		if patterns.iter().any(|pattern| upper == *pattern || upper.contains(pattern)) {
			return category.to_string();
		}
	}

	"unknown".to_string()
}

/// Tally votes by normalized category, in insertion order, and return the
/// first category to reach the maximum count — "first-reached wins" on ties.
fn winning_category(votes: &[TypeSourceDetail]) -> String {
	let mut tally: Vec<(String, u32)> = Vec::new();

	for vote in votes {
		match tally.iter_mut().find(|(category, _)| *category == vote.normalized_type) {
			Some(entry) => entry.1 += 1,
			None => tally.push((vote.normalized_type.clone(), 1)),
		}
	}

	let mut best: Option<(String, u32)> = None;
	for (category, count) in tally {
		if best.as_ref().is_none_or(|(_, best_count)| count > *best_count) {
			best = Some((category, count));
		}
	}

	best.map(|(category, _)| category).unwrap_or_else(|| "unknown".to_string())
}

fn compute_is_hosting(merged: &MergedRecord, winner: &str) -> bool {
	if winner == "datacenter" {
		return true;
	}
	if merged.get("ipinfo_hosting").and_then(ScalarValue::as_bool) == Some(true) {
		return true;
	}

	VOTE_SOURCES.iter().any(|(_, key)| {
		merged.get(*key).and_then(ScalarValue::as_str).map(normalize_type).as_deref() == Some("datacenter")
	})
}

fn geo_country(merged: &MergedRecord) -> Option<String> {
	["ip2location_country_code", "country_code", "ipinfo_country"]
		.into_iter()
		.find_map(|key| uppercase_non_empty(merged, key))
}

fn registry_country(merged: &MergedRecord) -> Option<String> {
	uppercase_non_empty(merged, "ipguide_asn_country")
}

fn uppercase_non_empty(merged: &MergedRecord, key: &str) -> Option<String> {
	merged.get(key).and_then(ScalarValue::as_str).map(str::trim).filter(|value| !value.is_empty()).map(str::to_ascii_uppercase)
}

fn derive_ip_source(merged: &MergedRecord) -> IpSource {
	let geo = geo_country(merged);
	let registry = registry_country(merged);

	let (is_native, reason) = match (&registry, &geo) {
		(Some(registry), Some(geo)) if registry == geo => (Some(true), format!("registry == geo ({registry})")),
		(Some(registry), Some(geo)) => (Some(false), format!("registry {registry}, geo {geo}")),
		(Some(registry), None) => (None, format!("geo country unknown; registry {registry}")),
		(None, Some(geo)) => (None, format!("registry country unknown; geo {geo}")),
		(None, None) => (None, "insufficient data".to_string()),
	};

	IpSource { geo_country: geo, registry_country: registry, is_native, reason }
}

fn risk_summary(merged: &MergedRecord, is_hosting: bool) -> RiskSummary {
	RiskSummary {
		fraud_score: merged.get("fraud_score").and_then(ScalarValue::as_f64),
		abuse_score: merged.get("abuse_score").and_then(ScalarValue::as_f64),
		total_reports: merged.get("total_reports").and_then(ScalarValue::as_f64),
		last_reported_at: merged.get("last_reported_at").and_then(ScalarValue::as_str).map(str::to_string),
		is_vpn: merged.get("is_vpn").and_then(ScalarValue::as_bool),
		is_proxy: merged.get("is_proxy").and_then(ScalarValue::as_bool),
		is_tor: merged.get("is_tor").and_then(ScalarValue::as_bool),
		is_hosting,
	}
}

fn first_str(merged: &MergedRecord, keys: &[&str]) -> Option<String> {
	keys.iter()
		.find_map(|key| merged.get(*key).and_then(ScalarValue::as_str).map(str::trim).filter(|v| !v.is_empty()).map(str::to_string))
}

fn first_f64(merged: &MergedRecord, keys: &[&str]) -> Option<f64> {
	keys.iter().find_map(|key| merged.get(*key).and_then(ScalarValue::as_f64))
}

fn field_provenance(merged: &MergedRecord, keys: &[(&str, &str)]) -> FieldProvenance {
	let sources: Vec<_> = keys
		.iter()
		.filter_map(|(source, key)| {
			merged
				.get(*key)
				.filter(|value| value.is_present())
				.map(|value| FieldSourceEntry { source: (*source).to_string(), value: value.clone() })
		})
		.collect();
	let value = sources.first().map(|entry| entry.value.clone()).unwrap_or(ScalarValue::Null);

	FieldProvenance { value, sources }
}

fn coordinates_provenance(merged: &MergedRecord) -> FieldProvenance {
	const CANDIDATES: [(&str, &str, &str); 2] =
		[("ipinfo", "ipinfo_lat", "ipinfo_lon"), ("ip2location", "ip2location_lat", "ip2location_lon")];

	let sources: Vec<_> = CANDIDATES
		.into_iter()
		.filter_map(|(source, lat_key, lon_key)| {
			let lat = merged.get(lat_key).and_then(ScalarValue::as_f64)?;
			let lon = merged.get(lon_key).and_then(ScalarValue::as_f64)?;

			Some(FieldSourceEntry { source: source.to_string(), value: ScalarValue::Str(format!("{lat},{lon}")) })
		})
		.collect();
	let value = sources.first().map(|entry| entry.value.clone()).unwrap_or(ScalarValue::Null);

	FieldProvenance { value, sources }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::ApiErrorEntry;

	fn outcome(merged: MergedRecord) -> SingleIpOutcome {
		SingleIpOutcome {
			ip: "8.8.8.8".to_string(),
			asn: None,
			merged,
			successful: vec!["ipguide".to_string()],
			errors: Vec::<ApiErrorEntry>::new(),
			providers: BTreeMap::new(),
			cached: false,
			cached_api_count: 0,
			total_api_count: 1,
		}
	}

	fn map(pairs: &[(&str, ScalarValue)]) -> MergedRecord {
		pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
	}

	#[test]
	fn all_providers_agree_on_datacenter_and_native() {
		let merged = map(&[
			("ipqs_connection_type", "Data Center".into()),
			("abuseipdb_usage_type", "Data Center/Web Hosting/Transit".into()),
			("ip2location_usage", "DCH".into()),
			("ipinfo_hosting", true.into()),
			("ipguide_asn_country", "US".into()),
			("ip2location_country_code", "US".into()),
		]);

		let record = derive(outcome(merged), None);

		assert_eq!(record.summary.ip_type.as_ref().unwrap().value, "datacenter");
		assert!(record.summary.risk.is_hosting);

		let ip_source = record.summary.ip_source.unwrap();
		assert_eq!(ip_source.is_native, Some(true));
		assert_eq!(ip_source.geo_country.as_deref(), Some("US"));
		assert_eq!(ip_source.registry_country.as_deref(), Some("US"));
	}

	#[test]
	fn conflicting_geo_and_registry_yields_broadcast() {
		let merged = map(&[
			("ipguide_asn_country", "DE".into()),
			("ip2location_country_code", "US".into()),
			("ipqs_connection_type", "Residential".into()),
			("ip2location_usage", "ISP".into()),
			("abuseipdb_usage_type", "Residential".into()),
		]);

		let record = derive(outcome(merged), None);

		assert_eq!(record.summary.ip_type.as_ref().unwrap().value, "residential");

		let ip_source = record.summary.ip_source.unwrap();
		assert_eq!(ip_source.is_native, Some(false));
		assert!(ip_source.reason.contains("DE"));
		assert!(ip_source.reason.contains("US"));
	}

	#[test]
	fn no_votes_yields_unknown_with_empty_sources() {
		let record = derive(outcome(MergedRecord::new()), None);
		let ip_type = record.summary.ip_type.unwrap();

		assert_eq!(ip_type.value, "unknown");
		assert!(ip_type.votes.is_empty());
		assert!(!record.summary.risk.is_hosting);
	}

	#[test]
	fn missing_registry_country_yields_null_native_judgment() {
		let merged = map(&[("ip2location_country_code", "US".into())]);
		let record = derive(outcome(merged), None);
		let ip_source = record.summary.ip_source.unwrap();

		assert_eq!(ip_source.is_native, None);
		assert!(ip_source.reason.contains("insufficient") || ip_source.reason.contains("unknown"));
	}

	#[test]
	fn coordinates_field_combines_lat_and_lon_per_source() {
		let merged = map(&[("ipinfo_lat", 37.4056.into()), ("ipinfo_lon", (-122.0775_f64).into())]);
		let record = derive(outcome(merged), None);
		let coordinates = record.fields.get("coordinates").unwrap();

		assert_eq!(coordinates.sources.len(), 1);
		assert_eq!(coordinates.sources[0].source, "ipinfo");
	}
}
