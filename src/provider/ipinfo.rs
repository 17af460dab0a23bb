//! `ipinfo`: key-as-bearer-header geolocation provider. Fetched in Wave 1.

// crates.io
use serde_json::Value;
// self
use crate::{
	config::Config,
	provider::{FetchContext, ProviderDescriptor, ProviderKind, RequestSpec},
	types::NormalizedMap,
};

fn enabled(config: &Config) -> bool {
	config.credentials_for("ipinfo").is_some_and(|keys| !keys.is_empty())
}

fn build_request(ctx: &FetchContext) -> RequestSpec {
	let url = url::Url::parse(&format!("https://ipinfo.io/{}/json", ctx.ip)).expect("static host, validated IP segment");
	let headers = ctx.key.map(|key| ("Authorization", format!("Bearer {key}"))).into_iter().collect();

	RequestSpec { url, headers }
}

fn check_error(payload: &Value) -> Option<String> {
	payload.get("error").and_then(Value::as_object).map(|_| "ipinfo returned an error object".to_string())
}

/// ipinfo's `org` field is formatted `"AS15169 Google LLC"`; split the ASN
/// prefix from the organization name.
fn split_org(org: &str) -> (Option<String>, Option<String>) {
	let org = org.trim();

	match org.split_once(' ') {
		Some((asn, rest)) if asn.starts_with("AS") && asn[2..].chars().all(|c| c.is_ascii_digit()) =>
			(Some(asn.to_string()), Some(rest.trim().to_string())),
		_ if !org.is_empty() => (None, Some(org.to_string())),
		_ => (None, None),
	}
}

fn transform(payload: &Value) -> NormalizedMap {
	let mut map = NormalizedMap::new();

	if let Some(city) = payload.get("city").and_then(Value::as_str) {
		map.insert("ipinfo_city".into(), city.into());
	}
	if let Some(region) = payload.get("region").and_then(Value::as_str) {
		map.insert("ipinfo_region".into(), region.into());
	}
	if let Some(country) = payload.get("country").and_then(Value::as_str) {
		map.insert("ipinfo_country".into(), country.to_ascii_uppercase().into());
	}
	if let Some(timezone) = payload.get("timezone").and_then(Value::as_str) {
		map.insert("ipinfo_timezone".into(), timezone.into());
	}
	if let Some(loc) = payload.get("loc").and_then(Value::as_str) {
		map.insert("ipinfo_loc".into(), loc.into());

		if let Some((lat, lon)) = loc.split_once(',') {
			if let Ok(lat) = lat.trim().parse::<f64>() {
				map.insert("ipinfo_lat".into(), lat.into());
			}
			if let Ok(lon) = lon.trim().parse::<f64>() {
				map.insert("ipinfo_lon".into(), lon.into());
			}
		}
	}

	if let Some(org) = payload.get("org").and_then(Value::as_str) {
		let (asn, organization) = split_org(org);

		if let Some(asn) = asn {
			map.insert("asn".into(), asn.clone().into());
			map.insert("ipinfo_asn".into(), asn.into());
		}
		if let Some(organization) = organization {
			map.insert("ipinfo_organization".into(), organization.into());
		}
	}

	if let Some(hosting) = payload.pointer("/privacy/hosting").and_then(Value::as_bool) {
		map.insert("ipinfo_hosting".into(), hosting.into());
	}
	if let Some(vpn) = payload.pointer("/privacy/vpn").and_then(Value::as_bool) {
		map.insert("is_vpn".into(), vpn.into());
		map.insert("ipinfo_vpn".into(), vpn.into());
	}
	if let Some(proxy) = payload.pointer("/privacy/proxy").and_then(Value::as_bool) {
		map.insert("is_proxy".into(), proxy.into());
		map.insert("ipinfo_proxy".into(), proxy.into());
	}
	if let Some(tor) = payload.pointer("/privacy/tor").and_then(Value::as_bool) {
		map.insert("is_tor".into(), tor.into());
		map.insert("ipinfo_tor".into(), tor.into());
	}

	map
}

/// Build this provider's registry entry.
pub fn descriptor() -> ProviderDescriptor {
	ProviderDescriptor {
		name: "ipinfo",
		kind: ProviderKind::KeyNotAsn,
		requires_key: true,
		enabled,
		build_request,
		check_error,
		transform,
		raw_data_transform: None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn transform_splits_org_into_asn_and_name() {
		let payload = serde_json::json!({
			"city": "Mountain View",
			"country": "us",
			"loc": "37.4056,-122.0775",
			"org": "AS15169 Google LLC",
			"privacy": {"hosting": true, "vpn": false},
		});

		let map = transform(&payload);

		assert_eq!(map.get("asn").and_then(|v| v.as_str()), Some("AS15169"));
		assert_eq!(map.get("ipinfo_organization").and_then(|v| v.as_str()), Some("Google LLC"));
		assert_eq!(map.get("ipinfo_country").and_then(|v| v.as_str()), Some("US"));
		assert_eq!(map.get("ipinfo_lat").and_then(|v| v.as_f64()), Some(37.4056));
		assert_eq!(map.get("ipinfo_hosting").and_then(|v| v.as_bool()), Some(true));
		assert_eq!(map.get("is_vpn").and_then(|v| v.as_bool()), Some(false));
		assert_eq!(map.get("ipinfo_vpn").and_then(|v| v.as_bool()), Some(false));
	}

	#[test]
	fn transform_handles_org_without_asn_prefix() {
		let (asn, name) = split_org("Some Hosting Co");
		assert_eq!(asn, None);
		assert_eq!(name.as_deref(), Some("Some Hosting Co"));
	}

	#[test]
	fn check_error_detects_error_object() {
		let payload = serde_json::json!({"error": {"title": "Wrong token"}});
		assert!(check_error(&payload).is_some());
	}
}
