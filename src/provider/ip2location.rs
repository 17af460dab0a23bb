//! `ip2location`: key-as-query-parameter geolocation provider. Fetched in
//! Wave 1. Its `usage_type` field is the third vote consulted by the IP-type
//! tally.

// crates.io
use serde_json::Value;
// self
use crate::{
	config::Config,
	provider::{FetchContext, ProviderDescriptor, ProviderKind, RequestSpec},
	types::NormalizedMap,
};

fn enabled(config: &Config) -> bool {
	config.credentials_for("ip2location").is_some_and(|keys| !keys.is_empty())
}

fn build_request(ctx: &FetchContext) -> RequestSpec {
	let mut url = url::Url::parse("https://api.ip2location.io/").expect("static URL");

	url.query_pairs_mut().append_pair("ip", ctx.ip);
	if let Some(key) = ctx.key {
		url.query_pairs_mut().append_pair("key", key);
	}

	RequestSpec { url, headers: Vec::new() }
}

fn check_error(payload: &Value) -> Option<String> {
	payload.get("error").and_then(Value::as_object).and_then(|err| err.get("error_message")).and_then(Value::as_str).map(str::to_string)
}

fn transform(payload: &Value) -> NormalizedMap {
	let mut map = NormalizedMap::new();

	if let Some(usage_type) = payload.get("usage_type").and_then(Value::as_str) {
		map.insert("ip2location_usage".into(), usage_type.into());
	}
	if let Some(country_code) = payload.get("country_code").and_then(Value::as_str) {
		map.insert("ip2location_country_code".into(), country_code.to_ascii_uppercase().into());
	}
	if let Some(city) = payload.get("city_name").and_then(Value::as_str) {
		map.insert("ip2location_city".into(), city.into());
	}
	if let Some(region) = payload.get("region_name").and_then(Value::as_str) {
		map.insert("ip2location_region".into(), region.into());
	}
	if let Some(timezone) = payload.get("time_zone").and_then(Value::as_str) {
		map.insert("ip2location_timezone".into(), timezone.into());
	}
	if let Some(lat) = payload.get("latitude").and_then(Value::as_f64) {
		map.insert("ip2location_lat".into(), lat.into());
	}
	if let Some(lon) = payload.get("longitude").and_then(Value::as_f64) {
		map.insert("ip2location_lon".into(), lon.into());
	}
	if let Some(isp) = payload.get("isp").and_then(Value::as_str) {
		map.insert("ip2location_isp".into(), isp.into());
	}
	if let Some(asn) = payload.get("asn").and_then(Value::as_str) {
		map.insert("as".into(), asn.into());
	}
	if let Some(is_proxy) = payload.pointer("/proxy/is_vpn").and_then(Value::as_bool) {
		map.insert("is_vpn".into(), is_proxy.into());
	}

	map
}

/// Build this provider's registry entry.
pub fn descriptor() -> ProviderDescriptor {
	ProviderDescriptor {
		name: "ip2location",
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
	fn transform_reads_usage_type_and_geo_fields() {
		let payload = serde_json::json!({
			"usage_type": "DCH",
			"country_code": "sg",
			"city_name": "Singapore",
			"latitude": 1.2897,
			"asn": "AS45102",
		});

		let map = transform(&payload);

		assert_eq!(map.get("ip2location_usage").and_then(|v| v.as_str()), Some("DCH"));
		assert_eq!(map.get("ip2location_country_code").and_then(|v| v.as_str()), Some("SG"));
		assert_eq!(map.get("as").and_then(|v| v.as_str()), Some("AS45102"));
	}

	#[test]
	fn check_error_extracts_message() {
		let payload = serde_json::json!({"error": {"error_message": "Invalid IP address."}});
		assert_eq!(check_error(&payload).as_deref(), Some("Invalid IP address."));
	}
}
