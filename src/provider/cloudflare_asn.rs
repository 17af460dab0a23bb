//! `cloudflare_asn`: ASN-dependent, key-as-header provider. Fetched only in
//! Wave 2, once a candidate ASN has been derived from Wave 1.

// crates.io
use serde_json::Value;
// self
use crate::{
	config::Config,
	provider::{FetchContext, ProviderDescriptor, ProviderKind, RequestSpec},
	types::NormalizedMap,
};

fn enabled(config: &Config) -> bool {
	config.credentials_for("cloudflare_asn").is_some_and(|keys| !keys.is_empty())
}

fn build_request(ctx: &FetchContext) -> RequestSpec {
	let asn_digits: String = ctx.asn.unwrap_or_default().chars().filter(char::is_ascii_digit).collect();
	let url = url::Url::parse(&format!("https://api.cloudflare.com/client/v4/radar/entities/asns/{asn_digits}"))
		.expect("static host, numeric ASN segment");
	let headers = ctx.key.map(|key| ("Authorization", format!("Bearer {key}"))).into_iter().collect();

	RequestSpec { url, headers }
}

fn check_error(payload: &Value) -> Option<String> {
	let success = payload.get("success").and_then(Value::as_bool).unwrap_or(true);

	if success {
		None
	} else {
		payload
			.get("errors")
			.and_then(Value::as_array)
			.and_then(|errors| errors.first())
			.and_then(|e| e.get("message"))
			.and_then(Value::as_str)
			.map(str::to_string)
			.or_else(|| Some("cloudflare radar reported success=false".to_string()))
	}
}

fn transform(payload: &Value) -> NormalizedMap {
	let mut map = NormalizedMap::new();
	let Some(result) = payload.get("result") else { return map };

	if let Some(name) = result.get("name").and_then(Value::as_str) {
		map.insert("cloudflare_asn_name".into(), name.into());
	}
	if let Some(country) = result.get("country").and_then(Value::as_str) {
		map.insert("cloudflare_asn_country".into(), country.to_ascii_uppercase().into());
	}
	if let Some(org) = result.get("orgName").and_then(Value::as_str) {
		map.insert("cloudflare_asn_organization".into(), org.into());
	}

	map
}

/// Build this provider's registry entry.
pub fn descriptor() -> ProviderDescriptor {
	ProviderDescriptor {
		name: "cloudflare_asn",
		kind: ProviderKind::AsnDependent,
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
	fn build_request_strips_as_prefix_from_asn() {
		let ctx = FetchContext { ip: "1.1.1.1", asn: Some("AS13335"), key: Some("token") };
		let request = build_request(&ctx);

		assert!(request.url.as_str().ends_with("/13335"));
	}

	#[test]
	fn transform_reads_name_and_country() {
		let payload = serde_json::json!({"result": {"name": "CLOUDFLARENET", "country": "us"}});
		let map = transform(&payload);

		assert_eq!(map.get("cloudflare_asn_name").and_then(|v| v.as_str()), Some("CLOUDFLARENET"));
		assert_eq!(map.get("cloudflare_asn_country").and_then(|v| v.as_str()), Some("US"));
	}

	#[test]
	fn check_error_fires_on_explicit_failure() {
		let payload = serde_json::json!({"success": false, "errors": [{"message": "Invalid ASN."}]});
		assert_eq!(check_error(&payload).as_deref(), Some("Invalid ASN."));
	}
}
