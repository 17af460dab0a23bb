//! `ipqs` (IPQualityScore): key-as-query-parameter fraud/risk provider.
//! Fetched in Wave 1. Its `connection_type` field is the first vote consulted
//! by the IP-type tally.

// crates.io
use serde_json::Value;
// self
use crate::{
	config::Config,
	provider::{FetchContext, ProviderDescriptor, ProviderKind, RequestSpec},
	types::NormalizedMap,
};

fn enabled(config: &Config) -> bool {
	config.credentials_for("ipqs").is_some_and(|keys| !keys.is_empty())
}

fn build_request(ctx: &FetchContext) -> RequestSpec {
	let key = ctx.key.unwrap_or_default();
	let mut url = url::Url::parse(&format!("https://ipqualityscore.com/api/json/ip/{key}/{}", ctx.ip))
		.expect("static host, validated segments");

	url.query_pairs_mut().append_pair("strictness", "1");

	RequestSpec { url, headers: Vec::new() }
}

fn check_error(payload: &Value) -> Option<String> {
	let success = payload.get("success").and_then(Value::as_bool).unwrap_or(true);

	if success {
		None
	} else {
		Some(payload.get("message").and_then(Value::as_str).unwrap_or("ipqs reported success=false").to_string())
	}
}

fn transform(payload: &Value) -> NormalizedMap {
	let mut map = NormalizedMap::new();

	if let Some(connection_type) = payload.get("connection_type").and_then(Value::as_str) {
		map.insert("connection_type".into(), connection_type.into());
		map.insert("ipqs_connection_type".into(), connection_type.into());
	}
	if let Some(fraud_score) = payload.get("fraud_score").and_then(Value::as_f64) {
		map.insert("fraud_score".into(), fraud_score.into());
	}
	if let Some(is_vpn) = payload.get("vpn").and_then(Value::as_bool) {
		map.insert("is_vpn".into(), is_vpn.into());
	}
	if let Some(is_proxy) = payload.get("proxy").and_then(Value::as_bool) {
		map.insert("is_proxy".into(), is_proxy.into());
	}
	if let Some(is_tor) = payload.get("tor").and_then(Value::as_bool) {
		map.insert("is_tor".into(), is_tor.into());
	}
	if let Some(isp) = payload.get("ISP").and_then(Value::as_str) {
		map.insert("ipqs_isp".into(), isp.into());
	}
	if let Some(organization) = payload.get("organization").and_then(Value::as_str) {
		map.insert("ipqs_organization".into(), organization.into());
	}

	map
}

/// Build this provider's registry entry.
pub fn descriptor() -> ProviderDescriptor {
	ProviderDescriptor {
		name: "ipqs",
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
	fn check_error_fires_on_explicit_failure() {
		let payload = serde_json::json!({"success": false, "message": "Invalid API key."});
		assert_eq!(check_error(&payload).as_deref(), Some("Invalid API key."));
	}

	#[test]
	fn transform_reads_connection_type_and_risk_flags() {
		let payload = serde_json::json!({
			"success": true,
			"connection_type": "Corporate",
			"fraud_score": 23.0,
			"vpn": true,
			"tor": false,
		});

		let map = transform(&payload);

		assert_eq!(map.get("connection_type").and_then(|v| v.as_str()), Some("Corporate"));
		assert_eq!(map.get("fraud_score").and_then(|v| v.as_f64()), Some(23.0));
		assert_eq!(map.get("is_vpn").and_then(|v| v.as_bool()), Some(true));
		assert_eq!(map.get("is_tor").and_then(|v| v.as_bool()), Some(false));
	}
}
