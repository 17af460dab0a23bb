//! `abuseipdb`: key-as-header abuse-reporting provider. Fetched in Wave 1.
//! Its `usageType` field is the second vote consulted by the IP-type tally.

// crates.io
use serde_json::Value;
// self
use crate::{
	config::Config,
	provider::{FetchContext, ProviderDescriptor, ProviderKind, RequestSpec},
	types::NormalizedMap,
};

fn enabled(config: &Config) -> bool {
	config.credentials_for("abuseipdb").is_some_and(|keys| !keys.is_empty())
}

fn build_request(ctx: &FetchContext) -> RequestSpec {
	let mut url = url::Url::parse("https://api.abuseipdb.com/api/v2/check").expect("static URL");

	url.query_pairs_mut().append_pair("ipAddress", ctx.ip).append_pair("maxAgeInDays", "90");

	let headers = ctx.key.map(|key| ("Key", key.to_string())).into_iter().collect();

	RequestSpec { url, headers }
}

fn check_error(payload: &Value) -> Option<String> {
	payload.get("errors").and_then(Value::as_array).filter(|errors| !errors.is_empty()).map(|errors| {
		errors
			.iter()
			.filter_map(|e| e.get("detail").and_then(Value::as_str))
			.collect::<Vec<_>>()
			.join("; ")
	})
}

fn transform(payload: &Value) -> NormalizedMap {
	let mut map = NormalizedMap::new();
	let Some(data) = payload.get("data") else { return map };

	if let Some(usage_type) = data.get("usageType").and_then(Value::as_str) {
		map.insert("usage_type".into(), usage_type.into());
		map.insert("abuseipdb_usage_type".into(), usage_type.into());
	}
	if let Some(abuse_score) = data.get("abuseConfidenceScore").and_then(Value::as_f64) {
		map.insert("abuse_score".into(), abuse_score.into());
	}
	if let Some(total_reports) = data.get("totalReports").and_then(Value::as_f64) {
		map.insert("total_reports".into(), total_reports.into());
	}
	if let Some(last_reported_at) = data.get("lastReportedAt").and_then(Value::as_str) {
		map.insert("last_reported_at".into(), last_reported_at.into());
	}
	if let Some(is_tor) = data.get("isTor").and_then(Value::as_bool) {
		map.insert("is_tor".into(), is_tor.into());
	}
	if let Some(country) = data.get("countryCode").and_then(Value::as_str) {
		map.insert("country_code".into(), country.to_ascii_uppercase().into());
	}
	if let Some(isp) = data.get("isp").and_then(Value::as_str) {
		map.insert("abuseipdb_isp".into(), isp.into());
	}

	map
}

/// Build this provider's registry entry.
pub fn descriptor() -> ProviderDescriptor {
	ProviderDescriptor {
		name: "abuseipdb",
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
	fn transform_reads_usage_type_and_abuse_fields() {
		let payload = serde_json::json!({
			"data": {
				"usageType": "Data Center/Web Hosting/Transit",
				"abuseConfidenceScore": 42.0,
				"totalReports": 7.0,
				"isTor": false,
				"countryCode": "us",
			}
		});

		let map = transform(&payload);

		assert_eq!(map.get("usage_type").and_then(|v| v.as_str()), Some("Data Center/Web Hosting/Transit"));
		assert_eq!(map.get("abuse_score").and_then(|v| v.as_f64()), Some(42.0));
		assert_eq!(map.get("country_code").and_then(|v| v.as_str()), Some("US"));
	}

	#[test]
	fn check_error_joins_error_details() {
		let payload = serde_json::json!({"errors": [{"detail": "Invalid key."}, {"detail": "Expired."}]});
		assert_eq!(check_error(&payload).as_deref(), Some("Invalid key.; Expired."));
	}

	#[test]
	fn check_error_is_none_without_errors_array() {
		assert!(check_error(&serde_json::json!({"data": {}})).is_none());
	}
}
