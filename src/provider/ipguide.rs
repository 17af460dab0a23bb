//! `ipguide`: no-key ASN/registry lookup. Fetched in Wave 1 and, when
//! successful, the only source of `registryCountry` for the native/broadcast
//! judgment.

// crates.io
use serde_json::Value;
// self
use crate::{
	config::Config,
	provider::{FetchContext, ProviderDescriptor, ProviderKind, RequestSpec},
	types::NormalizedMap,
};

fn enabled(_config: &Config) -> bool {
	true
}

fn build_request(ctx: &FetchContext) -> RequestSpec {
	let url = url::Url::parse(&format!("https://ip.guide/{}", ctx.ip)).expect("static host, validated IP segment");

	RequestSpec { url, headers: Vec::new() }
}

fn check_error(_payload: &Value) -> Option<String> {
	None
}

fn transform(payload: &Value) -> NormalizedMap {
	let mut map = NormalizedMap::new();

	let asn = payload.pointer("/autonomous_system/asn").and_then(Value::as_u64);
	let asn_label = asn.map(|n| format!("AS{n}"));

	if let Some(label) = asn_label.clone() {
		map.insert("asn".into(), label.clone().into());
		map.insert("ipguide_asn".into(), label.into());
	}

	if let Some(country) = payload.pointer("/autonomous_system/country_code").and_then(Value::as_str) {
		map.insert("ipguide_asn_country".into(), country.to_ascii_uppercase().into());
	}

	if let Some(name) = payload.pointer("/autonomous_system/name").and_then(Value::as_str) {
		map.insert("ipguide_isp".into(), name.into());
		map.insert("ipguide_organization".into(), name.into());
	}

	map
}

/// Build this provider's registry entry.
pub fn descriptor() -> ProviderDescriptor {
	ProviderDescriptor {
		name: "ipguide",
		kind: ProviderKind::NoKey,
		requires_key: false,
		enabled,
		build_request,
		check_error,
		transform,
		raw_data_transform: None,
	}
}
