//! Metrics helpers and per-provider telemetry bookkeeping.

// std
use std::sync::{
	OnceLock,
	atomic::{AtomicU64, Ordering},
};
// crates.io
use metrics::Label;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use smallvec::SmallVec;
// self
use crate::_prelude::*;

type LabelSet = SmallVec<[Label; 3]>;

const METRIC_CACHE_REQUESTS_TOTAL: &str = "ipcheck_cache_requests_total";
const METRIC_CACHE_HITS_TOTAL: &str = "ipcheck_cache_hits_total";
const METRIC_CACHE_NEGATIVE_TOTAL: &str = "ipcheck_cache_negative_total";
const METRIC_CACHE_MISSES_TOTAL: &str = "ipcheck_cache_misses_total";
const METRIC_PROVIDER_REQUESTS_TOTAL: &str = "ipcheck_provider_requests_total";
const METRIC_PROVIDER_DURATION: &str = "ipcheck_provider_duration_seconds";
const METRIC_PROVIDER_ERRORS_TOTAL: &str = "ipcheck_provider_errors_total";
const METRIC_CREDENTIALS_EXHAUSTED_TOTAL: &str = "ipcheck_credentials_exhausted_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thread-safe metrics accumulator for a single provider.
#[derive(Debug, Default)]
pub struct ProviderMetrics {
	total_requests: AtomicU64,
	successes: AtomicU64,
	errors: AtomicU64,
	credentials_exhausted: AtomicU64,
	last_duration_micros: AtomicU64,
}
impl ProviderMetrics {
	/// Create a new metrics accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a successful fetch and its latency.
	pub fn record_success(&self, duration: Duration) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);
		self.successes.fetch_add(1, Ordering::Relaxed);
		self.last_duration_micros.store(duration.as_micros() as u64, Ordering::Relaxed);
	}

	/// Record a failed fetch.
	pub fn record_error(&self) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);
		self.errors.fetch_add(1, Ordering::Relaxed);
	}

	/// Record that the credential pool exhausted every key for this provider.
	pub fn record_credentials_exhausted(&self) {
		self.credentials_exhausted.fetch_add(1, Ordering::Relaxed);
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> ProviderMetricsSnapshot {
		ProviderMetricsSnapshot {
			total_requests: self.total_requests.load(Ordering::Relaxed),
			successes: self.successes.load(Ordering::Relaxed),
			errors: self.errors.load(Ordering::Relaxed),
			credentials_exhausted: self.credentials_exhausted.load(Ordering::Relaxed),
			last_duration_micros: match self.last_duration_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
		}
	}
}

/// Read-only snapshot of per-provider telemetry counters.
#[derive(Clone, Debug)]
pub struct ProviderMetricsSnapshot {
	/// Total number of fetch attempts observed.
	pub total_requests: u64,
	/// Count of fetches that succeeded.
	pub successes: u64,
	/// Count of fetches that ended in `apiErrors`.
	pub errors: u64,
	/// Count of times the credential pool exhausted every key.
	pub credentials_exhausted: u64,
	/// Microsecond latency of the most recent successful fetch.
	pub last_duration_micros: Option<u64>,
}
impl ProviderMetricsSnapshot {
	/// Convenience method to compute the success rate.
	pub fn success_rate(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.successes as f64 / self.total_requests as f64
		}
	}
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new().install_recorder().map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Record a cache lookup that hit a positive or negative entry.
pub fn record_cache_hit(is_negative: bool) {
	metrics::counter!(METRIC_CACHE_REQUESTS_TOTAL).increment(1);
	metrics::counter!(METRIC_CACHE_HITS_TOTAL).increment(1);

	if is_negative {
		metrics::counter!(METRIC_CACHE_NEGATIVE_TOTAL).increment(1);
	}
}

/// Record a cache lookup that missed, requiring a fresh aggregation.
pub fn record_cache_miss() {
	metrics::counter!(METRIC_CACHE_REQUESTS_TOTAL).increment(1);
	metrics::counter!(METRIC_CACHE_MISSES_TOTAL).increment(1);
}

/// Record a successful provider fetch and its latency.
pub fn record_provider_success(provider: &str, duration: Duration) {
	metrics::counter!(METRIC_PROVIDER_REQUESTS_TOTAL, status_labels(provider, "success").iter()).increment(1);
	metrics::histogram!(METRIC_PROVIDER_DURATION, provider_labels(provider).iter()).record(duration.as_secs_f64());
}

/// Record a failed provider fetch.
pub fn record_provider_error(provider: &str) {
	metrics::counter!(METRIC_PROVIDER_REQUESTS_TOTAL, status_labels(provider, "error").iter()).increment(1);
	metrics::counter!(METRIC_PROVIDER_ERRORS_TOTAL, provider_labels(provider).iter()).increment(1);
}

/// Record that a provider's credential pool exhausted every key for one request.
pub fn record_credentials_exhausted(provider: &str) {
	metrics::counter!(METRIC_CREDENTIALS_EXHAUSTED_TOTAL, provider_labels(provider).iter()).increment(1);
}

fn provider_labels(provider: &str) -> LabelSet {
	let mut labels = LabelSet::with_capacity(1);

	labels.push(Label::new("provider", provider.to_owned()));

	labels
}

fn status_labels(provider: &str, status: &'static str) -> LabelSet {
	let mut labels = provider_labels(provider);

	labels.push(Label::new("status", status));

	labels
}
