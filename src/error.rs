//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the IP-reputation aggregation crate.
///
/// Per-provider failures are never represented here — they are captured as
/// data in `ProviderResult`/`apiErrors` so one provider outage never fails
/// the whole aggregation. This enum is reserved for library-fatal outcomes:
/// bad input, misconfiguration, or an exhausted cache backend.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	SystemTime(#[from] std::time::SystemTimeError),

	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[cfg(feature = "redis")]
	#[error(transparent)]
	Redis(#[from] redis::RedisError),

	#[error("Cache error: {0}")]
	Cache(String),
	#[error("Upstream HTTP status {status} from {url}: {body:?}")]
	HttpStatus { status: reqwest::StatusCode, url: url::Url, body: Option<String> },
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Provider '{0}' is not registered.")]
	NotRegistered(String),
	#[error("Security violation: {0}")]
	Security(String),
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
	#[error("Invalid IP address '{0}'")]
	InvalidIp(String),
	#[error("All API keys exhausted for provider '{provider}': {last_message}")]
	CredentialsExhausted { provider: String, last_message: String },
	#[error("Provider '{provider}' failed: {message}")]
	ProviderFailed { provider: String, message: String },
}
#[cfg(feature = "metrics")]
impl<T> From<metrics::SetRecorderError<T>> for Error
where
	T: std::fmt::Display,
{
	fn from(value: metrics::SetRecorderError<T>) -> Self {
		Self::Metrics(value.to_string())
	}
}
