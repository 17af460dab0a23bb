//! Async IP-reputation aggregation engine — multi-provider fan-out, credential
//! rotation, TTL caching, and derived-attribute voting, built for services
//! that need a single trustworthy verdict out of several disagreeing
//! third-party reputation feeds.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]
#![allow(clippy::too_many_arguments)]

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod credential;
pub mod derive;
pub mod http;
pub mod llm;
#[cfg(feature = "metrics")] pub mod metrics;
pub mod provider;
pub mod security;
pub mod stream;
pub mod types;

mod error;
mod _prelude {
	pub use std::{
		sync::Arc,
		time::{Duration, SystemTime},
	};

	pub use chrono::{DateTime, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}
#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	aggregate::{Aggregator, SingleIpOutcome},
	error::{Error, Result},
};

#[cfg(test)]
mod _test {
	use metrics_util as _;
	use tracing_subscriber as _;
	use wiremock as _;
}
