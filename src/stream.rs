//! Batch Streaming Scheduler: one task per unique IP, results emitted as they
//! complete over a bounded channel.
//!
//! Matches the "bounded channel of `Event`" design from spec.md §9: the
//! scheduler itself caps nothing beyond the per-IP wave concurrency already
//! enforced by `Aggregator::resolve`; it only dedups input and fans out.

// std
use std::{collections::HashSet, sync::Arc};
// crates.io
use futures::{
	Stream,
	stream::{FuturesUnordered, StreamExt},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
// self
use crate::{
	_prelude::*,
	aggregate::Aggregator,
	cache::backend::CacheBackend,
	derive,
	types::{BatchEvent, BatchItem, Progress},
};

/// Recommended, non-enforced upper bound on batch size. Exceeding it only
/// logs a warning, per spec.md §4.7.
pub const RECOMMENDED_BATCH_SIZE: usize = 20;

const CHANNEL_CAPACITY: usize = 32;

impl<B: CacheBackend + Send + Sync + 'static> Aggregator<B> {
	/// Run the Single-IP Aggregator over every unique IP in `items`, streaming
	/// a `BatchEvent` as each one completes.
	///
	/// Duplicate IPs collapse to their first occurrence; the stream always
	/// ends with exactly one `Done` event, unless an unexpected failure in the
	/// scheduling task itself produces a single trailing `StreamError`.
	pub fn batch_stream(self: Arc<Self>, items: Vec<BatchItem>) -> impl Stream<Item = BatchEvent> {
		let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
		let supervisor_tx = tx.clone();

		tokio::spawn(async move {
			if tokio::spawn(run_batch(self, items, tx)).await.is_err() {
				let _ = supervisor_tx.send(BatchEvent::StreamError { code: "STREAM_ERROR".to_string() }).await;
			}
		});

		ReceiverStream::new(rx)
	}
}

async fn run_batch<B: CacheBackend + Send + Sync + 'static>(
	aggregator: Arc<Aggregator<B>>,
	items: Vec<BatchItem>,
	tx: mpsc::Sender<BatchEvent>,
) {
	let unique = dedup_by_ip(items);
	let total = unique.len() as u32;

	if unique.len() > RECOMMENDED_BATCH_SIZE {
		tracing::warn!(count = unique.len(), recommended = RECOMMENDED_BATCH_SIZE, "batch exceeds recommended size");
	}

	let mut in_flight: FuturesUnordered<_> = unique
		.into_iter()
		.map(|item| {
			let aggregator = Arc::clone(&aggregator);

			async move {
				let asn_hint = item.edge.as_ref().and_then(|edge| edge.asn.as_deref().map(str::to_string));
				let outcome = aggregator.resolve(&item.ip, asn_hint.as_deref()).await;

				(item, outcome)
			}
		})
		.collect();

	let mut completed = 0u32;

	while let Some((item, outcome)) = in_flight.next().await {
		completed += 1;
		let progress = Progress { completed, total };

		let event = match outcome {
			Ok(outcome) => {
				let derived = derive::derive(outcome, item.edge.clone());

				BatchEvent::Result { ip: item.ip, result: Box::new(derived), progress }
			},
			Err(err) => BatchEvent::ItemError { ip: item.ip, code: "ITEM_FAILED".to_string(), error: err.to_string(), progress },
		};

		if tx.send(event).await.is_err() {
			return;
		}
	}

	let _ = tx.send(BatchEvent::Done { progress: Progress { completed: total, total } }).await;
}

/// Collapse duplicate IPs to their first occurrence, preserving the order of
/// first appearance.
fn dedup_by_ip(items: Vec<BatchItem>) -> Vec<BatchItem> {
	let mut seen = HashSet::new();

	items.into_iter().filter(|item| seen.insert(item.ip.clone())).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn item(ip: &str) -> BatchItem {
		BatchItem { ip: ip.to_string(), exit_type: None, edge: None }
	}

	#[test]
	fn dedup_collapses_duplicates_to_first_occurrence() {
		let items = vec![item("8.8.8.8"), item("1.1.1.1"), item("8.8.8.8"), item("9.9.9.9")];
		let unique = dedup_by_ip(items);

		assert_eq!(unique.iter().map(|i| i.ip.as_str()).collect::<Vec<_>>(), ["8.8.8.8", "1.1.1.1", "9.9.9.9"]);
	}

	#[test]
	fn dedup_of_empty_input_is_empty() {
		assert!(dedup_by_ip(Vec::new()).is_empty());
	}
}
