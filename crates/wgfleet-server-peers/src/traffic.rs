// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! In-memory traffic history.
//!
//! Remotes report cumulative transfer counters, not rates. Each dashboard
//! render records one sample per server; period usage is then estimated as
//! the spread between the smallest and largest counter values inside the
//! window. History lives in process memory only and does not survive a
//! restart.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

/// One cumulative counter reading for a server.
#[derive(Debug, Clone, Serialize)]
pub struct TrafficSample {
	#[serde(rename = "timestamp")]
	pub ts: DateTime<Utc>,
	pub total_rx: i64,
	pub total_tx: i64,
}

/// Rolling per-server sample store. Cloning shares the underlying history.
///
/// Each server's series sits behind its own lock; the outer registry lock is
/// held only long enough to find the series, so servers never contend with
/// each other.
#[derive(Debug, Clone)]
pub struct TrafficHistory {
	retention: chrono::Duration,
	series: Arc<RwLock<HashMap<i64, Arc<RwLock<Vec<TrafficSample>>>>>>,
}

impl TrafficHistory {
	pub fn new(retention: chrono::Duration) -> Self {
		Self {
			retention,
			series: Arc::new(RwLock::new(HashMap::new())),
		}
	}

	/// Records the current cumulative counters for a server and prunes
	/// samples older than the retention window.
	pub async fn record_snapshot(&self, server_id: i64, total_rx: i64, total_tx: i64) {
		self.record_at(server_id, total_rx, total_tx, Utc::now()).await;
	}

	pub(crate) async fn record_at(
		&self,
		server_id: i64,
		total_rx: i64,
		total_tx: i64,
		ts: DateTime<Utc>,
	) {
		let cutoff = ts - self.retention;
		let series = self.series_for(server_id).await;
		let mut samples = series.write().await;
		samples.push(TrafficSample {
			ts,
			total_rx,
			total_tx,
		});
		samples.retain(|sample| sample.ts >= cutoff);
	}

	/// Estimated (rx, tx) byte usage within the trailing window.
	///
	/// Fewer than two samples in the window means there is nothing to
	/// compare yet, so the delta reports zero rather than guessing. The
	/// spread is max minus min, not last minus first, which keeps the
	/// result non-negative across counter resets.
	pub async fn delta_for_window(&self, server_id: i64, window: chrono::Duration) -> (i64, i64) {
		let cutoff = Utc::now() - window;
		let Some(series) = self.existing_series(server_id).await else {
			return (0, 0);
		};
		let samples = series.read().await;

		let mut count = 0usize;
		let mut min_rx = i64::MAX;
		let mut max_rx = i64::MIN;
		let mut min_tx = i64::MAX;
		let mut max_tx = i64::MIN;
		for sample in samples.iter().filter(|s| s.ts >= cutoff) {
			count += 1;
			min_rx = min_rx.min(sample.total_rx);
			max_rx = max_rx.max(sample.total_rx);
			min_tx = min_tx.min(sample.total_tx);
			max_tx = max_tx.max(sample.total_tx);
		}
		if count < 2 {
			return (0, 0);
		}
		((max_rx - min_rx).max(0), (max_tx - min_tx).max(0))
	}

	/// Samples within the trailing window, oldest first.
	pub async fn history_for_window(
		&self,
		server_id: i64,
		window: chrono::Duration,
	) -> Vec<TrafficSample> {
		let cutoff = Utc::now() - window;
		let Some(series) = self.existing_series(server_id).await else {
			return Vec::new();
		};
		let samples = series.read().await;
		samples.iter().filter(|s| s.ts >= cutoff).cloned().collect()
	}

	async fn series_for(&self, server_id: i64) -> Arc<RwLock<Vec<TrafficSample>>> {
		{
			let registry = self.series.read().await;
			if let Some(series) = registry.get(&server_id) {
				return series.clone();
			}
		}
		let mut registry = self.series.write().await;
		registry.entry(server_id).or_default().clone()
	}

	async fn existing_series(&self, server_id: i64) -> Option<Arc<RwLock<Vec<TrafficSample>>>> {
		self.series.read().await.get(&server_id).cloned()
	}
}


#[cfg(test)]
mod proptests {
	use super::*;
	use proptest::prelude::*;

	proptest! {
		#![proptest_config(ProptestConfig::with_cases(16))]

		#[test]
		fn delta_components_are_never_negative(
			counters in proptest::collection::vec((0i64..1_000_000_000, 0i64..1_000_000_000), 0..20)
		) {
			let rt = tokio::runtime::Runtime::new().unwrap();
			rt.block_on(async {
				let traffic = TrafficHistory::new(chrono::Duration::days(7));
				let now = Utc::now();
				let len = counters.len() as i64;
				for (i, (rx, tx)) in counters.into_iter().enumerate() {
					let ts = now - chrono::Duration::minutes(len - i as i64);
					traffic.record_at(1, rx, tx, ts).await;
				}
				let (rx, tx) = traffic.delta_for_window(1, chrono::Duration::days(1)).await;
				prop_assert!(rx >= 0);
				prop_assert!(tx >= 0);
				Ok(())
			})?;
		}

		#[test]
		fn retention_bounds_the_stored_history(extra in 0usize..30) {
			let rt = tokio::runtime::Runtime::new().unwrap();
			rt.block_on(async {
				let traffic = TrafficHistory::new(chrono::Duration::minutes(10));
				let now = Utc::now();
				let total = 11 + extra;
				for i in 0..total {
					let ts = now - chrono::Duration::minutes((total - 1 - i) as i64);
					traffic.record_at(1, i as i64, i as i64, ts).await;
				}
				// Samples older than ten minutes before the newest stamp are gone.
				let history = traffic.history_for_window(1, chrono::Duration::days(1)).await;
				prop_assert!(history.len() <= 11);
				Ok(())
			})?;
		}
	}
}
