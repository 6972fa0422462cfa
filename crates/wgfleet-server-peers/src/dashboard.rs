// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Fleet-wide dashboard aggregation.
//!
//! The overview walks every registered server, lists its peers, and folds
//! the results two ways: per server (totals, activity, traffic window) and
//! per logical user (across servers, via the binding table). A server that
//! cannot be reached contributes an `ok: false` entry and nothing else; it
//! never takes the rest of the dashboard down with it.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{instrument, warn};
use wgfleet_server_db::RegistryRepository;

use crate::error::{FleetError, Result};
use crate::gateway::RemoteGateway;
use crate::traffic::{TrafficHistory, TrafficSample};

pub const DEFAULT_PERIOD_SECS: u64 = 86_400;

/// Maps a period label onto seconds. Unknown labels fall back to a day.
pub fn parse_period(period: &str) -> u64 {
	match period {
		"1h" => 3_600,
		"24h" => 86_400,
		"7d" => 604_800,
		_ => DEFAULT_PERIOD_SECS,
	}
}

/// One server's slice of the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ServerOverview {
	pub server_id: i64,
	pub server_name: String,
	pub ok: bool,
	pub error: Option<String>,
	pub total_peers: usize,
	pub active_peers: usize,
	pub total_rx: i64,
	pub total_tx: i64,
	pub period_rx: i64,
	pub period_tx: i64,
	pub history: Vec<TrafficSample>,
}

/// One user's usage across every server they are bound on.
#[derive(Debug, Clone, Serialize)]
pub struct UserUsage {
	pub user_id: i64,
	pub user_name: String,
	pub peers_count: usize,
	pub active_peers: usize,
	pub servers_count: usize,
	pub total_rx: i64,
	pub total_tx: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardOverview {
	pub period_secs: u64,
	pub servers: Vec<ServerOverview>,
	pub users: Vec<UserUsage>,
}

/// Headline numbers for a single server.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSummary {
	pub server_id: i64,
	pub total_peers: usize,
	pub peers_with_traffic: usize,
	pub total_rx: i64,
	pub total_tx: i64,
}

struct UsageAccumulator {
	user_name: String,
	peers_count: usize,
	active_peers: usize,
	servers: HashSet<i64>,
	total_rx: i64,
	total_tx: i64,
}

impl UsageAccumulator {
	fn new(user_name: String) -> Self {
		Self {
			user_name,
			peers_count: 0,
			active_peers: 0,
			servers: HashSet::new(),
			total_rx: 0,
			total_tx: 0,
		}
	}
}

#[derive(Clone)]
pub struct DashboardService {
	repo: RegistryRepository,
	gateway: RemoteGateway,
	traffic: TrafficHistory,
}

impl DashboardService {
	pub fn new(repo: RegistryRepository, gateway: RemoteGateway, traffic: TrafficHistory) -> Self {
		Self {
			repo,
			gateway,
			traffic,
		}
	}

	/// Builds the full dashboard for a period label such as `"24h"`.
	///
	/// Listing a server's peers also feeds the traffic history, so rendering
	/// the dashboard is what keeps period deltas meaningful over time.
	#[instrument(skip(self), fields(%period))]
	pub async fn overview(&self, period: &str) -> Result<DashboardOverview> {
		let period_secs = parse_period(period);
		let window = chrono::Duration::seconds(period_secs as i64);

		let servers = self.repo.list_servers().await?;
		let user_names: HashMap<i64, String> = self
			.repo
			.list_users()
			.await?
			.into_iter()
			.map(|row| (row.0, row.1))
			.collect();

		let mut stats: HashMap<i64, UsageAccumulator> = HashMap::new();
		let mut overviews = Vec::with_capacity(servers.len());

		for row in servers {
			let (server_id, server_name) = (row.0, row.1);
			let peers = match self.gateway.list_peers(server_id).await {
				Ok(peers) => peers,
				Err(err @ FleetError::Database(_)) => return Err(err),
				Err(err) => {
					warn!(%server_id, error = %err, "dashboard skipping unreachable server");
					overviews.push(ServerOverview {
						server_id,
						server_name,
						ok: false,
						error: Some(err.to_string()),
						total_peers: 0,
						active_peers: 0,
						total_rx: 0,
						total_tx: 0,
						period_rx: 0,
						period_tx: 0,
						history: Vec::new(),
					});
					continue;
				}
			};

			let total_rx: i64 = peers.iter().map(|p| p.transfer_rx).sum();
			let total_tx: i64 = peers.iter().map(|p| p.transfer_tx).sum();
			let active_peers = peers.iter().filter(|p| p.is_active).count();

			self.traffic.record_snapshot(server_id, total_rx, total_tx).await;
			let (period_rx, period_tx) = self.traffic.delta_for_window(server_id, window).await;
			let history = self.traffic.history_for_window(server_id, window).await;

			let owners: HashMap<i64, i64> = self
				.repo
				.list_bindings_for_server(server_id)
				.await?
				.into_iter()
				.map(|b| (b.3, b.1))
				.collect();

			for peer in &peers {
				let Some(&user_id) = owners.get(&peer.id) else {
					continue;
				};
				// Bindings to users that were deleted out from under them
				// do not count towards anyone.
				let Some(name) = user_names.get(&user_id) else {
					continue;
				};
				let entry = stats
					.entry(user_id)
					.or_insert_with(|| UsageAccumulator::new(name.clone()));
				entry.peers_count += 1;
				entry.servers.insert(server_id);
				entry.total_rx += peer.transfer_rx;
				entry.total_tx += peer.transfer_tx;
				if peer.is_active {
					entry.active_peers += 1;
				}
			}

			overviews.push(ServerOverview {
				server_id,
				server_name,
				ok: true,
				error: None,
				total_peers: peers.len(),
				active_peers,
				total_rx,
				total_tx,
				period_rx,
				period_tx,
				history,
			});
		}

		let mut users: Vec<UserUsage> = stats
			.into_iter()
			.map(|(user_id, acc)| UserUsage {
				user_id,
				user_name: acc.user_name,
				peers_count: acc.peers_count,
				active_peers: acc.active_peers,
				servers_count: acc.servers.len(),
				total_rx: acc.total_rx,
				total_tx: acc.total_tx,
			})
			.collect();
		users.sort_by_key(|u| u.user_id);

		Ok(DashboardOverview {
			period_secs,
			servers: overviews,
			users,
		})
	}

	/// Headline numbers for one server. Unlike the dashboard's activity
	/// count this one is handshake-agnostic: any peer that ever moved a
	/// byte counts.
	#[instrument(skip(self), fields(%server_id))]
	pub async fn server_summary(&self, server_id: i64) -> Result<ServerSummary> {
		let peers = self.gateway.list_peers(server_id).await?;

		let total_rx: i64 = peers.iter().map(|p| p.transfer_rx).sum();
		let total_tx: i64 = peers.iter().map(|p| p.transfer_tx).sum();
		let peers_with_traffic = peers
			.iter()
			.filter(|p| p.transfer_rx > 0 || p.transfer_tx > 0)
			.count();

		Ok(ServerSummary {
			server_id,
			total_peers: peers.len(),
			peers_with_traffic,
			total_rx,
			total_tx,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::FleetConfig;
	use crate::sessions::SessionService;
	use chrono::Utc;
	use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
	use std::str::FromStr;
	use wgfleet_server_db::ensure_schema;
	use wgfleet_server_wgeasy::WgEasyApi;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	async fn make_repo() -> RegistryRepository {
		let options = SqliteConnectOptions::from_str(":memory:")
			.unwrap()
			.create_if_missing(true);

		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.connect_with(options)
			.await
			.expect("Failed to create test pool");

		ensure_schema(&pool).await.unwrap();
		RegistryRepository::new(pool)
	}

	fn make_service(repo: &RegistryRepository) -> DashboardService {
		let config = FleetConfig::default();
		let api = WgEasyApi::new(config.request_timeout());
		let sessions = SessionService::new(repo.clone(), api.clone(), config.clone());
		let gateway = RemoteGateway::new(api, sessions);
		let traffic = TrafficHistory::new(config.history_retention());
		DashboardService::new(repo.clone(), gateway, traffic)
	}

	async fn seed_server_with_session(repo: &RegistryRepository, name: &str, base_url: &str) -> i64 {
		let id = repo
			.insert_server(name, base_url, "admin", "hunter2")
			.await
			.unwrap();
		let expires = Utc::now() + chrono::Duration::hours(1);
		repo.update_server_session(id, "cached-cookie", &expires.to_rfc3339())
			.await
			.unwrap();
		id
	}

	#[test]
	fn period_labels_map_to_seconds() {
		assert_eq!(parse_period("1h"), 3_600);
		assert_eq!(parse_period("24h"), 86_400);
		assert_eq!(parse_period("7d"), 604_800);
		assert_eq!(parse_period("fortnight"), DEFAULT_PERIOD_SECS);
	}

	#[tokio::test]
	async fn overview_isolates_an_unreachable_server() {
		let healthy = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/api/client"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
				{
					"id": 1,
					"name": "alice",
					"transferRx": 100,
					"transferTx": 40,
					"latestHandshakeAt": "2026-08-21T10:00:00.000Z"
				},
				{"id": 2, "name": "stray", "transferRx": 5, "transferTx": 5}
			])))
			.mount(&healthy)
			.await;

		let broken = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/session"))
			.respond_with(ResponseTemplate::new(503))
			.mount(&broken)
			.await;

		let repo = make_repo().await;
		let healthy_id = seed_server_with_session(&repo, "berlin-1", &healthy.uri()).await;
		let broken_id = repo
			.insert_server("oslo-2", &broken.uri(), "admin", "hunter2")
			.await
			.unwrap();
		let user_id = repo.insert_user("alice", None).await.unwrap();
		repo.insert_binding(user_id, healthy_id, 1, "alice", None)
			.await
			.unwrap();

		let service = make_service(&repo);
		let overview = service.overview("24h").await.unwrap();
		assert_eq!(overview.period_secs, 86_400);
		assert_eq!(overview.servers.len(), 2);

		let good = &overview.servers[0];
		assert_eq!(good.server_id, healthy_id);
		assert!(good.ok);
		assert_eq!(good.total_peers, 2);
		assert_eq!(good.active_peers, 1);
		assert_eq!(good.total_rx, 105);
		assert_eq!(good.total_tx, 45);
		assert_eq!(good.history.len(), 1);

		let bad = &overview.servers[1];
		assert_eq!(bad.server_id, broken_id);
		assert!(!bad.ok);
		assert!(bad.error.as_deref().unwrap().contains("Login failed"));
		assert!(bad.history.is_empty());

		// Only the bound peer counts towards a user; the stray one is
		// nobody's.
		assert_eq!(overview.users.len(), 1);
		let usage = &overview.users[0];
		assert_eq!(usage.user_id, user_id);
		assert_eq!(usage.user_name, "alice");
		assert_eq!(usage.peers_count, 1);
		assert_eq!(usage.active_peers, 1);
		assert_eq!(usage.servers_count, 1);
		assert_eq!(usage.total_rx, 100);
		assert_eq!(usage.total_tx, 40);
	}

	#[tokio::test]
	async fn overview_ignores_bindings_to_deleted_users() {
		let mock = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/api/client"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
				{"id": 1, "name": "ghost", "transferRx": 9, "transferTx": 9}
			])))
			.mount(&mock)
			.await;

		let repo = make_repo().await;
		let server_id = seed_server_with_session(&repo, "berlin-1", &mock.uri()).await;
		let user_id = repo.insert_user("ghost", None).await.unwrap();
		repo.insert_binding(user_id, server_id, 1, "ghost", None)
			.await
			.unwrap();
		repo.delete_user(user_id).await.unwrap();

		let service = make_service(&repo);
		let overview = service.overview("1h").await.unwrap();
		assert!(overview.users.is_empty());
	}

	#[tokio::test]
	async fn repeated_overviews_accumulate_history() {
		let mock = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/api/client"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
				{"id": 1, "name": "alice", "transferRx": 50, "transferTx": 20}
			])))
			.mount(&mock)
			.await;

		let repo = make_repo().await;
		seed_server_with_session(&repo, "berlin-1", &mock.uri()).await;

		let service = make_service(&repo);
		service.overview("24h").await.unwrap();
		let second = service.overview("24h").await.unwrap();

		assert_eq!(second.servers[0].history.len(), 2);
		// Counters did not move between renders.
		assert_eq!(second.servers[0].period_rx, 0);
		assert_eq!(second.servers[0].period_tx, 0);
	}

	#[tokio::test]
	async fn server_summary_counts_peers_that_moved_bytes() {
		let mock = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/api/client"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
				{"id": 1, "name": "a", "transferRx": 10, "transferTx": 0},
				{"id": 2, "name": "b", "transferRx": 0, "transferTx": 0},
				{"id": 3, "name": "c", "transferRx": 0, "transferTx": 7}
			])))
			.mount(&mock)
			.await;

		let repo = make_repo().await;
		let server_id = seed_server_with_session(&repo, "berlin-1", &mock.uri()).await;

		let service = make_service(&repo);
		let summary = service.server_summary(server_id).await.unwrap();
		assert_eq!(summary.server_id, server_id);
		assert_eq!(summary.total_peers, 3);
		assert_eq!(summary.peers_with_traffic, 2);
		assert_eq!(summary.total_rx, 10);
		assert_eq!(summary.total_tx, 7);
	}

	#[tokio::test]
	async fn server_summary_for_an_unknown_server_is_not_found() {
		let repo = make_repo().await;
		let service = make_service(&repo);

		let result = service.server_summary(404).await;
		assert!(matches!(result, Err(FleetError::NotFound(_))));
	}
}
