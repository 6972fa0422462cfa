// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! # wgfleet-server-peers
//!
//! Fleet orchestration over a set of wg-easy servers: server inventory and
//! health, cached remote sessions, logical users with their peer bindings,
//! peer provisioning and import, and the aggregated dashboard. The local
//! registry is the source of truth for who owns a peer; the remotes are the
//! source of truth for the peers themselves.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod gateway;
pub mod servers;
pub mod sessions;
pub mod sync;
pub mod traffic;
pub mod users;

pub use config::{ConfigError, FleetConfig};
pub use dashboard::{
	parse_period, DashboardOverview, DashboardService, ServerOverview, ServerSummary, UserUsage,
};
pub use error::{FleetError, Result};
pub use gateway::RemoteGateway;
pub use servers::{ServerHealth, ServerInfo, ServerRecord, ServerService, ServerUpdate};
pub use sessions::SessionService;
pub use sync::{ImportOutcome, MassAttachFailure, MassAttachOutcome, SyncService};
pub use traffic::{TrafficHistory, TrafficSample};
pub use users::{
	BindingInfo, BindingStatus, BundleFailure, ConfigBundle, ConfigFile, QrCodeRef, UserInfo,
	UserService,
};

use sqlx::SqlitePool;
use std::sync::Arc;
use wgfleet_server_db::RegistryRepository;
use wgfleet_server_wgeasy::WgEasyApi;

#[derive(Clone)]
pub struct FleetServices {
	pub server_service: ServerService,
	pub user_service: UserService,
	pub sync_service: SyncService,
	pub session_service: SessionService,
	pub dashboard_service: DashboardService,
	pub gateway: RemoteGateway,
	pub traffic: TrafficHistory,
	pub config: Arc<FleetConfig>,
}

impl FleetServices {
	pub fn new(db: SqlitePool, config: FleetConfig) -> Self {
		let config = Arc::new(config);
		let repo = RegistryRepository::new(db);
		let api = WgEasyApi::new(config.request_timeout());
		let session_service = SessionService::new(repo.clone(), api.clone(), (*config).clone());
		let gateway = RemoteGateway::new(api, session_service.clone());
		let traffic = TrafficHistory::new(config.history_retention());

		let server_service = ServerService::new(repo.clone(), gateway.clone());
		let user_service = UserService::new(repo.clone(), gateway.clone());
		let sync_service = SyncService::new(repo.clone(), gateway.clone());
		let dashboard_service =
			DashboardService::new(repo, gateway.clone(), traffic.clone());

		Self {
			server_service,
			user_service,
			sync_service,
			session_service,
			dashboard_service,
			gateway,
			traffic,
			config,
		}
	}
}
