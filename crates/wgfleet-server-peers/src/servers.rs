// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Remote server inventory.
//!
//! A [`ServerRecord`] is the full registry row including credentials and the
//! cached session pair. [`ServerInfo`] is the caller-facing view and never
//! carries the password or cookie.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;
use wgfleet_server_db::{RegistryRepository, ServerRowTuple};
use wgfleet_server_wgeasy::SecretString;

use crate::error::{FleetError, Result};
use crate::gateway::RemoteGateway;

/// A registered wg-easy server with credentials and cached session state.
#[derive(Debug, Clone)]
pub struct ServerRecord {
	pub id: i64,
	pub name: String,
	pub base_url: String,
	pub username: String,
	pub password: SecretString,
	pub session_cookie: Option<SecretString>,
	pub session_expires_at: Option<DateTime<Utc>>,
	pub last_status_ok: bool,
	pub last_checked_at: Option<DateTime<Utc>>,
	pub last_error: Option<String>,
}

impl TryFrom<ServerRowTuple> for ServerRecord {
	type Error = FleetError;

	fn try_from(row: ServerRowTuple) -> Result<Self> {
		let (
			id,
			name,
			base_url,
			username,
			password,
			session_cookie,
			session_expires_at,
			last_status_ok,
			last_checked_at,
			last_error,
		) = row;
		Ok(Self {
			id,
			name,
			base_url,
			username,
			password: SecretString::new(password),
			session_cookie: session_cookie.map(SecretString::new),
			session_expires_at: session_expires_at
				.as_deref()
				.map(parse_datetime)
				.transpose()?,
			last_status_ok,
			last_checked_at: last_checked_at.as_deref().map(parse_datetime).transpose()?,
			last_error,
		})
	}
}

impl ServerRecord {
	pub(crate) async fn load(repo: &RegistryRepository, server_id: i64) -> Result<Self> {
		let row = repo
			.get_server(server_id)
			.await?
			.ok_or_else(|| FleetError::NotFound(format!("server {server_id} not found")))?;
		Self::try_from(row)
	}

	pub(crate) async fn load_all(repo: &RegistryRepository) -> Result<Vec<Self>> {
		repo.list_servers()
			.await?
			.into_iter()
			.map(Self::try_from)
			.collect()
	}
}

/// Parses timestamps as stored by the registry. Session expiries are written
/// as RFC 3339; columns populated with SQLite's `datetime('now')` use the
/// space-separated form.
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(s)
		.map(|dt| dt.with_timezone(&Utc))
		.or_else(|_| {
			chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
				.map(|ndt| DateTime::from_naive_utc_and_offset(ndt, Utc))
		})
		.map_err(|e| FleetError::Internal(format!("invalid datetime {s:?}: {e}")))
}

/// Caller-facing server view. Credentials and the session cookie stay out.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
	pub id: i64,
	pub name: String,
	pub base_url: String,
	pub username: String,
	pub last_status_ok: bool,
	pub last_checked_at: Option<DateTime<Utc>>,
	pub last_error: Option<String>,
}

impl From<&ServerRecord> for ServerInfo {
	fn from(record: &ServerRecord) -> Self {
		Self {
			id: record.id,
			name: record.name.clone(),
			base_url: record.base_url.clone(),
			username: record.username.clone(),
			last_status_ok: record.last_status_ok,
			last_checked_at: record.last_checked_at,
			last_error: record.last_error.clone(),
		}
	}
}

/// Partial update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct ServerUpdate {
	pub name: Option<String>,
	pub base_url: Option<String>,
	pub username: Option<String>,
	pub password: Option<String>,
}

/// Result of a reachability probe against one server.
#[derive(Debug, Clone, Serialize)]
pub struct ServerHealth {
	pub ok: bool,
	pub peer_count: Option<usize>,
	pub error: Option<String>,
}

/// CRUD and health checks for the server inventory.
#[derive(Clone)]
pub struct ServerService {
	repo: RegistryRepository,
	gateway: RemoteGateway,
}

impl ServerService {
	pub fn new(repo: RegistryRepository, gateway: RemoteGateway) -> Self {
		Self { repo, gateway }
	}

	#[instrument(skip(self, password), fields(%name))]
	pub async fn create(
		&self,
		name: &str,
		base_url: &str,
		username: &str,
		password: &str,
	) -> Result<ServerInfo> {
		let id = self
			.repo
			.insert_server(name, base_url, username, password)
			.await?;
		let record = ServerRecord::load(&self.repo, id).await?;
		Ok(ServerInfo::from(&record))
	}

	#[instrument(skip(self))]
	pub async fn list(&self) -> Result<Vec<ServerInfo>> {
		let records = ServerRecord::load_all(&self.repo).await?;
		Ok(records.iter().map(ServerInfo::from).collect())
	}

	#[instrument(skip(self), fields(%server_id))]
	pub async fn get(&self, server_id: i64) -> Result<ServerInfo> {
		let record = ServerRecord::load(&self.repo, server_id).await?;
		Ok(ServerInfo::from(&record))
	}

	#[instrument(skip(self, update), fields(%server_id))]
	pub async fn update(&self, server_id: i64, update: ServerUpdate) -> Result<ServerInfo> {
		let affected = self
			.repo
			.update_server(
				server_id,
				update.name.as_deref(),
				update.base_url.as_deref(),
				update.username.as_deref(),
				update.password.as_deref(),
			)
			.await?;
		if affected == 0 {
			return Err(FleetError::NotFound(format!("server {server_id} not found")));
		}
		self.get(server_id).await
	}

	/// Removes a server and every binding that pointed at it. Peers on the
	/// remote itself are left alone.
	#[instrument(skip(self), fields(%server_id))]
	pub async fn delete(&self, server_id: i64) -> Result<()> {
		self.repo.delete_bindings_for_server(server_id).await?;
		let affected = self.repo.delete_server(server_id).await?;
		if affected == 0 {
			return Err(FleetError::NotFound(format!("server {server_id} not found")));
		}
		Ok(())
	}

	/// Probes the remote by listing its peers, recording the outcome on the
	/// server row. Probe failures come back as `ok: false` rather than an
	/// error; only an unknown id is an error.
	#[instrument(skip(self), fields(%server_id))]
	pub async fn check(&self, server_id: i64) -> Result<ServerHealth> {
		let record = ServerRecord::load(&self.repo, server_id).await?;
		match self.gateway.list_peers(record.id).await {
			Ok(peers) => {
				self.repo.mark_server_healthy(record.id).await?;
				Ok(ServerHealth {
					ok: true,
					peer_count: Some(peers.len()),
					error: None,
				})
			}
			Err(FleetError::NotFound(msg)) => Err(FleetError::NotFound(msg)),
			Err(err) => {
				let message = err.to_string();
				self.repo.mark_server_unhealthy(record.id, &message).await?;
				Ok(ServerHealth {
					ok: false,
					peer_count: None,
					error: Some(message),
				})
			}
		}
	}
}
