// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Logical users and their peer bindings.
//!
//! A logical user is a person; each binding ties that person to exactly one
//! peer on one server. The views here join the local registry with live
//! remote state (enabled flags, tunnel configurations) without persisting
//! any of it.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{instrument, warn};
use wgfleet_server_db::{BindingRowTuple, RegistryRepository, UserRowTuple};

use crate::error::{FleetError, Result};
use crate::gateway::RemoteGateway;
use crate::servers::{parse_datetime, ServerRecord};

#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
	pub id: i64,
	pub name: String,
	pub note: Option<String>,
	pub created_at: DateTime<Utc>,
}

impl TryFrom<UserRowTuple> for UserInfo {
	type Error = FleetError;

	fn try_from(row: UserRowTuple) -> Result<Self> {
		let (id, name, note, created_at) = row;
		Ok(Self {
			id,
			name,
			note,
			created_at: parse_datetime(&created_at)?,
		})
	}
}

/// One user-to-peer binding as stored in the registry.
#[derive(Debug, Clone, Serialize)]
pub struct BindingInfo {
	pub id: i64,
	pub user_id: i64,
	pub server_id: i64,
	pub peer_id: i64,
	pub peer_name: String,
	pub expires_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
}

impl TryFrom<BindingRowTuple> for BindingInfo {
	type Error = FleetError;

	fn try_from(row: BindingRowTuple) -> Result<Self> {
		let (id, user_id, server_id, peer_id, peer_name, expires_at, created_at) = row;
		Ok(Self {
			id,
			user_id,
			server_id,
			peer_id,
			peer_name,
			expires_at: expires_at.as_deref().map(parse_datetime).transpose()?,
			created_at: parse_datetime(&created_at)?,
		})
	}
}

/// A binding plus the peer's live enabled flag. `enabled` is `None` when the
/// remote could not be asked or no longer knows the peer.
#[derive(Debug, Clone, Serialize)]
pub struct BindingStatus {
	#[serde(flatten)]
	pub binding: BindingInfo,
	pub enabled: Option<bool>,
}

/// Pointer to a QR code that can be fetched for one binding.
#[derive(Debug, Clone, Serialize)]
pub struct QrCodeRef {
	pub server_id: i64,
	pub server_name: String,
	pub peer_id: i64,
}

/// A downloadable tunnel configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
	pub filename: String,
	pub content: Bytes,
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleFailure {
	pub server_id: i64,
	pub peer_id: i64,
	pub error: String,
}

/// Every configuration that could be fetched for a user, plus one entry per
/// binding that failed. A partial fleet outage degrades the bundle instead
/// of aborting it.
#[derive(Debug, Clone)]
pub struct ConfigBundle {
	pub files: Vec<ConfigFile>,
	pub errors: Vec<BundleFailure>,
}

/// Filenames embed user and server names; spaces and hyphens both become
/// underscores so the result is safe as a WireGuard interface name.
fn normalize_component(name: &str) -> String {
	name.replace(' ', "_").replace('-', "_")
}

#[derive(Clone)]
pub struct UserService {
	repo: RegistryRepository,
	gateway: RemoteGateway,
}

impl UserService {
	pub fn new(repo: RegistryRepository, gateway: RemoteGateway) -> Self {
		Self { repo, gateway }
	}

	#[instrument(skip(self), fields(%name))]
	pub async fn create(&self, name: &str, note: Option<&str>) -> Result<UserInfo> {
		let id = self.repo.insert_user(name, note).await?;
		let row = self
			.repo
			.get_user(id)
			.await?
			.ok_or_else(|| FleetError::Internal(format!("user {id} vanished after insert")))?;
		UserInfo::try_from(row)
	}

	#[instrument(skip(self))]
	pub async fn list(&self) -> Result<Vec<UserInfo>> {
		self.repo
			.list_users()
			.await?
			.into_iter()
			.map(UserInfo::try_from)
			.collect()
	}

	#[instrument(skip(self), fields(%user_id))]
	pub async fn get(&self, user_id: i64) -> Result<UserInfo> {
		let row = self.require_user(user_id).await?;
		UserInfo::try_from(row)
	}

	/// Bindings for a user, oldest first. An unknown user simply has none.
	#[instrument(skip(self), fields(%user_id))]
	pub async fn bindings(&self, user_id: i64) -> Result<Vec<BindingInfo>> {
		self.repo
			.list_bindings_for_user(user_id)
			.await?
			.into_iter()
			.map(BindingInfo::try_from)
			.collect()
	}

	/// Bindings decorated with each peer's live enabled flag. Each distinct
	/// server is asked once; an unreachable server leaves its bindings'
	/// flags unknown rather than failing the whole listing.
	#[instrument(skip(self), fields(%user_id))]
	pub async fn bindings_with_status(&self, user_id: i64) -> Result<Vec<BindingStatus>> {
		let rows = self.repo.list_bindings_for_user(user_id).await?;
		if rows.is_empty() {
			return Ok(Vec::new());
		}

		let mut enabled_maps: HashMap<i64, HashMap<i64, bool>> = HashMap::new();
		for row in &rows {
			let server_id = row.2;
			if enabled_maps.contains_key(&server_id) {
				continue;
			}
			let map = match self.gateway.list_peers(server_id).await {
				Ok(peers) => peers
					.into_iter()
					.map(|p| (p.id, p.enabled.unwrap_or(false)))
					.collect(),
				Err(err @ FleetError::Database(_)) => return Err(err),
				Err(err) => {
					warn!(%server_id, error = %err, "peer status fetch failed");
					HashMap::new()
				}
			};
			enabled_maps.insert(server_id, map);
		}

		rows.into_iter()
			.map(|row| {
				let enabled = enabled_maps
					.get(&row.2)
					.and_then(|peers| peers.get(&row.3))
					.copied();
				Ok(BindingStatus {
					binding: BindingInfo::try_from(row)?,
					enabled,
				})
			})
			.collect()
	}

	/// QR code pointers for every binding whose server still exists.
	#[instrument(skip(self), fields(%user_id))]
	pub async fn qrcode_refs(&self, user_id: i64) -> Result<Vec<QrCodeRef>> {
		self.require_user(user_id).await?;
		let bindings = self.repo.list_bindings_for_user(user_id).await?;
		let servers = self.server_names().await?;

		let mut refs = Vec::new();
		for row in bindings {
			let (_, _, server_id, peer_id, ..) = row;
			let Some(server_name) = servers.get(&server_id) else {
				continue;
			};
			refs.push(QrCodeRef {
				server_id,
				server_name: server_name.clone(),
				peer_id,
			});
		}
		Ok(refs)
	}

	/// Fetches one peer's tunnel configuration. The filename is derived from
	/// the binding's user when one exists, otherwise from the raw peer id.
	#[instrument(skip(self), fields(%server_id, %peer_id))]
	pub async fn config_file(&self, server_id: i64, peer_id: i64) -> Result<ConfigFile> {
		let server = ServerRecord::load(&self.repo, server_id).await?;
		let binding = self.repo.get_binding_by_server_peer(server_id, peer_id).await?;

		let server_part = normalize_component(&server.name);
		let filename = match &binding {
			Some(row) => {
				let user_name = self
					.repo
					.get_user(row.1)
					.await?
					.map(|u| u.1)
					.unwrap_or_else(|| "unknown".to_string());
				format!("{}_{server_part}.conf", normalize_component(&user_name))
			}
			None => format!("client-{peer_id}_{server_part}.conf"),
		};

		let content = self.gateway.fetch_configuration(server_id, peer_id).await?;
		Ok(ConfigFile { filename, content })
	}

	/// Fetches the configuration for every binding the user has. Bindings
	/// whose fetch fails are reported, not fatal. A user with no bindings
	/// has nothing to bundle and that is an error.
	#[instrument(skip(self), fields(%user_id))]
	pub async fn config_bundle(&self, user_id: i64) -> Result<ConfigBundle> {
		let (_, user_name, _, _) = self.require_user(user_id).await?;
		let bindings = self.repo.list_bindings_for_user(user_id).await?;
		if bindings.is_empty() {
			return Err(FleetError::NotFound(format!("user {user_id} has no peers")));
		}

		let servers = self.server_names().await?;
		let user_part = normalize_component(&user_name);

		let mut files = Vec::new();
		let mut errors = Vec::new();
		for row in bindings {
			let (_, _, server_id, peer_id, ..) = row;
			let Some(server_name) = servers.get(&server_id) else {
				errors.push(BundleFailure {
					server_id,
					peer_id,
					error: format!("server {server_id} not found"),
				});
				continue;
			};
			match self.gateway.fetch_configuration(server_id, peer_id).await {
				Ok(content) => files.push(ConfigFile {
					filename: format!("{user_part}_{}.conf", normalize_component(server_name)),
					content,
				}),
				Err(err @ FleetError::Database(_)) => return Err(err),
				Err(err) => errors.push(BundleFailure {
					server_id,
					peer_id,
					error: err.to_string(),
				}),
			}
		}
		Ok(ConfigBundle { files, errors })
	}

	async fn require_user(&self, user_id: i64) -> Result<UserRowTuple> {
		self.repo
			.get_user(user_id)
			.await?
			.ok_or_else(|| FleetError::NotFound(format!("user {user_id} not found")))
	}

	async fn server_names(&self) -> Result<HashMap<i64, String>> {
		Ok(self
			.repo
			.list_servers()
			.await?
			.into_iter()
			.map(|row| (row.0, row.1))
			.collect())
	}
}
