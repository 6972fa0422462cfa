// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Peer provisioning and reconciliation.
//!
//! Operations here change both sides: a peer on a remote wg-easy instance
//! and the binding row that ties it to a logical user. The ordering rule is
//! remote first, registry second, so a failed remote call never leaves a
//! binding that points at nothing. The inverse (a remote peer without a
//! binding) is tolerated and can be adopted later via [`SyncService::import`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{instrument, warn};
use wgfleet_server_db::{RegistryRepository, UserRowTuple};
use wgfleet_server_wgeasy::format_expiry;

use crate::error::{FleetError, Result};
use crate::gateway::RemoteGateway;
use crate::users::BindingInfo;

/// Result of attaching a user to every registered server.
#[derive(Debug, Clone, Serialize)]
pub struct MassAttachOutcome {
	pub created: usize,
	pub skipped: usize,
	pub errors: Vec<MassAttachFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MassAttachFailure {
	pub server_id: i64,
	pub server_name: String,
	pub error: String,
}

/// Result of adopting the peers already present on one server.
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
	pub created_users: usize,
	pub created_bindings: usize,
	pub total_peers: usize,
}

#[derive(Clone)]
pub struct SyncService {
	repo: RegistryRepository,
	gateway: RemoteGateway,
}

impl SyncService {
	pub fn new(repo: RegistryRepository, gateway: RemoteGateway) -> Self {
		Self { repo, gateway }
	}

	/// Creates a peer named after the user on one server and records the
	/// binding. The peer is created remotely before anything is written
	/// locally.
	#[instrument(skip(self), fields(%user_id, %server_id))]
	pub async fn attach(
		&self,
		user_id: i64,
		server_id: i64,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<BindingInfo> {
		let (_, user_name, _, _) = self.require_user(user_id).await?;
		let peer_id = self
			.gateway
			.create_peer(server_id, &user_name, expires_at)
			.await?;

		let expiry = expires_at.map(format_expiry);
		let binding_id = self
			.repo
			.insert_binding(user_id, server_id, peer_id, &user_name, expiry.as_deref())
			.await?;

		Ok(BindingInfo {
			id: binding_id,
			user_id,
			server_id,
			peer_id,
			peer_name: user_name,
			expires_at,
			created_at: Utc::now(),
		})
	}

	/// Attaches a user to every server they are not yet on. Servers that
	/// already carry a binding are skipped; per-server remote failures are
	/// collected instead of aborting the sweep.
	#[instrument(skip(self), fields(%user_id))]
	pub async fn mass_attach(
		&self,
		user_id: i64,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<MassAttachOutcome> {
		let (_, user_name, _, _) = self.require_user(user_id).await?;
		let servers = self.repo.list_servers().await?;
		let expiry = expires_at.map(format_expiry);

		let mut outcome = MassAttachOutcome {
			created: 0,
			skipped: 0,
			errors: Vec::new(),
		};
		for row in servers {
			let (server_id, server_name) = (row.0, row.1);
			if self
				.repo
				.get_binding_by_user_server(user_id, server_id)
				.await?
				.is_some()
			{
				outcome.skipped += 1;
				continue;
			}
			match self
				.gateway
				.create_peer(server_id, &user_name, expires_at)
				.await
			{
				Ok(peer_id) => {
					self.repo
						.insert_binding(user_id, server_id, peer_id, &user_name, expiry.as_deref())
						.await?;
					outcome.created += 1;
				}
				Err(err @ FleetError::Database(_)) => return Err(err),
				Err(err) => {
					warn!(%server_id, error = %err, "mass attach failed on one server");
					outcome.errors.push(MassAttachFailure {
						server_id,
						server_name,
						error: err.to_string(),
					});
				}
			}
		}
		Ok(outcome)
	}

	/// Adopts peers that already exist on a server: each unbound peer gets a
	/// new logical user named after it plus a binding. Peers that are
	/// already bound are left untouched, so re-running is harmless.
	#[instrument(skip(self), fields(%server_id))]
	pub async fn import(&self, server_id: i64) -> Result<ImportOutcome> {
		let peers = self.gateway.list_peers(server_id).await?;
		let total_peers = peers.len();

		let mut created_users = 0;
		let mut created_bindings = 0;
		for peer in peers {
			if self
				.repo
				.get_binding_by_server_peer(server_id, peer.id)
				.await?
				.is_some()
			{
				continue;
			}

			let user_id = self.repo.insert_user(&peer.name, None).await?;
			created_users += 1;

			let expiry = peer.expires_at.map(format_expiry);
			self.repo
				.insert_binding(user_id, server_id, peer.id, &peer.name, expiry.as_deref())
				.await?;
			created_bindings += 1;
		}

		Ok(ImportOutcome {
			created_users,
			created_bindings,
			total_peers,
		})
	}

	/// Rewrites a peer's expiry on the remote, then mirrors it onto the
	/// binding when one exists. An unbound peer is still updated remotely.
	#[instrument(skip(self), fields(%server_id, %peer_id))]
	pub async fn update_expiry(
		&self,
		server_id: i64,
		peer_id: i64,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<()> {
		self.gateway
			.update_peer_expiry(server_id, peer_id, expires_at)
			.await?;

		let expiry = expires_at.map(format_expiry);
		self.repo
			.update_binding_expiry(server_id, peer_id, expiry.as_deref())
			.await?;
		Ok(())
	}

	#[instrument(skip(self), fields(%server_id, %peer_id))]
	pub async fn enable_peer(&self, server_id: i64, peer_id: i64) -> Result<()> {
		self.gateway.enable_peer(server_id, peer_id).await
	}

	#[instrument(skip(self), fields(%server_id, %peer_id))]
	pub async fn disable_peer(&self, server_id: i64, peer_id: i64) -> Result<()> {
		self.gateway.disable_peer(server_id, peer_id).await
	}

	/// Deletes a peer from its remote, then drops any bindings that pointed
	/// at it. If the remote refuses, the bindings stay.
	#[instrument(skip(self), fields(%server_id, %peer_id))]
	pub async fn remove_peer(&self, server_id: i64, peer_id: i64) -> Result<()> {
		self.gateway.delete_peer(server_id, peer_id).await?;
		self.repo.delete_bindings_for_peer(server_id, peer_id).await?;
		Ok(())
	}

	/// Removes a user everywhere: best-effort peer deletion on each bound
	/// server, then the bindings and the user row. Remote failures are
	/// logged and skipped so one dead server cannot make a user
	/// undeletable.
	#[instrument(skip(self), fields(%user_id))]
	pub async fn delete_user(&self, user_id: i64) -> Result<()> {
		self.require_user(user_id).await?;

		let bindings = self.repo.list_bindings_for_user(user_id).await?;
		for row in &bindings {
			let (_, _, server_id, peer_id, ..) = *row;
			match self.gateway.delete_peer(server_id, peer_id).await {
				Ok(()) => {}
				Err(err @ FleetError::Database(_)) => return Err(err),
				Err(err) => {
					warn!(%server_id, %peer_id, error = %err, "peer removal failed during user delete");
				}
			}
		}

		self.repo.delete_bindings_for_user(user_id).await?;
		self.repo.delete_user(user_id).await?;
		Ok(())
	}

	async fn require_user(&self, user_id: i64) -> Result<UserRowTuple> {
		self.repo
			.get_user(user_id)
			.await?
			.ok_or_else(|| FleetError::NotFound(format!("user {user_id} not found")))
	}
}
