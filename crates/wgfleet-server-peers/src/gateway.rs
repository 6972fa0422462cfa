// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Session-aware access to remote wg-easy instances.
//!
//! [`RemoteGateway`] pairs the stateless wire client with the session cache:
//! every operation resolves a valid cookie first, then issues exactly one
//! remote call. Peer updates are read-modify-write because wg-easy only
//! accepts full-object replacement; unknown keys in the fetched record are
//! preserved untouched.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::instrument;
use wgfleet_server_wgeasy::{format_expiry, RemotePeer, WgEasyApi};

use crate::error::{FleetError, Result};
use crate::sessions::SessionService;

#[derive(Clone)]
pub struct RemoteGateway {
	api: WgEasyApi,
	sessions: SessionService,
}

impl RemoteGateway {
	pub fn new(api: WgEasyApi, sessions: SessionService) -> Self {
		Self { api, sessions }
	}

	#[instrument(skip(self), fields(%server_id))]
	pub async fn list_peers(&self, server_id: i64) -> Result<Vec<RemotePeer>> {
		let session = self.sessions.ensure_session(server_id).await?;
		Ok(self.api.list_peers(&session).await?)
	}

	#[instrument(skip(self), fields(%server_id, %name))]
	pub async fn create_peer(
		&self,
		server_id: i64,
		name: &str,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<i64> {
		let session = self.sessions.ensure_session(server_id).await?;
		Ok(self.api.create_peer(&session, name, expires_at).await?)
	}

	/// Rewrites a peer's expiry, leaving the rest of the record as the
	/// remote reported it. The session is re-checked before the write in
	/// case the read consumed its last seconds of validity.
	#[instrument(skip(self), fields(%server_id, %peer_id))]
	pub async fn update_peer_expiry(
		&self,
		server_id: i64,
		peer_id: i64,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<()> {
		let session = self.sessions.ensure_session(server_id).await?;
		let mut detail = self.api.peer_detail(&session, peer_id).await?;

		let Some(record) = detail.as_object_mut() else {
			return Err(FleetError::RemoteProtocol(format!(
				"peer {peer_id} detail is not a JSON object"
			)));
		};
		let expiry = match expires_at {
			Some(ts) => Value::String(format_expiry(ts)),
			None => Value::Null,
		};
		record.insert("expiresAt".to_string(), expiry);

		let session = self.sessions.ensure_session(server_id).await?;
		self.api.replace_peer(&session, peer_id, &detail).await?;
		Ok(())
	}

	#[instrument(skip(self), fields(%server_id, %peer_id))]
	pub async fn enable_peer(&self, server_id: i64, peer_id: i64) -> Result<()> {
		let session = self.sessions.ensure_session(server_id).await?;
		Ok(self.api.enable_peer(&session, peer_id).await?)
	}

	#[instrument(skip(self), fields(%server_id, %peer_id))]
	pub async fn disable_peer(&self, server_id: i64, peer_id: i64) -> Result<()> {
		let session = self.sessions.ensure_session(server_id).await?;
		Ok(self.api.disable_peer(&session, peer_id).await?)
	}

	#[instrument(skip(self), fields(%server_id, %peer_id))]
	pub async fn delete_peer(&self, server_id: i64, peer_id: i64) -> Result<()> {
		let session = self.sessions.ensure_session(server_id).await?;
		Ok(self.api.delete_peer(&session, peer_id).await?)
	}

	#[instrument(skip(self), fields(%server_id, %peer_id))]
	pub async fn fetch_configuration(&self, server_id: i64, peer_id: i64) -> Result<Bytes> {
		let session = self.sessions.ensure_session(server_id).await?;
		Ok(self.api.fetch_configuration(&session, peer_id).await?)
	}

	#[instrument(skip(self), fields(%server_id, %peer_id))]
	pub async fn fetch_qrcode(&self, server_id: i64, peer_id: i64) -> Result<Bytes> {
		let session = self.sessions.ensure_session(server_id).await?;
		Ok(self.api.fetch_qrcode(&session, peer_id).await?)
	}
}
