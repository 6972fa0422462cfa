// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Wire types for the wg-easy REST API.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WgEasyError;
use crate::secret::SecretString;

/// An authenticated handle on one remote appliance: where it lives and which
/// session cookie to present.
#[derive(Debug, Clone)]
pub struct RemoteSession {
	pub base_url: String,
	pub cookie: SecretString,
}

/// A peer registration as reported by a remote appliance.
#[derive(Debug, Clone, Serialize)]
pub struct RemotePeer {
	pub id: i64,
	pub name: String,
	/// `None` means the peer never expires.
	pub expires_at: Option<DateTime<Utc>>,
	pub transfer_rx: i64,
	pub transfer_tx: i64,
	/// `None` when the appliance did not report the flag.
	pub enabled: Option<bool>,
	/// Whether the peer has ever completed a handshake. Presence of a
	/// last-handshake timestamp is what counts, not its recency.
	pub is_active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RemotePeerWire {
	pub id: i64,
	pub name: String,
	#[serde(default)]
	pub enabled: Option<bool>,
	#[serde(default)]
	pub expires_at: Option<String>,
	#[serde(default)]
	pub latest_handshake_at: Option<String>,
	// counters can arrive as fractional JSON numbers
	#[serde(default)]
	pub transfer_rx: Option<f64>,
	#[serde(default)]
	pub transfer_tx: Option<f64>,
}

impl TryFrom<RemotePeerWire> for RemotePeer {
	type Error = WgEasyError;

	fn try_from(wire: RemotePeerWire) -> Result<Self, WgEasyError> {
		let expires_at = match wire.expires_at.as_deref() {
			None | Some("") => None,
			Some(raw) => Some(parse_expiry(raw)?),
		};

		let is_active = wire
			.latest_handshake_at
			.as_deref()
			.is_some_and(|handshake| !handshake.is_empty());

		Ok(RemotePeer {
			id: wire.id,
			name: wire.name,
			expires_at,
			transfer_rx: wire.transfer_rx.unwrap_or(0.0) as i64,
			transfer_tx: wire.transfer_tx.unwrap_or(0.0) as i64,
			enabled: wire.enabled,
			is_active,
		})
	}
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
	pub username: &'a str,
	pub password: &'a str,
	pub remember: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatePeerRequest<'a> {
	pub name: &'a str,
	// wg-easy requires the field to be present; null means no expiry
	pub expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatePeerResponse {
	#[serde(default)]
	pub success: bool,
	#[serde(default)]
	pub client_id: Option<i64>,
}

/// Format an expiry for the wire: ISO-8601 with millisecond precision and a
/// literal `Z` suffix, e.g. `2025-12-10T00:00:00.000Z`.
pub fn format_expiry(expires_at: DateTime<Utc>) -> String {
	expires_at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an expiry from the wire. Accepts any RFC 3339 offset and normalizes
/// to UTC.
pub fn parse_expiry(raw: &str) -> Result<DateTime<Utc>, WgEasyError> {
	DateTime::parse_from_rfc3339(raw)
		.map(|expires_at| expires_at.with_timezone(&Utc))
		.map_err(|_| WgEasyError::Parse(format!("invalid expiry timestamp: {raw}")))
}
