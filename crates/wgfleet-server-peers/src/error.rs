// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Error types for fleet orchestration.

use thiserror::Error;
use wgfleet_server_db::DbError;
use wgfleet_server_wgeasy::WgEasyError;

/// Errors surfaced by the fleet services.
///
/// Remote failures are folded into three buckets so callers can map them
/// onto transport problems, credential problems, and protocol problems
/// without inspecting wg-easy internals.
#[derive(Debug, Error)]
pub enum FleetError {
	#[error("transport error: {0}")]
	Transport(String),

	#[error("authentication failed: {0}")]
	Auth(String),

	#[error("remote protocol error: {0}")]
	RemoteProtocol(String),

	#[error("not found: {0}")]
	NotFound(String),

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("internal error: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, FleetError>;

impl From<DbError> for FleetError {
	fn from(err: DbError) -> Self {
		match err {
			DbError::Sqlx(e) => FleetError::Database(e),
			DbError::Internal(msg) => FleetError::Internal(msg),
		}
	}
}

impl From<WgEasyError> for FleetError {
	fn from(err: WgEasyError) -> Self {
		match err {
			WgEasyError::Http(e) => FleetError::Transport(e.to_string()),
			WgEasyError::LoginFailed { .. } | WgEasyError::CookieNotFound => {
				FleetError::Auth(err.to_string())
			}
			WgEasyError::Api { .. } | WgEasyError::NotSuccessful | WgEasyError::Parse(_) => {
				FleetError::RemoteProtocol(err.to_string())
			}
		}
	}
}
