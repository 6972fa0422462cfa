// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Idempotent schema bootstrap for the registry tables.
//!
//! There is no migration tooling here; the tables are created on startup if
//! they do not exist and never altered afterwards.

use sqlx::sqlite::SqlitePool;

use crate::error::DbError;

/// Create the registry tables if they are missing.
///
/// Safe to call on every startup; existing tables are left untouched.
#[tracing::instrument(skip(pool))]
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), DbError> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS wg_servers (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			name TEXT NOT NULL,
			base_url TEXT NOT NULL,
			username TEXT NOT NULL,
			password TEXT NOT NULL,
			session_cookie TEXT,
			session_expires_at TEXT,
			last_status_ok INTEGER NOT NULL DEFAULT 0,
			last_checked_at TEXT,
			last_error TEXT
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS logical_users (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			name TEXT NOT NULL,
			note TEXT,
			created_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS user_server_bindings (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			logical_user_id INTEGER NOT NULL,
			server_id INTEGER NOT NULL,
			wg_client_id INTEGER NOT NULL,
			wg_client_name TEXT NOT NULL,
			expires_at TEXT,
			created_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	tracing::debug!("registry schema ensured");
	Ok(())
}
