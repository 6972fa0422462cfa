// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use std::str::FromStr;

use crate::error::DbError;
use crate::schema::ensure_schema;

/// Create a registry-ready SqlitePool: WAL mode plus the registry tables
/// bootstrapped, so the repository can run queries on it immediately.
///
/// The bootstrap is idempotent; calling this on every startup is safe.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./wgfleet.db")
///
/// # Errors
/// Returns `DbError::Internal` if the URL is invalid; connection and
/// bootstrap failures surface as `DbError::Sqlx`.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, DbError> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.create_if_missing(true);

	let pool = SqlitePool::connect_with(options).await?;
	ensure_schema(&pool).await?;

	tracing::debug!("database pool created");
	Ok(pool)
}
