// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Registry repository for database operations.
//!
//! This module provides database access for the wgfleet registry entities:
//! - Remote wg-easy server records, including cached session state and health
//! - Logical users
//! - User/server bindings (one binding per peer a user owns on a server)

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use crate::error::DbError;

pub type ServerRowTuple = (
	i64,
	String,
	String,
	String,
	String,
	Option<String>,
	Option<String>,
	bool,
	Option<String>,
	Option<String>,
);

pub type UserRowTuple = (i64, String, Option<String>, String);

pub type BindingRowTuple = (i64, i64, i64, i64, String, Option<String>, String);

const SERVER_COLUMNS: &str = "id, name, base_url, username, password, session_cookie, \
	 session_expires_at, last_status_ok, last_checked_at, last_error";

const BINDING_COLUMNS: &str =
	"id, logical_user_id, server_id, wg_client_id, wg_client_name, expires_at, created_at";

/// Repository for registry database operations.
#[derive(Clone)]
pub struct RegistryRepository {
	pool: SqlitePool,
}

impl RegistryRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	// =========================================================================
	// Server Operations
	// =========================================================================

	#[tracing::instrument(skip(self, password), fields(%name, %base_url))]
	pub async fn insert_server(
		&self,
		name: &str,
		base_url: &str,
		username: &str,
		password: &str,
	) -> Result<i64, DbError> {
		let result = sqlx::query(
			"INSERT INTO wg_servers (name, base_url, username, password, last_status_ok)
			 VALUES (?, ?, ?, ?, 0)",
		)
		.bind(name)
		.bind(base_url)
		.bind(username)
		.bind(password)
		.execute(&self.pool)
		.await?;

		Ok(result.last_insert_rowid())
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_servers(&self) -> Result<Vec<ServerRowTuple>, DbError> {
		let rows: Vec<ServerRowTuple> = sqlx::query_as(&format!(
			"SELECT {SERVER_COLUMNS} FROM wg_servers ORDER BY id"
		))
		.fetch_all(&self.pool)
		.await?;

		Ok(rows)
	}

	#[tracing::instrument(skip(self), fields(%server_id))]
	pub async fn get_server(&self, server_id: i64) -> Result<Option<ServerRowTuple>, DbError> {
		let row: Option<ServerRowTuple> = sqlx::query_as(&format!(
			"SELECT {SERVER_COLUMNS} FROM wg_servers WHERE id = ?"
		))
		.bind(server_id)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row)
	}

	/// Partial update: `None` fields keep their current value.
	#[tracing::instrument(skip(self, password), fields(%server_id))]
	pub async fn update_server(
		&self,
		server_id: i64,
		name: Option<&str>,
		base_url: Option<&str>,
		username: Option<&str>,
		password: Option<&str>,
	) -> Result<u64, DbError> {
		let result = sqlx::query(
			"UPDATE wg_servers
			 SET name = COALESCE(?, name),
			     base_url = COALESCE(?, base_url),
			     username = COALESCE(?, username),
			     password = COALESCE(?, password)
			 WHERE id = ?",
		)
		.bind(name)
		.bind(base_url)
		.bind(username)
		.bind(password)
		.bind(server_id)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self), fields(%server_id))]
	pub async fn delete_server(&self, server_id: i64) -> Result<u64, DbError> {
		let result = sqlx::query("DELETE FROM wg_servers WHERE id = ?")
			.bind(server_id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	// =========================================================================
	// Session State Operations
	// =========================================================================
	//
	// The cookie and its expiry are one unit: they are written together and
	// cleared together, never one without the other.

	#[tracing::instrument(skip(self, cookie), fields(%server_id, %expires_at))]
	pub async fn update_server_session(
		&self,
		server_id: i64,
		cookie: &str,
		expires_at: &str,
	) -> Result<u64, DbError> {
		let result = sqlx::query(
			"UPDATE wg_servers
			 SET session_cookie = ?, session_expires_at = ?, last_status_ok = 1,
			     last_error = NULL, last_checked_at = datetime('now')
			 WHERE id = ?",
		)
		.bind(cookie)
		.bind(expires_at)
		.bind(server_id)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self), fields(%server_id))]
	pub async fn clear_server_session(&self, server_id: i64) -> Result<u64, DbError> {
		let result = sqlx::query(
			"UPDATE wg_servers SET session_cookie = NULL, session_expires_at = NULL WHERE id = ?",
		)
		.bind(server_id)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self), fields(%server_id, %error))]
	pub async fn mark_server_unhealthy(&self, server_id: i64, error: &str) -> Result<u64, DbError> {
		let result = sqlx::query(
			"UPDATE wg_servers
			 SET last_status_ok = 0, last_error = ?, last_checked_at = datetime('now')
			 WHERE id = ?",
		)
		.bind(error)
		.bind(server_id)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self), fields(%server_id))]
	pub async fn mark_server_healthy(&self, server_id: i64) -> Result<u64, DbError> {
		let result = sqlx::query(
			"UPDATE wg_servers
			 SET last_status_ok = 1, last_error = NULL, last_checked_at = datetime('now')
			 WHERE id = ?",
		)
		.bind(server_id)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}

	// =========================================================================
	// Logical User Operations
	// =========================================================================

	#[tracing::instrument(skip(self), fields(%name))]
	pub async fn insert_user(&self, name: &str, note: Option<&str>) -> Result<i64, DbError> {
		let result = sqlx::query(
			"INSERT INTO logical_users (name, note, created_at) VALUES (?, ?, datetime('now'))",
		)
		.bind(name)
		.bind(note)
		.execute(&self.pool)
		.await?;

		Ok(result.last_insert_rowid())
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_users(&self) -> Result<Vec<UserRowTuple>, DbError> {
		let rows: Vec<UserRowTuple> =
			sqlx::query_as("SELECT id, name, note, created_at FROM logical_users ORDER BY id")
				.fetch_all(&self.pool)
				.await?;

		Ok(rows)
	}

	#[tracing::instrument(skip(self), fields(%user_id))]
	pub async fn get_user(&self, user_id: i64) -> Result<Option<UserRowTuple>, DbError> {
		let row: Option<UserRowTuple> =
			sqlx::query_as("SELECT id, name, note, created_at FROM logical_users WHERE id = ?")
				.bind(user_id)
				.fetch_optional(&self.pool)
				.await?;

		Ok(row)
	}

	#[tracing::instrument(skip(self), fields(%user_id))]
	pub async fn delete_user(&self, user_id: i64) -> Result<u64, DbError> {
		let result = sqlx::query("DELETE FROM logical_users WHERE id = ?")
			.bind(user_id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	// =========================================================================
	// Binding Operations
	// =========================================================================

	#[tracing::instrument(skip(self), fields(%logical_user_id, %server_id, %wg_client_id))]
	pub async fn insert_binding(
		&self,
		logical_user_id: i64,
		server_id: i64,
		wg_client_id: i64,
		wg_client_name: &str,
		expires_at: Option<&str>,
	) -> Result<i64, DbError> {
		let result = sqlx::query(
			"INSERT INTO user_server_bindings
			 (logical_user_id, server_id, wg_client_id, wg_client_name, expires_at, created_at)
			 VALUES (?, ?, ?, ?, ?, datetime('now'))",
		)
		.bind(logical_user_id)
		.bind(server_id)
		.bind(wg_client_id)
		.bind(wg_client_name)
		.bind(expires_at)
		.execute(&self.pool)
		.await?;

		Ok(result.last_insert_rowid())
	}

	#[tracing::instrument(skip(self), fields(%user_id))]
	pub async fn list_bindings_for_user(
		&self,
		user_id: i64,
	) -> Result<Vec<BindingRowTuple>, DbError> {
		let rows: Vec<BindingRowTuple> = sqlx::query_as(&format!(
			"SELECT {BINDING_COLUMNS} FROM user_server_bindings
			 WHERE logical_user_id = ? ORDER BY id"
		))
		.bind(user_id)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows)
	}

	#[tracing::instrument(skip(self), fields(%server_id))]
	pub async fn list_bindings_for_server(
		&self,
		server_id: i64,
	) -> Result<Vec<BindingRowTuple>, DbError> {
		let rows: Vec<BindingRowTuple> = sqlx::query_as(&format!(
			"SELECT {BINDING_COLUMNS} FROM user_server_bindings
			 WHERE server_id = ? ORDER BY id"
		))
		.bind(server_id)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows)
	}

	/// Dedup lookup for the synchronization engine: one binding per
	/// (server id, remote peer id) pair.
	#[tracing::instrument(skip(self), fields(%server_id, %wg_client_id))]
	pub async fn get_binding_by_server_peer(
		&self,
		server_id: i64,
		wg_client_id: i64,
	) -> Result<Option<BindingRowTuple>, DbError> {
		let row: Option<BindingRowTuple> = sqlx::query_as(&format!(
			"SELECT {BINDING_COLUMNS} FROM user_server_bindings
			 WHERE server_id = ? AND wg_client_id = ?"
		))
		.bind(server_id)
		.bind(wg_client_id)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row)
	}

	#[tracing::instrument(skip(self), fields(%user_id, %server_id))]
	pub async fn get_binding_by_user_server(
		&self,
		user_id: i64,
		server_id: i64,
	) -> Result<Option<BindingRowTuple>, DbError> {
		let row: Option<BindingRowTuple> = sqlx::query_as(&format!(
			"SELECT {BINDING_COLUMNS} FROM user_server_bindings
			 WHERE logical_user_id = ? AND server_id = ?"
		))
		.bind(user_id)
		.bind(server_id)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row)
	}

	#[tracing::instrument(skip(self), fields(%server_id, %wg_client_id))]
	pub async fn update_binding_expiry(
		&self,
		server_id: i64,
		wg_client_id: i64,
		expires_at: Option<&str>,
	) -> Result<u64, DbError> {
		let result = sqlx::query(
			"UPDATE user_server_bindings SET expires_at = ?
			 WHERE server_id = ? AND wg_client_id = ?",
		)
		.bind(expires_at)
		.bind(server_id)
		.bind(wg_client_id)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self), fields(%server_id, %wg_client_id))]
	pub async fn delete_bindings_for_peer(
		&self,
		server_id: i64,
		wg_client_id: i64,
	) -> Result<u64, DbError> {
		let result = sqlx::query(
			"DELETE FROM user_server_bindings WHERE server_id = ? AND wg_client_id = ?",
		)
		.bind(server_id)
		.bind(wg_client_id)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self), fields(%server_id))]
	pub async fn delete_bindings_for_server(&self, server_id: i64) -> Result<u64, DbError> {
		let result = sqlx::query("DELETE FROM user_server_bindings WHERE server_id = ?")
			.bind(server_id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self), fields(%user_id))]
	pub async fn delete_bindings_for_user(&self, user_id: i64) -> Result<u64, DbError> {
		let result = sqlx::query("DELETE FROM user_server_bindings WHERE logical_user_id = ?")
			.bind(user_id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}
}

#[async_trait]
pub trait RegistryStore: Send + Sync {
	async fn insert_server(
		&self,
		name: &str,
		base_url: &str,
		username: &str,
		password: &str,
	) -> Result<i64, DbError>;
	async fn list_servers(&self) -> Result<Vec<ServerRowTuple>, DbError>;
	async fn get_server(&self, server_id: i64) -> Result<Option<ServerRowTuple>, DbError>;
	async fn update_server(
		&self,
		server_id: i64,
		name: Option<&str>,
		base_url: Option<&str>,
		username: Option<&str>,
		password: Option<&str>,
	) -> Result<u64, DbError>;
	async fn delete_server(&self, server_id: i64) -> Result<u64, DbError>;
	async fn update_server_session(
		&self,
		server_id: i64,
		cookie: &str,
		expires_at: &str,
	) -> Result<u64, DbError>;
	async fn clear_server_session(&self, server_id: i64) -> Result<u64, DbError>;
	async fn mark_server_unhealthy(&self, server_id: i64, error: &str) -> Result<u64, DbError>;
	async fn mark_server_healthy(&self, server_id: i64) -> Result<u64, DbError>;
	async fn insert_user(&self, name: &str, note: Option<&str>) -> Result<i64, DbError>;
	async fn list_users(&self) -> Result<Vec<UserRowTuple>, DbError>;
	async fn get_user(&self, user_id: i64) -> Result<Option<UserRowTuple>, DbError>;
	async fn delete_user(&self, user_id: i64) -> Result<u64, DbError>;
	async fn insert_binding(
		&self,
		logical_user_id: i64,
		server_id: i64,
		wg_client_id: i64,
		wg_client_name: &str,
		expires_at: Option<&str>,
	) -> Result<i64, DbError>;
	async fn list_bindings_for_user(&self, user_id: i64) -> Result<Vec<BindingRowTuple>, DbError>;
	async fn list_bindings_for_server(
		&self,
		server_id: i64,
	) -> Result<Vec<BindingRowTuple>, DbError>;
	async fn get_binding_by_server_peer(
		&self,
		server_id: i64,
		wg_client_id: i64,
	) -> Result<Option<BindingRowTuple>, DbError>;
	async fn get_binding_by_user_server(
		&self,
		user_id: i64,
		server_id: i64,
	) -> Result<Option<BindingRowTuple>, DbError>;
	async fn update_binding_expiry(
		&self,
		server_id: i64,
		wg_client_id: i64,
		expires_at: Option<&str>,
	) -> Result<u64, DbError>;
	async fn delete_bindings_for_peer(
		&self,
		server_id: i64,
		wg_client_id: i64,
	) -> Result<u64, DbError>;
	async fn delete_bindings_for_server(&self, server_id: i64) -> Result<u64, DbError>;
	async fn delete_bindings_for_user(&self, user_id: i64) -> Result<u64, DbError>;
}

#[async_trait]
impl RegistryStore for RegistryRepository {
	async fn insert_server(
		&self,
		name: &str,
		base_url: &str,
		username: &str,
		password: &str,
	) -> Result<i64, DbError> {
		self.insert_server(name, base_url, username, password).await
	}

	async fn list_servers(&self) -> Result<Vec<ServerRowTuple>, DbError> {
		self.list_servers().await
	}

	async fn get_server(&self, server_id: i64) -> Result<Option<ServerRowTuple>, DbError> {
		self.get_server(server_id).await
	}

	async fn update_server(
		&self,
		server_id: i64,
		name: Option<&str>,
		base_url: Option<&str>,
		username: Option<&str>,
		password: Option<&str>,
	) -> Result<u64, DbError> {
		self
			.update_server(server_id, name, base_url, username, password)
			.await
	}

	async fn delete_server(&self, server_id: i64) -> Result<u64, DbError> {
		self.delete_server(server_id).await
	}

	async fn update_server_session(
		&self,
		server_id: i64,
		cookie: &str,
		expires_at: &str,
	) -> Result<u64, DbError> {
		self
			.update_server_session(server_id, cookie, expires_at)
			.await
	}

	async fn clear_server_session(&self, server_id: i64) -> Result<u64, DbError> {
		self.clear_server_session(server_id).await
	}

	async fn mark_server_unhealthy(&self, server_id: i64, error: &str) -> Result<u64, DbError> {
		self.mark_server_unhealthy(server_id, error).await
	}

	async fn mark_server_healthy(&self, server_id: i64) -> Result<u64, DbError> {
		self.mark_server_healthy(server_id).await
	}

	async fn insert_user(&self, name: &str, note: Option<&str>) -> Result<i64, DbError> {
		self.insert_user(name, note).await
	}

	async fn list_users(&self) -> Result<Vec<UserRowTuple>, DbError> {
		self.list_users().await
	}

	async fn get_user(&self, user_id: i64) -> Result<Option<UserRowTuple>, DbError> {
		self.get_user(user_id).await
	}

	async fn delete_user(&self, user_id: i64) -> Result<u64, DbError> {
		self.delete_user(user_id).await
	}

	async fn insert_binding(
		&self,
		logical_user_id: i64,
		server_id: i64,
		wg_client_id: i64,
		wg_client_name: &str,
		expires_at: Option<&str>,
	) -> Result<i64, DbError> {
		self
			.insert_binding(
				logical_user_id,
				server_id,
				wg_client_id,
				wg_client_name,
				expires_at,
			)
			.await
	}

	async fn list_bindings_for_user(&self, user_id: i64) -> Result<Vec<BindingRowTuple>, DbError> {
		self.list_bindings_for_user(user_id).await
	}

	async fn list_bindings_for_server(
		&self,
		server_id: i64,
	) -> Result<Vec<BindingRowTuple>, DbError> {
		self.list_bindings_for_server(server_id).await
	}

	async fn get_binding_by_server_peer(
		&self,
		server_id: i64,
		wg_client_id: i64,
	) -> Result<Option<BindingRowTuple>, DbError> {
		self
			.get_binding_by_server_peer(server_id, wg_client_id)
			.await
	}

	async fn get_binding_by_user_server(
		&self,
		user_id: i64,
		server_id: i64,
	) -> Result<Option<BindingRowTuple>, DbError> {
		self.get_binding_by_user_server(user_id, server_id).await
	}

	async fn update_binding_expiry(
		&self,
		server_id: i64,
		wg_client_id: i64,
		expires_at: Option<&str>,
	) -> Result<u64, DbError> {
		self
			.update_binding_expiry(server_id, wg_client_id, expires_at)
			.await
	}

	async fn delete_bindings_for_peer(
		&self,
		server_id: i64,
		wg_client_id: i64,
	) -> Result<u64, DbError> {
		self.delete_bindings_for_peer(server_id, wg_client_id).await
	}

	async fn delete_bindings_for_server(&self, server_id: i64) -> Result<u64, DbError> {
		self.delete_bindings_for_server(server_id).await
	}

	async fn delete_bindings_for_user(&self, user_id: i64) -> Result<u64, DbError> {
		self.delete_bindings_for_user(user_id).await
	}
}
