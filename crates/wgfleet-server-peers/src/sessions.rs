// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Cached wg-easy session management.
//!
//! Every remote call needs a valid session cookie. Cookies are cached on the
//! server row together with an expiry stamp; [`SessionService::ensure_session`]
//! returns the cached pair while it is fresh and logs in again otherwise.
//!
//! Refreshes are coalesced per server: concurrent callers that all find the
//! cookie stale contend on one per-server lock, and whoever wins re-checks
//! the row before logging in, so a burst of requests costs one login, not
//! one per caller. A cookie within the refresh margin of its expiry is
//! treated as already stale.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{instrument, warn};
use wgfleet_server_db::RegistryRepository;
use wgfleet_server_wgeasy::{RemoteSession, WgEasyApi};

use crate::config::FleetConfig;
use crate::error::Result;
use crate::servers::ServerRecord;

#[derive(Clone)]
pub struct SessionService {
	repo: RegistryRepository,
	api: WgEasyApi,
	config: FleetConfig,
	refresh_locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl SessionService {
	pub fn new(repo: RegistryRepository, api: WgEasyApi, config: FleetConfig) -> Self {
		Self {
			repo,
			api,
			config,
			refresh_locks: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	/// Returns a usable session for the server, logging in if the cached
	/// cookie is missing or about to expire.
	#[instrument(skip(self), fields(%server_id))]
	pub async fn ensure_session(&self, server_id: i64) -> Result<RemoteSession> {
		let record = ServerRecord::load(&self.repo, server_id).await?;
		if let Some(session) = Self::fresh_session(&record, &self.config) {
			return Ok(session);
		}

		let lock = self.lock_for(server_id).await;
		let _guard = lock.lock().await;

		// Another caller may have refreshed while we waited on the lock.
		let record = ServerRecord::load(&self.repo, server_id).await?;
		if let Some(session) = Self::fresh_session(&record, &self.config) {
			return Ok(session);
		}

		self.refresh(&record).await
	}

	fn fresh_session(record: &ServerRecord, config: &FleetConfig) -> Option<RemoteSession> {
		let cookie = record.session_cookie.as_ref()?;
		let expires_at = record.session_expires_at?;
		if expires_at > Utc::now() + config.refresh_margin() {
			Some(RemoteSession {
				base_url: record.base_url.clone(),
				cookie: cookie.clone(),
			})
		} else {
			None
		}
	}

	#[instrument(skip(self, record), fields(server_id = %record.id, base_url = %record.base_url))]
	async fn refresh(&self, record: &ServerRecord) -> Result<RemoteSession> {
		match self
			.api
			.login(&record.base_url, &record.username, &record.password)
			.await
		{
			Ok(cookie) => {
				let expires_at = Utc::now() + self.config.session_lifetime();
				self.repo
					.update_server_session(record.id, cookie.expose(), &expires_at.to_rfc3339())
					.await?;
				Ok(RemoteSession {
					base_url: record.base_url.clone(),
					cookie,
				})
			}
			Err(err) => {
				warn!(server_id = record.id, error = %err, "wg-easy login failed");
				self.repo
					.mark_server_unhealthy(record.id, &err.to_string())
					.await?;
				// A rejected credential means the stored pair can never work
				// again; anything else may be transient, so the pair stays.
				if err.is_credential_rejection() {
					self.repo.clear_server_session(record.id).await?;
				}
				Err(err.into())
			}
		}
	}

	async fn lock_for(&self, server_id: i64) -> Arc<Mutex<()>> {
		let mut locks = self.refresh_locks.lock().await;
		locks.entry(server_id).or_default().clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::FleetError;
	use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
	use std::str::FromStr;
	use std::time::Duration;
	use wgfleet_server_db::ensure_schema;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	async fn make_repo() -> RegistryRepository {
		let options = SqliteConnectOptions::from_str(":memory:")
			.unwrap()
			.create_if_missing(true);

		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.connect_with(options)
			.await
			.expect("Failed to create test pool");

		ensure_schema(&pool).await.unwrap();
		RegistryRepository::new(pool)
	}

	fn make_service(repo: &RegistryRepository) -> SessionService {
		let config = FleetConfig::default();
		let api = WgEasyApi::new(config.request_timeout());
		SessionService::new(repo.clone(), api, config)
	}

	async fn seed_server(repo: &RegistryRepository, base_url: &str) -> i64 {
		repo.insert_server("berlin-1", base_url, "admin", "hunter2")
			.await
			.unwrap()
	}

	fn login_ok(cookie: &str) -> ResponseTemplate {
		ResponseTemplate::new(200)
			.insert_header("set-cookie", format!("wg-easy={cookie}; Path=/; HttpOnly"))
	}

	#[tokio::test]
	async fn a_fresh_cached_session_skips_the_login() {
		let mock = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/session"))
			.respond_with(login_ok("should-not-be-used"))
			.expect(0)
			.mount(&mock)
			.await;

		let repo = make_repo().await;
		let id = seed_server(&repo, &mock.uri()).await;
		let expires = Utc::now() + chrono::Duration::hours(1);
		repo.update_server_session(id, "cached-cookie", &expires.to_rfc3339())
			.await
			.unwrap();

		let service = make_service(&repo);
		let session = service.ensure_session(id).await.unwrap();
		assert_eq!(session.cookie.expose(), "cached-cookie");
		assert_eq!(session.base_url, mock.uri());
	}

	#[tokio::test]
	async fn a_missing_session_triggers_a_login() {
		let mock = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/session"))
			.respond_with(login_ok("fresh-cookie"))
			.expect(1)
			.mount(&mock)
			.await;

		let repo = make_repo().await;
		let id = seed_server(&repo, &mock.uri()).await;

		let service = make_service(&repo);
		let session = service.ensure_session(id).await.unwrap();
		assert_eq!(session.cookie.expose(), "fresh-cookie");

		// A second call inside the lifetime reuses the stored cookie; the
		// expect(1) above holds it to a single login.
		let again = service.ensure_session(id).await.unwrap();
		assert_eq!(again.cookie.expose(), "fresh-cookie");

		let record = ServerRecord::load(&repo, id).await.unwrap();
		assert_eq!(record.session_cookie.unwrap().expose(), "fresh-cookie");
		assert!(record.session_expires_at.unwrap() > Utc::now());
		assert!(record.last_status_ok);
	}

	#[tokio::test]
	async fn a_session_inside_the_refresh_margin_is_replaced() {
		let mock = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/session"))
			.respond_with(login_ok("replacement"))
			.expect(1)
			.mount(&mock)
			.await;

		let repo = make_repo().await;
		let id = seed_server(&repo, &mock.uri()).await;
		// Thirty seconds left, margin is sixty: counts as stale.
		let expires = Utc::now() + chrono::Duration::seconds(30);
		repo.update_server_session(id, "old-cookie", &expires.to_rfc3339())
			.await
			.unwrap();

		let service = make_service(&repo);
		let session = service.ensure_session(id).await.unwrap();
		assert_eq!(session.cookie.expose(), "replacement");
	}

	#[tokio::test]
	async fn a_credential_rejection_clears_the_stored_pair() {
		let mock = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/session"))
			.respond_with(ResponseTemplate::new(401))
			.mount(&mock)
			.await;

		let repo = make_repo().await;
		let id = seed_server(&repo, &mock.uri()).await;
		let expires = Utc::now() - chrono::Duration::minutes(5);
		repo.update_server_session(id, "stale-cookie", &expires.to_rfc3339())
			.await
			.unwrap();

		let service = make_service(&repo);
		let result = service.ensure_session(id).await;
		assert!(matches!(result, Err(FleetError::Auth(_))));

		let record = ServerRecord::load(&repo, id).await.unwrap();
		assert!(record.session_cookie.is_none());
		assert!(record.session_expires_at.is_none());
		assert!(!record.last_status_ok);
		assert!(record
			.last_error
			.unwrap()
			.contains("Login failed with status 401"));
	}

	#[tokio::test]
	async fn a_transient_login_failure_keeps_the_stored_pair() {
		let mock = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/session"))
			.respond_with(ResponseTemplate::new(503))
			.mount(&mock)
			.await;

		let repo = make_repo().await;
		let id = seed_server(&repo, &mock.uri()).await;
		let expires = Utc::now() - chrono::Duration::minutes(5);
		repo.update_server_session(id, "stale-cookie", &expires.to_rfc3339())
			.await
			.unwrap();

		let service = make_service(&repo);
		let result = service.ensure_session(id).await;
		assert!(result.is_err());

		// The pair survives so a recovered remote does not force a re-login
		// storm; it is still past expiry and will refresh on the next call.
		let record = ServerRecord::load(&repo, id).await.unwrap();
		assert_eq!(record.session_cookie.unwrap().expose(), "stale-cookie");
		assert!(!record.last_status_ok);
	}

	#[tokio::test]
	async fn concurrent_ensures_coalesce_into_one_login() {
		let mock = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/session"))
			.respond_with(login_ok("shared").set_delay(Duration::from_millis(100)))
			.expect(1)
			.mount(&mock)
			.await;

		let repo = make_repo().await;
		let id = seed_server(&repo, &mock.uri()).await;
		let service = make_service(&repo);

		let (a, b) = tokio::join!(service.ensure_session(id), service.ensure_session(id));
		assert_eq!(a.unwrap().cookie.expose(), "shared");
		assert_eq!(b.unwrap().cookie.expose(), "shared");
		// The expect(1) on the mock verifies the second caller reused the
		// row refreshed by the first instead of logging in again.
	}

	#[tokio::test]
	async fn ensure_on_unknown_server_is_not_found() {
		let repo = make_repo().await;
		let service = make_service(&repo);

		let result = service.ensure_session(77).await;
		assert!(matches!(result, Err(FleetError::NotFound(_))));
	}
}
