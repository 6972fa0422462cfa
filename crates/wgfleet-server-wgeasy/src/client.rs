// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Response};
use serde_json::Value;

use crate::error::WgEasyError;
use crate::secret::SecretString;
use crate::types::{
	format_expiry, CreatePeerRequest, CreatePeerResponse, LoginRequest, RemotePeer,
	RemotePeerWire, RemoteSession,
};

/// Name of the session cookie issued by wg-easy appliances.
pub const SESSION_COOKIE_NAME: &str = "wg-easy";

/// HTTP client for wg-easy appliances.
///
/// The client itself holds no per-appliance state: every operation takes a
/// [`RemoteSession`] naming the appliance and carrying its session cookie,
/// so one instance serves any number of remotes. There are no retries
/// anywhere; every failure surfaces to the caller as a [`WgEasyError`].
#[derive(Clone)]
pub struct WgEasyApi {
	http_client: Client,
}

impl WgEasyApi {
	/// Create a client with the given per-request timeout.
	pub fn new(request_timeout: Duration) -> Self {
		Self {
			http_client: wgfleet_common_http::new_client_with_timeout(request_timeout),
		}
	}

	/// Create a client around an existing `reqwest::Client`.
	pub fn with_client(http_client: Client) -> Self {
		Self { http_client }
	}

	/// Perform the login exchange and return the session cookie value.
	///
	/// The cookie arrives in a `Set-Cookie` response header under
	/// [`SESSION_COOKIE_NAME`]; its lifetime bookkeeping is the caller's
	/// concern.
	#[tracing::instrument(skip(self, password), fields(%base_url, %username))]
	pub async fn login(
		&self,
		base_url: &str,
		username: &str,
		password: &SecretString,
	) -> Result<SecretString, WgEasyError> {
		let response = self
			.http_client
			.post(endpoint(base_url, "/session"))
			.header(header::ACCEPT, "application/json")
			.json(&LoginRequest {
				username,
				password: password.expose(),
				remember: true,
			})
			.send()
			.await?;

		let status = response.status();
		if !status.is_success() {
			return Err(WgEasyError::LoginFailed { status });
		}

		let cookie = response
			.headers()
			.get_all(header::SET_COOKIE)
			.iter()
			.filter_map(|value| value.to_str().ok())
			.find_map(extract_session_cookie)
			.map(str::to_string);

		match cookie {
			Some(cookie) => Ok(SecretString::new(cookie)),
			None => Err(WgEasyError::CookieNotFound),
		}
	}

	/// List all peers registered on the appliance.
	#[tracing::instrument(skip(self, session), fields(base_url = %session.base_url))]
	pub async fn list_peers(
		&self,
		session: &RemoteSession,
	) -> Result<Vec<RemotePeer>, WgEasyError> {
		let response = self
			.http_client
			.get(endpoint(&session.base_url, "/client"))
			.header(header::ACCEPT, "application/json")
			.header(header::COOKIE, cookie_header(session))
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(api_error("/api/client", response).await);
		}

		let wire: Vec<RemotePeerWire> = response
			.json()
			.await
			.map_err(|e| WgEasyError::Parse(e.to_string()))?;

		wire.into_iter().map(RemotePeer::try_from).collect()
	}

	/// Create a peer and return the appliance-assigned peer id.
	///
	/// The expiry field is always sent, `null` when unset. A 200 response
	/// with `success: false` is still a failure; the flag is authoritative.
	#[tracing::instrument(skip(self, session), fields(base_url = %session.base_url, %name))]
	pub async fn create_peer(
		&self,
		session: &RemoteSession,
		name: &str,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<i64, WgEasyError> {
		let response = self
			.http_client
			.post(endpoint(&session.base_url, "/client"))
			.header(header::ACCEPT, "application/json")
			.header(header::COOKIE, cookie_header(session))
			.json(&CreatePeerRequest {
				name,
				expires_at: expires_at.map(format_expiry),
			})
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(api_error("create client", response).await);
		}

		let created: CreatePeerResponse = response
			.json()
			.await
			.map_err(|e| WgEasyError::Parse(e.to_string()))?;

		if !created.success {
			return Err(WgEasyError::NotSuccessful);
		}

		created
			.client_id
			.ok_or_else(|| WgEasyError::Parse("clientId missing from create response".to_string()))
	}

	/// Fetch one peer's full record, unparsed.
	///
	/// The appliance only supports full-object replacement on update, so
	/// callers that want to change a single field fetch the raw record here,
	/// mutate it, and re-submit it via [`WgEasyApi::replace_peer`].
	#[tracing::instrument(skip(self, session), fields(base_url = %session.base_url, %peer_id))]
	pub async fn peer_detail(
		&self,
		session: &RemoteSession,
		peer_id: i64,
	) -> Result<Value, WgEasyError> {
		let response = self
			.http_client
			.get(endpoint(&session.base_url, &format!("/client/{peer_id}")))
			.header(header::ACCEPT, "application/json")
			.header(header::COOKIE, cookie_header(session))
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(api_error("get client", response).await);
		}

		response
			.json()
			.await
			.map_err(|e| WgEasyError::Parse(e.to_string()))
	}

	/// Replace one peer's full record.
	#[tracing::instrument(skip(self, session, record), fields(base_url = %session.base_url, %peer_id))]
	pub async fn replace_peer(
		&self,
		session: &RemoteSession,
		peer_id: i64,
		record: &Value,
	) -> Result<(), WgEasyError> {
		let response = self
			.http_client
			.post(endpoint(&session.base_url, &format!("/client/{peer_id}")))
			.header(header::ACCEPT, "application/json")
			.header(header::COOKIE, cookie_header(session))
			.json(record)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(api_error("update client", response).await);
		}

		Ok(())
	}

	/// Enable a peer.
	#[tracing::instrument(skip(self, session), fields(base_url = %session.base_url, %peer_id))]
	pub async fn enable_peer(
		&self,
		session: &RemoteSession,
		peer_id: i64,
	) -> Result<(), WgEasyError> {
		self.peer_action(session, peer_id, "enable").await
	}

	/// Disable a peer.
	#[tracing::instrument(skip(self, session), fields(base_url = %session.base_url, %peer_id))]
	pub async fn disable_peer(
		&self,
		session: &RemoteSession,
		peer_id: i64,
	) -> Result<(), WgEasyError> {
		self.peer_action(session, peer_id, "disable").await
	}

	async fn peer_action(
		&self,
		session: &RemoteSession,
		peer_id: i64,
		action: &str,
	) -> Result<(), WgEasyError> {
		let response = self
			.http_client
			.post(endpoint(
				&session.base_url,
				&format!("/client/{peer_id}/{action}"),
			))
			.header(header::ACCEPT, "application/json")
			.header(header::COOKIE, cookie_header(session))
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(api_error(action, response).await);
		}

		Ok(())
	}

	/// Delete a peer from the appliance.
	#[tracing::instrument(skip(self, session), fields(base_url = %session.base_url, %peer_id))]
	pub async fn delete_peer(
		&self,
		session: &RemoteSession,
		peer_id: i64,
	) -> Result<(), WgEasyError> {
		let response = self
			.http_client
			.delete(endpoint(&session.base_url, &format!("/client/{peer_id}")))
			.header(header::ACCEPT, "application/json")
			.header(header::COOKIE, cookie_header(session))
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(api_error("delete client", response).await);
		}

		Ok(())
	}

	/// Download a peer's WireGuard tunnel configuration file.
	#[tracing::instrument(skip(self, session), fields(base_url = %session.base_url, %peer_id))]
	pub async fn fetch_configuration(
		&self,
		session: &RemoteSession,
		peer_id: i64,
	) -> Result<Bytes, WgEasyError> {
		let response = self
			.http_client
			.get(endpoint(
				&session.base_url,
				&format!("/client/{peer_id}/configuration"),
			))
			.header(header::ACCEPT, "application/octet-stream")
			.header(header::COOKIE, cookie_header(session))
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(api_error("get configuration", response).await);
		}

		Ok(response.bytes().await?)
	}

	/// Download a peer's connection QR code as SVG bytes.
	#[tracing::instrument(skip(self, session), fields(base_url = %session.base_url, %peer_id))]
	pub async fn fetch_qrcode(
		&self,
		session: &RemoteSession,
		peer_id: i64,
	) -> Result<Bytes, WgEasyError> {
		let path = format!("/client/{peer_id}/qrcode.svg");
		let response = self
			.http_client
			.get(endpoint(&session.base_url, &path))
			.header(header::ACCEPT, "image/svg+xml")
			.header(header::COOKIE, cookie_header(session))
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(api_error(&format!("/api{path}"), response).await);
		}

		Ok(response.bytes().await?)
	}
}

fn endpoint(base_url: &str, path: &str) -> String {
	format!("{}/api{}", base_url.trim_end_matches('/'), path)
}

fn cookie_header(session: &RemoteSession) -> String {
	format!("{}={}", SESSION_COOKIE_NAME, session.cookie.expose())
}

/// Pull the session cookie value out of one `Set-Cookie` header value.
fn extract_session_cookie(header_value: &str) -> Option<&str> {
	let prefix = format!("{SESSION_COOKIE_NAME}=");
	let (_, tail) = header_value.split_once(prefix.as_str())?;
	match tail.split_once(';') {
		Some((value, _)) => Some(value),
		None => Some(tail),
	}
}

async fn api_error(operation: &str, response: Response) -> WgEasyError {
	let status = response.status();
	let body = response.text().await.unwrap_or_default();
	WgEasyError::Api {
		operation: operation.to_string(),
		status,
		body,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use reqwest::StatusCode;
	use serde_json::json;
	use wiremock::matchers::{body_json, header as header_matcher, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn test_api() -> WgEasyApi {
		WgEasyApi::new(Duration::from_secs(10))
	}

	fn test_session(server: &MockServer) -> RemoteSession {
		RemoteSession {
			base_url: server.uri(),
			cookie: SecretString::new("tok"),
		}
	}

	#[test]
	fn test_extract_session_cookie_value() {
		assert_eq!(
			extract_session_cookie("wg-easy=abc123; Path=/; HttpOnly"),
			Some("abc123")
		);
		assert_eq!(extract_session_cookie("wg-easy=abc123"), Some("abc123"));
		assert_eq!(extract_session_cookie("other=xyz; Path=/"), None);
	}

	#[test]
	fn test_endpoint_normalizes_trailing_slash() {
		assert_eq!(
			endpoint("http://10.0.0.1:51821/", "/client"),
			"http://10.0.0.1:51821/api/client"
		);
		assert_eq!(
			endpoint("http://10.0.0.1:51821", "/session"),
			"http://10.0.0.1:51821/api/session"
		);
	}

	#[tokio::test]
	async fn test_login_extracts_session_cookie() {
		let server = MockServer::start().await;

		Mock::given(method("POST"))
			.and(path("/api/session"))
			.and(body_json(json!({
				"username": "admin",
				"password": "hunter2",
				"remember": true,
			})))
			.respond_with(
				ResponseTemplate::new(200)
					.insert_header("set-cookie", "wg-easy=abc123; Path=/; HttpOnly"),
			)
			.expect(1)
			.mount(&server)
			.await;

		let cookie = test_api()
			.login(&server.uri(), "admin", &SecretString::new("hunter2"))
			.await
			.unwrap();

		assert_eq!(cookie.expose(), "abc123");
	}

	#[tokio::test]
	async fn test_login_rejection_carries_status() {
		let server = MockServer::start().await;

		Mock::given(method("POST"))
			.and(path("/api/session"))
			.respond_with(ResponseTemplate::new(401))
			.mount(&server)
			.await;

		let err = test_api()
			.login(&server.uri(), "admin", &SecretString::new("wrong"))
			.await
			.unwrap_err();

		assert!(matches!(
			err,
			WgEasyError::LoginFailed {
				status: StatusCode::UNAUTHORIZED
			}
		));
		assert!(err.is_credential_rejection());
	}

	#[tokio::test]
	async fn test_login_without_cookie_fails() {
		let server = MockServer::start().await;

		Mock::given(method("POST"))
			.and(path("/api/session"))
			.respond_with(ResponseTemplate::new(200))
			.mount(&server)
			.await;

		let err = test_api()
			.login(&server.uri(), "admin", &SecretString::new("hunter2"))
			.await
			.unwrap_err();

		assert!(matches!(err, WgEasyError::CookieNotFound));
	}

	#[tokio::test]
	async fn test_list_peers_sends_cookie_and_parses_records() {
		let server = MockServer::start().await;

		Mock::given(method("GET"))
			.and(path("/api/client"))
			.and(header_matcher("cookie", "wg-easy=tok"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([
				{
					"id": 1,
					"name": "alice",
					"enabled": true,
					"expiresAt": "2026-01-01T00:00:00.000Z",
					"latestHandshakeAt": "2025-08-01T10:00:00.000Z",
					"transferRx": 1000,
					"transferTx": 2000
				},
				{"id": 2, "name": "bob", "enabled": false, "expiresAt": null}
			])))
			.expect(1)
			.mount(&server)
			.await;

		let peers = test_api().list_peers(&test_session(&server)).await.unwrap();

		assert_eq!(peers.len(), 2);
		assert!(peers[0].is_active);
		assert_eq!(peers[0].transfer_rx, 1000);
		assert!(!peers[1].is_active);
		assert_eq!(peers[1].expires_at, None);
		assert_eq!(peers[1].enabled, Some(false));
	}

	#[tokio::test]
	async fn test_list_peers_failure_names_operation() {
		let server = MockServer::start().await;

		Mock::given(method("GET"))
			.and(path("/api/client"))
			.respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
			.mount(&server)
			.await;

		let err = test_api()
			.list_peers(&test_session(&server))
			.await
			.unwrap_err();

		match err {
			WgEasyError::Api {
				operation,
				status,
				body,
			} => {
				assert_eq!(operation, "/api/client");
				assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
				assert_eq!(body, "overloaded");
			}
			other => panic!("expected Api error, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_create_peer_sends_null_expiry_and_returns_id() {
		let server = MockServer::start().await;

		Mock::given(method("POST"))
			.and(path("/api/client"))
			.and(body_json(json!({"name": "carol", "expiresAt": null})))
			.respond_with(
				ResponseTemplate::new(200).set_body_json(json!({"success": true, "clientId": 42})),
			)
			.expect(1)
			.mount(&server)
			.await;

		let peer_id = test_api()
			.create_peer(&test_session(&server), "carol", None)
			.await
			.unwrap();

		assert_eq!(peer_id, 42);
	}

	#[tokio::test]
	async fn test_create_peer_false_success_is_an_error() {
		let server = MockServer::start().await;

		Mock::given(method("POST"))
			.and(path("/api/client"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
			.mount(&server)
			.await;

		let err = test_api()
			.create_peer(&test_session(&server), "carol", None)
			.await
			.unwrap_err();

		assert!(matches!(err, WgEasyError::NotSuccessful));
	}

	#[tokio::test]
	async fn test_create_peer_formats_expiry_for_the_wire() {
		use chrono::TimeZone;

		let server = MockServer::start().await;

		Mock::given(method("POST"))
			.and(path("/api/client"))
			.and(body_json(json!({
				"name": "dave",
				"expiresAt": "2026-03-01T00:00:00.000Z"
			})))
			.respond_with(
				ResponseTemplate::new(200).set_body_json(json!({"success": true, "clientId": 7})),
			)
			.expect(1)
			.mount(&server)
			.await;

		let expires_at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
		let peer_id = test_api()
			.create_peer(&test_session(&server), "dave", Some(expires_at))
			.await
			.unwrap();

		assert_eq!(peer_id, 7);
	}

	#[tokio::test]
	async fn test_replace_peer_posts_full_record() {
		let server = MockServer::start().await;
		let record = json!({"id": 5, "name": "erin", "expiresAt": "2026-06-01T00:00:00.000Z"});

		Mock::given(method("POST"))
			.and(path("/api/client/5"))
			.and(body_json(record.clone()))
			.respond_with(ResponseTemplate::new(200))
			.expect(1)
			.mount(&server)
			.await;

		test_api()
			.replace_peer(&test_session(&server), 5, &record)
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn test_enable_and_disable_hit_action_paths() {
		let server = MockServer::start().await;

		Mock::given(method("POST"))
			.and(path("/api/client/9/enable"))
			.respond_with(ResponseTemplate::new(200))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(path("/api/client/9/disable"))
			.respond_with(ResponseTemplate::new(200))
			.expect(1)
			.mount(&server)
			.await;

		let api = test_api();
		let session = test_session(&server);
		api.enable_peer(&session, 9).await.unwrap();
		api.disable_peer(&session, 9).await.unwrap();
	}

	#[tokio::test]
	async fn test_delete_peer_uses_delete_verb() {
		let server = MockServer::start().await;

		Mock::given(method("DELETE"))
			.and(path("/api/client/3"))
			.respond_with(ResponseTemplate::new(200))
			.expect(1)
			.mount(&server)
			.await;

		test_api()
			.delete_peer(&test_session(&server), 3)
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn test_fetch_configuration_returns_raw_bytes() {
		let server = MockServer::start().await;
		let config = "[Interface]\nPrivateKey = ...\n";

		Mock::given(method("GET"))
			.and(path("/api/client/4/configuration"))
			.respond_with(ResponseTemplate::new(200).set_body_bytes(config.as_bytes()))
			.mount(&server)
			.await;

		let bytes = test_api()
			.fetch_configuration(&test_session(&server), 4)
			.await
			.unwrap();

		assert_eq!(bytes.as_ref(), config.as_bytes());
	}

	#[tokio::test]
	async fn test_fetch_qrcode_returns_svg_bytes() {
		let server = MockServer::start().await;

		Mock::given(method("GET"))
			.and(path("/api/client/4/qrcode.svg"))
			.respond_with(ResponseTemplate::new(200).set_body_bytes(b"<svg/>".as_slice()))
			.mount(&server)
			.await;

		let bytes = test_api()
			.fetch_qrcode(&test_session(&server), 4)
			.await
			.unwrap();

		assert_eq!(bytes.as_ref(), b"<svg/>");
	}
}
