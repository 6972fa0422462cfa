// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! wg-easy appliance REST client.
//!
//! Speaks the cookie-authenticated protocol exposed by wg-easy WireGuard
//! appliances. The flow mirrors the appliance's own web UI:
//!
//! 1. `POST /api/session` with the admin username/password; the session
//!    token arrives in a `Set-Cookie` header under the fixed name `wg-easy`
//! 2. Every subsequent call presents that token back as a `Cookie` header
//! 3. Peers live under `/api/client`: list, create, detail, enable/disable,
//!    delete, plus configuration and QR code downloads
//!
//! Updates are full-object replacement only, so single-field edits are a
//! read-modify-write at the call site ([`WgEasyApi::peer_detail`] then
//! [`WgEasyApi::replace_peer`]).
//!
//! This crate is deliberately stateless: it does not cache cookies or decide
//! when a session is stale. Callers hold the cookie in a [`RemoteSession`]
//! and own its lifetime bookkeeping.

mod client;
mod error;
mod secret;
mod types;

pub use client::{WgEasyApi, SESSION_COOKIE_NAME};
pub use error::WgEasyError;
// Status codes appear in [`WgEasyError`] fields; re-exported so callers can
// match on them without a direct reqwest dependency.
pub use reqwest::StatusCode;
pub use secret::{SecretString, REDACTED};
pub use types::{format_expiry, parse_expiry, RemotePeer, RemoteSession};
