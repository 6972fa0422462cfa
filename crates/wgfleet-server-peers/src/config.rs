// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Fleet configuration.
//!
//! All knobs are second-granularity and overridable through `WGFLEET_*`
//! environment variables. Defaults match the lifetimes wg-easy hands out.

use std::time::Duration;

/// Session cookies are refreshed after this many seconds.
pub const DEFAULT_SESSION_LIFETIME_SECS: u64 = 3600;

/// A session within this margin of expiry counts as stale.
pub const DEFAULT_SESSION_REFRESH_MARGIN_SECS: u64 = 60;

/// Per-request timeout for remote wg-easy calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Traffic samples older than this are pruned.
pub const DEFAULT_HISTORY_RETENTION_SECS: u64 = 604_800;

#[derive(Debug, Clone)]
pub struct FleetConfig {
	pub session_lifetime_secs: u64,
	pub session_refresh_margin_secs: u64,
	pub request_timeout_secs: u64,
	pub history_retention_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("invalid value for {var}: {value}")]
	InvalidValue { var: String, value: String },

	#[error("{0}")]
	Invalid(String),
}

impl Default for FleetConfig {
	fn default() -> Self {
		Self {
			session_lifetime_secs: DEFAULT_SESSION_LIFETIME_SECS,
			session_refresh_margin_secs: DEFAULT_SESSION_REFRESH_MARGIN_SECS,
			request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
			history_retention_secs: DEFAULT_HISTORY_RETENTION_SECS,
		}
	}
}

impl FleetConfig {
	pub fn from_env() -> Result<Self, ConfigError> {
		let config = Self {
			session_lifetime_secs: env_u64(
				"WGFLEET_SESSION_LIFETIME_SECS",
				DEFAULT_SESSION_LIFETIME_SECS,
			)?,
			session_refresh_margin_secs: env_u64(
				"WGFLEET_SESSION_REFRESH_MARGIN_SECS",
				DEFAULT_SESSION_REFRESH_MARGIN_SECS,
			)?,
			request_timeout_secs: env_u64("WGFLEET_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
			history_retention_secs: env_u64(
				"WGFLEET_HISTORY_RETENTION_SECS",
				DEFAULT_HISTORY_RETENTION_SECS,
			)?,
		};
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.session_lifetime_secs == 0 {
			return Err(ConfigError::Invalid(
				"session lifetime must be nonzero".to_string(),
			));
		}
		if self.request_timeout_secs == 0 {
			return Err(ConfigError::Invalid(
				"request timeout must be nonzero".to_string(),
			));
		}
		if self.session_refresh_margin_secs >= self.session_lifetime_secs {
			return Err(ConfigError::Invalid(format!(
				"refresh margin ({}s) must be shorter than session lifetime ({}s)",
				self.session_refresh_margin_secs, self.session_lifetime_secs
			)));
		}
		Ok(())
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn session_lifetime(&self) -> chrono::Duration {
		chrono::Duration::seconds(self.session_lifetime_secs as i64)
	}

	pub fn refresh_margin(&self) -> chrono::Duration {
		chrono::Duration::seconds(self.session_refresh_margin_secs as i64)
	}

	pub fn history_retention(&self) -> chrono::Duration {
		chrono::Duration::seconds(self.history_retention_secs as i64)
	}
}

fn env_u64(var: &str, default: u64) -> Result<u64, ConfigError> {
	match std::env::var(var) {
		Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
			var: var.to_string(),
			value,
		}),
		Err(_) => Ok(default),
	}
}
