// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to a wg-easy appliance.
#[derive(Debug, Error)]
pub enum WgEasyError {
	/// The HTTP request to the appliance failed (network error, timeout, etc.).
	#[error("request failed: {0}")]
	Http(#[from] reqwest::Error),

	/// The appliance rejected the login exchange.
	#[error("Login failed with status {}", .status.as_u16())]
	LoginFailed { status: StatusCode },

	/// The login response carried no session cookie under the expected name.
	#[error("wg-easy cookie not found in response")]
	CookieNotFound,

	/// The appliance answered an API call with a non-success status.
	#[error("{operation} failed with status {}: {body}", .status.as_u16())]
	Api {
		operation: String,
		status: StatusCode,
		body: String,
	},

	/// The appliance answered 200 but reported `success: false`.
	#[error("wg-easy did not return success")]
	NotSuccessful,

	/// The response payload could not be parsed as expected.
	#[error("failed to parse response: {0}")]
	Parse(String),
}

impl WgEasyError {
	/// True when the appliance authoritatively rejected the stored
	/// username/password, as opposed to being unreachable or broken.
	pub fn is_credential_rejection(&self) -> bool {
		matches!(
			self,
			WgEasyError::LoginFailed { status }
				if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn login_failure_message_carries_numeric_status() {
		let err = WgEasyError::LoginFailed {
			status: StatusCode::SERVICE_UNAVAILABLE,
		};
		assert_eq!(err.to_string(), "Login failed with status 503");
	}

	#[test]
	fn api_failure_message_names_operation_and_body() {
		let err = WgEasyError::Api {
			operation: "create client".to_string(),
			status: StatusCode::BAD_REQUEST,
			body: "name already in use".to_string(),
		};
		assert_eq!(
			err.to_string(),
			"create client failed with status 400: name already in use"
		);
	}

	#[test]
	fn only_401_and_403_logins_count_as_credential_rejection() {
		let unauthorized = WgEasyError::LoginFailed {
			status: StatusCode::UNAUTHORIZED,
		};
		let forbidden = WgEasyError::LoginFailed {
			status: StatusCode::FORBIDDEN,
		};
		let unavailable = WgEasyError::LoginFailed {
			status: StatusCode::SERVICE_UNAVAILABLE,
		};

		assert!(unauthorized.is_credential_rejection());
		assert!(forbidden.is_credential_rejection());
		assert!(!unavailable.is_credential_rejection());
		assert!(!WgEasyError::CookieNotFound.is_credential_rejection());
	}
}
