// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Secret wrapper for credential strings.
//!
//! Appliance passwords and session cookies pass through every layer of this
//! workspace; wrapping them ensures they:
//!
//! - Never appear in logs (redacted Debug/Display)
//! - Are zeroized from memory on drop
//! - Require an explicit `.expose()` call to access the inner value

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The redaction placeholder used in all output.
pub const REDACTED: &str = "[REDACTED]";

/// A credential string that prevents accidental exposure.
///
/// # Example
///
/// ```
/// use wgfleet_server_wgeasy::SecretString;
///
/// let password = SecretString::new("hunter2");
///
/// // Debug and Display are redacted
/// assert_eq!(format!("{:?}", password), "SecretString(\"[REDACTED]\")");
/// assert_eq!(format!("{}", password), "[REDACTED]");
///
/// // Must explicitly expose to use the value
/// assert_eq!(password.expose(), "hunter2");
/// ```
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretString {
	inner: String,
}

impl SecretString {
	/// Create a new secret wrapper around the given value.
	pub fn new(inner: impl Into<String>) -> Self {
		Self {
			inner: inner.into(),
		}
	}

	/// Explicitly access the inner value.
	///
	/// Call sites must opt-in to seeing the secret by calling this method.
	/// This makes secret access visible in code review.
	pub fn expose(&self) -> &str {
		&self.inner
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("SecretString").field(&REDACTED).finish()
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}
