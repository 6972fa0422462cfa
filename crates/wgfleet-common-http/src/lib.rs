// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP utilities for wgfleet.
//!
//! This crate provides a pre-configured HTTP client with a consistent
//! User-Agent header. There is deliberately no retry layer: callers talk to
//! remote wg-easy appliances, and every failure must surface to the caller
//! exactly once.

mod client;

pub use client::{builder, new_client, new_client_with_timeout, user_agent};
