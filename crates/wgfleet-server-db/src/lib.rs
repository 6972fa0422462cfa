// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! # wgfleet-server-db
//!
//! Local registry persistence for wgfleet using SQLite via sqlx. The registry
//! holds the three locally-owned entities: remote wg-easy servers (including
//! their cached session state and health fields), logical users, and the
//! bindings that tie a logical user to one peer on one server.
//!
//! ## Repository Pattern
//!
//! The domain has two components:
//! - **`RegistryStore` trait**: defines the interface
//! - **`RegistryRepository` struct**: concrete implementation holding a `SqlitePool`
//!
//! Repository methods return raw row tuples; converting rows into domain
//! types (and parsing stored timestamps) is the service layer's job.
//!
//! ## Error Handling
//!
//! Use [`DbError`] variants appropriately:
//!
//! | Variant | When to use |
//! |---------|-------------|
//! | `Sqlx` | Let sqlx errors propagate via `?` for unexpected database errors |
//! | `Internal` | Invalid connection URL, unreadable stored data |
//!
//! Absence is never an error at this layer: lookups return `Result<Option<T>>`
//! and updates/deletes report rows affected, so not-found decisions stay with
//! the service layer.
//!
//! ## Return Type Conventions
//!
//! | Operation | Return type |
//! |-----------|-------------|
//! | Get by ID/unique key | `Result<Option<T>>` |
//! | List | `Result<Vec<T>>` |
//! | Insert | `Result<i64>` (generated rowid) |
//! | Update/delete | `Result<u64>` (rows affected) |
//!
//! ## Testing
//!
//! Tests use in-memory SQLite with the schema from [`ensure_schema`]:
//!
//! ```rust,ignore
//! let pool = SqlitePool::connect(":memory:").await.unwrap();
//! ensure_schema(&pool).await.unwrap();
//! let repo = RegistryRepository::new(pool);
//! ```
//!
//! ## Instrumentation
//!
//! All public repository methods carry `#[tracing::instrument]`, skipping
//! `self` and credential arguments and recording identifying fields.

mod error;
pub mod pool;
pub mod registry;
pub mod schema;

pub use error::{DbError, Result};
pub use pool::create_pool;
pub use registry::{
	BindingRowTuple, RegistryRepository, RegistryStore, ServerRowTuple, UserRowTuple,
};
pub use schema::ensure_schema;
