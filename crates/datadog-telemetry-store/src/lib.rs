// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Durable record store for client-side telemetry.
//!
//! Sessions, spans, logs, metadata and payloads waiting for upload are kept in
//! an embedded SQLite database. The store is the single source of truth for
//! everything that has to survive a crash or a restart.
//!
//! # Modules
//!
//! - [`store`]: the [`Store`] handle and its domain operations
//! - [`records`]: persisted record types
//! - [`record`]: the table mapping shared by all records
//! - [`migrations`]: versioned schema
//! - [`options`]: where and how a store is opened
//!
//! # Recovery
//!
//! A database that cannot be opened is deleted and recreated once, and a
//! migration failure wipes the store by default. Losing local telemetry is
//! preferred over failing to start.
//!
//! # Concurrency
//!
//! One worker thread owns the connection and runs jobs in submission order.
//! There are no locks around the database.

#![deny(clippy::all)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod database;
pub mod error;
pub mod identifiers;
pub mod migrations;
pub mod options;
pub mod record;
pub mod records;
pub mod store;
mod timestamp;
mod worker;

pub use database::Database;
pub use error::StoreError;
pub use identifiers::{ProcessIdentifier, SessionIdentifier};
pub use migrations::Migration;
pub use options::{StorageMechanism, StoreOptions, DEFAULT_FILE_NAME};
pub use record::Record;
pub use records::*;
pub use store::Store;
pub use timestamp::truncate_to_millis;
pub use worker::StoreTask;
