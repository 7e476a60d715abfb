// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Versioned schema migrations.
//!
//! The applied version lives in `PRAGMA user_version`. Every pending migration
//! runs in its own transaction together with the version bump, so a failure
//! leaves the schema at the last fully applied version.

use rusqlite::Connection;
use tracing::debug;

use crate::error::StoreError;

/// One schema step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_sessions",
        sql: "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY NOT NULL,
                process_id TEXT NOT NULL,
                state TEXT NOT NULL,
                trace_id TEXT NOT NULL,
                span_id TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                last_heartbeat_time INTEGER NOT NULL,
                crash_report_id TEXT,
                cold_start INTEGER NOT NULL DEFAULT 0,
                clean_exit INTEGER NOT NULL DEFAULT 0,
                app_terminated INTEGER NOT NULL DEFAULT 0
              );",
    },
    Migration {
        version: 2,
        name: "create_spans",
        sql: "CREATE TABLE IF NOT EXISTS spans (
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                trace_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                data BLOB NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                process_id TEXT NOT NULL,
                PRIMARY KEY (id, trace_id)
              );
              CREATE INDEX IF NOT EXISTS spans_end_time ON spans (end_time);",
    },
    Migration {
        version: 3,
        name: "create_metadata",
        sql: "CREATE TABLE IF NOT EXISTS metadata (
                id TEXT PRIMARY KEY NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                type TEXT NOT NULL,
                lifespan TEXT NOT NULL,
                lifespan_id TEXT NOT NULL,
                collected_at INTEGER NOT NULL,
                UNIQUE (key, type, lifespan, lifespan_id)
              );",
    },
    Migration {
        version: 4,
        name: "create_logs",
        sql: "CREATE TABLE IF NOT EXISTS logs (
                id TEXT PRIMARY KEY NOT NULL,
                process_id TEXT NOT NULL,
                severity INTEGER NOT NULL,
                body TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                attributes TEXT NOT NULL,
                resource TEXT NOT NULL,
                scope_name TEXT,
                scope_version TEXT
              );",
    },
    Migration {
        version: 5,
        name: "create_pending_uploads",
        sql: "CREATE TABLE IF NOT EXISTS pending_uploads (
                id TEXT NOT NULL,
                type INTEGER NOT NULL,
                data BLOB NOT NULL,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (id, type)
              );
              CREATE INDEX IF NOT EXISTS pending_uploads_created_at ON pending_uploads (created_at);",
    },
];

/// The migrations shipped with this crate, in version order.
pub fn migrations() -> &'static [Migration] {
    MIGRATIONS
}

pub(crate) fn schema_version(conn: &Connection) -> Result<u32, StoreError> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Applies every migration newer than the current schema version.
///
/// Returns the schema version after the run.
pub(crate) fn apply(conn: &mut Connection, migrations: &[Migration]) -> Result<u32, StoreError> {
    let mut pending: Vec<&Migration> = migrations.iter().collect();
    pending.sort_by_key(|migration| migration.version);

    let current = schema_version(conn)?;
    let mut version = current;
    for migration in pending.into_iter().filter(|m| m.version > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|source| StoreError::MigrationFailed {
                version: migration.version,
                name: migration.name,
                source,
            })?;
        tx.pragma_update(None, "user_version", migration.version)?;
        tx.commit()?;
        debug!(
            "STORE | Applied migration {} ({})",
            migration.version, migration.name
        );
        version = migration.version;
    }
    Ok(version)
}
