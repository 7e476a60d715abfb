// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Connection ownership, corruption recovery and resets.
//!
//! A [`Database`] lives on the store worker thread and is only ever touched by
//! jobs running there.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tracing::{error, warn};

use crate::error::StoreError;
use crate::migrations::{self, Migration};
use crate::options::StorageMechanism;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// The connection plus the location it was opened from.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
    storage: StorageMechanism,
}

impl Database {
    /// Opens the database, deleting and recreating it once if the first attempt fails.
    pub(crate) fn open(storage: &StorageMechanism) -> Result<Self, StoreError> {
        storage.validate()?;
        if let Some(parent) = storage.file_path().as_deref().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = match open_connection(storage) {
            Ok(conn) => conn,
            Err(err) => {
                error!("STORE | Failed to open store, recreating it from scratch: {err}");
                remove_files(storage)?;
                open_connection(storage).map_err(StoreError::Corrupt)?
            }
        };

        Ok(Self {
            conn,
            storage: storage.clone(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn storage(&self) -> &StorageMechanism {
        &self.storage
    }

    /// Drops every table by deleting the backing file and reopening an empty database.
    pub(crate) fn reset(&mut self) -> Result<(), StoreError> {
        let previous = std::mem::replace(&mut self.conn, Connection::open_in_memory()?);
        if let Err((_, err)) = previous.close() {
            warn!("STORE | Failed to close connection before reset: {err}");
        }
        remove_files(&self.storage)?;
        self.conn = open_connection(&self.storage).map_err(StoreError::Corrupt)?;
        Ok(())
    }

    /// Runs `migrations`; on failure wipes the database and runs them again once
    /// when `reset_if_error` is set.
    pub(crate) fn migrate(
        &mut self,
        migrations: &[Migration],
        reset_if_error: bool,
    ) -> Result<u32, StoreError> {
        match migrations::apply(&mut self.conn, migrations) {
            Ok(version) => Ok(version),
            Err(err) if reset_if_error => {
                error!("STORE | Migration failed, resetting store: {err}");
                self.reset()?;
                migrations::apply(&mut self.conn, migrations)
            }
            Err(err) => Err(err),
        }
    }
}

fn open_connection(storage: &StorageMechanism) -> rusqlite::Result<Connection> {
    let conn = match storage {
        StorageMechanism::InMemory { name } => Connection::open_with_flags(
            format!("file:{name}?mode=memory&cache=shared"),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?,
        StorageMechanism::OnDisk {
            directory,
            file_name,
        } => {
            let conn = Connection::open(directory.join(file_name))?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            conn
        }
    };
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    // SQLite opens lazily; reading the schema is what surfaces a damaged file.
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(conn)
}

fn remove_files(storage: &StorageMechanism) -> Result<(), StoreError> {
    let Some(path) = storage.file_path() else {
        return Ok(());
    };
    for candidate in [
        path.clone(),
        sibling(&path, "-wal"),
        sibling(&path, "-shm"),
    ] {
        match fs::remove_file(&candidate) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_missing_directories() {
        let dir = TempDir::new().unwrap();
        let storage = StorageMechanism::on_disk(dir.path().join("a/b"), "store.sqlite");

        Database::open(&storage).unwrap();

        assert!(dir.path().join("a/b/store.sqlite").exists());
    }

    #[test]
    fn test_open_recreates_corrupted_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.sqlite");
        fs::write(&path, b"definitely not a sqlite database, just some bytes").unwrap();
        let storage = StorageMechanism::on_disk(dir.path(), "store.sqlite");

        let db = Database::open(&storage).unwrap();

        let tables: i64 = db
            .connection()
            .query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[test]
    fn test_reset_empties_in_memory_database() {
        let storage = StorageMechanism::in_memory("database-reset-test");
        let mut db = Database::open(&storage).unwrap();
        db.connection()
            .execute_batch("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1);")
            .unwrap();

        db.reset().unwrap();

        let tables: i64 = db
            .connection()
            .query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[test]
    fn test_migrate_resets_on_failure_when_allowed() {
        let broken = [Migration {
            version: 1,
            name: "broken",
            sql: "NOT SQL",
        }];
        let storage = StorageMechanism::in_memory("database-migrate-test");
        let mut db = Database::open(&storage).unwrap();

        assert!(db.migrate(&broken, false).is_err());
        // Resetting does not fix a broken migration, so the second run fails too.
        assert!(matches!(
            db.migrate(&broken, true),
            Err(StoreError::MigrationFailed { version: 1, .. })
        ));
    }
}
