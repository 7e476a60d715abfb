// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use crate::error::StoreError;
use crate::identifiers::ProcessIdentifier;

/// Default file name used for on-disk stores.
pub const DEFAULT_FILE_NAME: &str = "telemetry.sqlite";

/// Where the store keeps its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMechanism {
    /// Named in-memory database. Contents vanish when the store is dropped.
    InMemory { name: String },
    /// SQLite file at `directory/file_name`.
    OnDisk {
        directory: PathBuf,
        file_name: String,
    },
}

impl StorageMechanism {
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::InMemory { name: name.into() }
    }

    pub fn on_disk(directory: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self::OnDisk {
            directory: directory.into(),
            file_name: file_name.into(),
        }
    }

    /// Full path of the backing file, `None` for in-memory stores.
    pub fn file_path(&self) -> Option<PathBuf> {
        match self {
            Self::InMemory { .. } => None,
            Self::OnDisk {
                directory,
                file_name,
            } => Some(directory.join(file_name)),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        match self {
            Self::InMemory { name } if name.trim().is_empty() => Err(StoreError::InvalidConfig(
                "in-memory store name cannot be empty".to_string(),
            )),
            Self::OnDisk { file_name, .. } if file_name.trim().is_empty() => Err(
                StoreError::InvalidConfig("store file name cannot be empty".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// Options used by [`Store::open`](crate::Store::open).
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub storage: StorageMechanism,
    /// Identifier of the running process; spans owned by any other value are orphans.
    pub process_id: ProcessIdentifier,
    /// Wipe and recreate the store when a migration fails instead of returning the error.
    pub reset_on_migration_failure: bool,
}

impl StoreOptions {
    pub fn new(storage: StorageMechanism, process_id: ProcessIdentifier) -> Self {
        Self {
            storage,
            process_id,
            reset_on_migration_failure: true,
        }
    }

    /// In-memory options with a fresh process id, handy for tests.
    pub fn ephemeral(name: impl Into<String>) -> Self {
        Self::new(StorageMechanism::in_memory(name), ProcessIdentifier::random())
    }
}
