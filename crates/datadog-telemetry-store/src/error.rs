// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors emitted by the [`Store`](crate::Store) and its records.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing database could not be opened or read, and deleting it did not help.
    #[error("store is corrupt and could not be recreated: {0}")]
    Corrupt(#[source] rusqlite::Error),

    #[error("migration {version} ({name}) failed: {source}")]
    MigrationFailed {
        version: u32,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An identifier handed to the store was empty.
    #[error("{0} identifier must not be empty")]
    InvalidIdentifier(&'static str),

    #[error("unsupported storage configuration: {0}")]
    InvalidConfig(String),

    /// The serial worker owning the connection is gone.
    #[error("store worker is not running")]
    WorkerStopped,
}

impl StoreError {
    /// Returns true when the error came from the storage layer itself rather than the caller.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            StoreError::Corrupt(_) | StoreError::Sqlite(_) | StoreError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = StoreError::InvalidIdentifier("session");
        assert_eq!(error.to_string(), "session identifier must not be empty");

        let error = StoreError::MigrationFailed {
            version: 2,
            name: "add_spans",
            source: rusqlite::Error::InvalidQuery,
        };
        assert!(error.to_string().starts_with("migration 2 (add_spans) failed"));
    }

    #[test]
    fn test_storage_failure_classification() {
        assert!(StoreError::Sqlite(rusqlite::Error::InvalidQuery).is_storage_failure());
        assert!(!StoreError::WorkerStopped.is_storage_failure());
        assert!(!StoreError::InvalidIdentifier("process").is_storage_failure());
    }
}
