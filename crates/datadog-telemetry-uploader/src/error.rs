// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use datadog_telemetry_store::StoreError;

/// Failure reported to the caller of an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload identifier must not be empty")]
    InvalidId,

    #[error("upload payload must not be empty")]
    EmptyPayload,

    #[error("failed to send payload: {0}")]
    SendFailed(#[source] TransportError),

    #[error("upload operation was cancelled")]
    OperationCancelled,

    #[error("failed to write payload to the upload cache: {0}")]
    CacheWriteFailed(#[source] StoreError),

    #[error("uploads need a running tokio runtime")]
    NoRuntime,
}

/// Failure of a single transport attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("{status}: unexpected response: {body}")]
    Status { status: u16, body: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Whether sending the same payload again could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) => true,
            TransportError::Status { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            TransportError::InvalidRequest(_) => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BatcherError {
    /// The log could not be persisted. It was still added to the batch.
    #[error("failed to persist log: {0}")]
    Store(#[from] StoreError),

    #[error("log batcher is not running")]
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
