// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The seam between the orchestrator and the network.

use async_trait::async_trait;
use bytes::Bytes;
use datadog_telemetry_store::UploadType;

use crate::error::TransportError;
use crate::upload::options::MetadataOptions;

/// One payload to hand to the network.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub destination: String,
    pub identifier: String,
    pub upload_type: UploadType,
    pub payload: Bytes,
    pub metadata: MetadataOptions,
    /// Attempts already made for this payload, possibly in earlier launches.
    pub attempt_count: u32,
}

/// What happened to a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub cancelled: bool,
    /// Total attempts made for the payload, including earlier ones.
    pub attempt_count: u32,
    pub error: Option<TransportError>,
}

impl SendOutcome {
    pub fn delivered(attempt_count: u32) -> Self {
        Self {
            cancelled: false,
            attempt_count,
            error: None,
        }
    }

    pub fn failed(attempt_count: u32, error: TransportError) -> Self {
        Self {
            cancelled: false,
            attempt_count,
            error: Some(error),
        }
    }

    pub fn cancelled(attempt_count: u32, error: Option<TransportError>) -> Self {
        Self {
            cancelled: true,
            attempt_count,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.error.is_none()
    }
}

/// Sends payloads. Implementations may retry internally but must report the
/// final attempt count.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: UploadRequest) -> SendOutcome;
}
