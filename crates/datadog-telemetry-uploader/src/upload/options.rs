// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use datadog_telemetry_store::UploadType;

use crate::upload::backoff::{BackoffPolicy, ExponentialBackoff};

/// Collector URLs, one per payload kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEndpoints {
    pub sessions: String,
    pub blobs: String,
    pub spans: String,
    pub logs: String,
}

impl UploadEndpoints {
    /// Endpoints under a common base URL.
    pub fn from_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            sessions: format!("{base}/v2/sessions"),
            blobs: format!("{base}/v2/blobs"),
            spans: format!("{base}/v2/spans"),
            logs: format!("{base}/v2/logs"),
        }
    }

    pub fn endpoint_for(&self, upload_type: UploadType) -> &str {
        match upload_type {
            UploadType::Session => &self.sessions,
            UploadType::Blob => &self.blobs,
            UploadType::Spans => &self.spans,
            UploadType::Logs => &self.logs,
        }
    }
}

/// Identity sent along with every payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataOptions {
    pub api_key: String,
    pub device_id: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Maximum number of pending uploads kept on disk. `0` disables the bound.
    pub cache_limit: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self { cache_limit: 200 }
    }
}

/// How hard delivery is retried.
#[derive(Clone)]
pub struct RedundancyOptions {
    /// Immediate retries performed by the transport within one send.
    pub automatic_retry_count: u32,
    /// Once a payload has been attempted this many times its cache record is dropped.
    /// `0` keeps it forever.
    pub maximum_amount_of_retries: u32,
    /// Resubmit cached payloads whenever connectivity comes back.
    pub retry_on_internet_connected: bool,
    pub backoff: Arc<dyn BackoffPolicy>,
}

impl Default for RedundancyOptions {
    fn default() -> Self {
        Self {
            automatic_retry_count: 3,
            maximum_amount_of_retries: 20,
            retry_on_internet_connected: true,
            backoff: Arc::new(ExponentialBackoff::default()),
        }
    }
}

impl std::fmt::Debug for RedundancyOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedundancyOptions")
            .field("automatic_retry_count", &self.automatic_retry_count)
            .field("maximum_amount_of_retries", &self.maximum_amount_of_retries)
            .field(
                "retry_on_internet_connected",
                &self.retry_on_internet_connected,
            )
            .finish_non_exhaustive()
    }
}

/// Everything an [`Uploader`](crate::upload::Uploader) is configured with.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub endpoints: UploadEndpoints,
    pub metadata: MetadataOptions,
    pub cache: CacheOptions,
    pub redundancy: RedundancyOptions,
}
