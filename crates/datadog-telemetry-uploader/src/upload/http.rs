// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! reqwest-backed [`Transport`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::TransportError;
use crate::upload::backoff::BackoffPolicy;
use crate::upload::options::RedundancyOptions;
use crate::upload::transport::{SendOutcome, Transport, UploadRequest};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// POSTs payloads, retrying retryable failures up to `automatic_retry_count`
/// times with the configured backoff in between.
pub struct HttpTransport {
    client: reqwest::Client,
    automatic_retry_count: u32,
    backoff: Arc<dyn BackoffPolicy>,
    cancel: CancellationToken,
}

impl HttpTransport {
    pub fn new(redundancy: &RedundancyOptions) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|err| TransportError::InvalidRequest(err.to_string()))?;
        Ok(Self::with_client(client, redundancy))
    }

    pub fn with_client(client: reqwest::Client, redundancy: &RedundancyOptions) -> Self {
        Self {
            client,
            automatic_retry_count: redundancy.automatic_retry_count,
            backoff: Arc::clone(&redundancy.backoff),
            cancel: CancellationToken::new(),
        }
    }

    /// Cancels in-flight and future sends. They report `cancelled`.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn attempt(&self, request: &UploadRequest) -> Result<(), TransportError> {
        let mut builder = self
            .client
            .post(&request.destination)
            .header(CONTENT_TYPE, "application/json")
            .header("DD-UPLOAD-ID", &request.identifier)
            .body(request.payload.clone());
        let metadata = &request.metadata;
        if !metadata.user_agent.is_empty() {
            builder = builder.header(USER_AGENT, &metadata.user_agent);
        }
        if !metadata.api_key.is_empty() {
            builder = builder.header("DD-API-KEY", &metadata.api_key);
        }
        if !metadata.device_id.is_empty() {
            builder = builder.header("DD-DEVICE-ID", &metadata.device_id);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_builder() {
                TransportError::InvalidRequest(err.to_string())
            } else {
                TransportError::Network(err.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: UploadRequest) -> SendOutcome {
        let mut attempt_count = request.attempt_count;
        let mut retries_left = self.automatic_retry_count;

        loop {
            if self.cancel.is_cancelled() {
                return SendOutcome::cancelled(attempt_count, None);
            }
            attempt_count = attempt_count.saturating_add(1);
            let started = Instant::now();
            let result = tokio::select! {
                () = self.cancel.cancelled() => return SendOutcome::cancelled(attempt_count, None),
                result = self.attempt(&request) => result,
            };

            let err = match result {
                Ok(()) => {
                    debug!(
                        "UPLOAD | Sent {} in {} ms (attempt {attempt_count})",
                        request.identifier,
                        started.elapsed().as_millis()
                    );
                    return SendOutcome::delivered(attempt_count);
                }
                Err(err) => err,
            };

            if retries_left == 0 || !err.is_retryable() {
                error!(
                    "UPLOAD | Failed to send {} after {attempt_count} attempts: {err}",
                    request.identifier
                );
                return SendOutcome::failed(attempt_count, err);
            }
            retries_left -= 1;
            let delay = self.backoff.delay(attempt_count);
            warn!(
                "UPLOAD | Attempt {attempt_count} for {} failed: {err}, retrying in {} ms",
                request.identifier,
                delay.as_millis()
            );
            tokio::select! {
                () = self.cancel.cancelled() => return SendOutcome::cancelled(attempt_count, Some(err)),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
