// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery orchestration.
//!
//! Every enqueued payload goes through the same two steps, in order:
//!
//! 1. persist it in the [`UploadCache`]
//! 2. hand it to the [`Transport`]
//!
//! The send never starts before the persist finished, so a payload being sent
//! always has a cache record to be retried from. Once the transport answers,
//! the record is deleted (success) or its attempt count is updated (failure),
//! and only then is the caller's [`UploadTicket`] resolved.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use datadog_telemetry_store::{PendingUploadRecord, Store, StoreTask, UploadType};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::UploadError;
use crate::upload::cache::UploadCache;
use crate::upload::options::UploadOptions;
use crate::upload::reachability::{NetworkStatus, ReachabilityMonitor};
use crate::upload::transport::{Transport, UploadRequest};

/// Resolves once with the outcome of one enqueued upload.
#[derive(Debug)]
#[must_use = "the upload runs regardless, but its outcome is lost unless awaited"]
pub struct UploadTicket {
    rx: oneshot::Receiver<Result<(), UploadError>>,
}

impl Future for UploadTicket {
    type Output = Result<(), UploadError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the delivery task died with the runtime.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(UploadError::OperationCancelled)))
    }
}

/// Counters of one [`Uploader::retry_cached_data`] sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrySweep {
    pub resubmitted: usize,
    pub delivered: usize,
    /// Records with a type tag this build does not know.
    pub skipped: usize,
    /// Records dropped because they reached the retry cap.
    pub dropped: usize,
}

/// Persists and sends payloads. Clones share the same cache and transport.
#[derive(Clone)]
pub struct Uploader {
    inner: Arc<Inner>,
}

struct Inner {
    options: UploadOptions,
    cache: UploadCache,
    transport: Arc<dyn Transport>,
    runtime: Handle,
}

impl Uploader {
    /// Must be called from within a tokio runtime; deliveries run on it.
    pub fn new(
        options: UploadOptions,
        store: Store,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, UploadError> {
        let runtime = Handle::try_current().map_err(|_| UploadError::NoRuntime)?;
        let cache = UploadCache::new(store, options.cache);
        Ok(Self {
            inner: Arc::new(Inner {
                options,
                cache,
                transport,
                runtime,
            }),
        })
    }

    pub fn options(&self) -> &UploadOptions {
        &self.inner.options
    }

    pub fn cache(&self) -> &UploadCache {
        &self.inner.cache
    }

    /// Queues `payload` for delivery.
    ///
    /// Empty ids and payloads are rejected right away, before anything is
    /// written. Otherwise the returned ticket resolves exactly once.
    pub fn enqueue(
        &self,
        id: &str,
        payload: impl Into<Bytes>,
        upload_type: UploadType,
    ) -> Result<UploadTicket, UploadError> {
        let payload = payload.into();
        if id.is_empty() {
            return Err(UploadError::InvalidId);
        }
        if payload.is_empty() {
            return Err(UploadError::EmptyPayload);
        }

        // Queued on the store now, so persists keep enqueue order.
        let persisted = self
            .inner
            .cache
            .save_async(id, upload_type, payload.to_vec());
        let (tx, rx) = oneshot::channel();
        let this = self.clone();
        let id = id.to_string();
        self.inner.runtime.spawn(async move {
            let result = this.deliver(id, upload_type, payload, persisted).await;
            let _ = tx.send(result);
        });
        Ok(UploadTicket { rx })
    }

    pub fn upload_session(&self, id: &str, payload: impl Into<Bytes>) -> Result<UploadTicket, UploadError> {
        self.enqueue(id, payload, UploadType::Session)
    }

    pub fn upload_blob(&self, id: &str, payload: impl Into<Bytes>) -> Result<UploadTicket, UploadError> {
        self.enqueue(id, payload, UploadType::Blob)
    }

    pub fn upload_spans(&self, id: &str, payload: impl Into<Bytes>) -> Result<UploadTicket, UploadError> {
        self.enqueue(id, payload, UploadType::Spans)
    }

    pub fn upload_logs(&self, id: &str, payload: impl Into<Bytes>) -> Result<UploadTicket, UploadError> {
        self.enqueue(id, payload, UploadType::Logs)
    }

    /// Resubmits every cached payload, starting from its stored attempt count.
    ///
    /// Returns immediately; the handle resolves when every resubmitted payload
    /// got an answer from the transport.
    pub fn retry_cached_data(&self) -> JoinHandle<RetrySweep> {
        let this = self.clone();
        self.inner.runtime.spawn(async move { this.sweep().await })
    }

    /// Starts resubmitting cached payloads whenever `status` goes from
    /// unavailable to available. Returns `None` when that is disabled.
    pub fn watch_connectivity(
        &self,
        status: watch::Receiver<NetworkStatus>,
    ) -> Option<JoinHandle<()>> {
        if !self.inner.options.redundancy.retry_on_internet_connected {
            debug!("UPLOAD | Retry on connectivity is disabled");
            return None;
        }
        let this = self.clone();
        let monitor = ReachabilityMonitor::new(status, move || {
            // Not awaited: a sweep must not hold up the connectivity channel.
            drop(this.retry_cached_data());
        });
        Some(self.inner.runtime.spawn(monitor.run()))
    }

    async fn sweep(&self) -> RetrySweep {
        let records = match self.inner.cache.fetch_all_async().await {
            Ok(records) => records,
            Err(err) => {
                error!("UPLOAD | Failed to read cached uploads: {err}");
                return RetrySweep::default();
            }
        };

        let mut sweep = RetrySweep::default();
        let mut deliveries = JoinSet::new();
        for record in records {
            let Some(upload_type) = record.upload_type() else {
                debug!(
                    "UPLOAD | Skipping cached upload {} with unknown type {}",
                    record.id, record.type_tag
                );
                sweep.skipped += 1;
                continue;
            };
            if self.retry_cap_reached(record.attempt_count) {
                self.drop_record(&record.id, upload_type, record.attempt_count)
                    .await;
                sweep.dropped += 1;
                continue;
            }

            sweep.resubmitted += 1;
            let PendingUploadRecord { id, payload, .. } = record;
            let persisted = self.inner.cache.save_async(&id, upload_type, payload.clone());
            let this = self.clone();
            deliveries.spawn_on(
                async move {
                    this.deliver(id, upload_type, Bytes::from(payload), persisted)
                        .await
                },
                &self.inner.runtime,
            );
        }

        while let Some(result) = deliveries.join_next().await {
            if matches!(result, Ok(Ok(()))) {
                sweep.delivered += 1;
            }
        }
        info!(
            "UPLOAD | Retry sweep done: {} resubmitted, {} delivered, {} skipped, {} dropped",
            sweep.resubmitted, sweep.delivered, sweep.skipped, sweep.dropped
        );
        sweep
    }

    async fn deliver(
        &self,
        id: String,
        upload_type: UploadType,
        payload: Bytes,
        persisted: StoreTask<PendingUploadRecord>,
    ) -> Result<(), UploadError> {
        let attempt_count = match persisted.await {
            Ok(record) => record.attempt_count,
            Err(err) => {
                // Best effort: the send still happens, it just cannot be retried later.
                let err = UploadError::CacheWriteFailed(err);
                error!("UPLOAD | {err}, sending {id} anyway");
                0
            }
        };

        let request = UploadRequest {
            destination: self
                .inner
                .options
                .endpoints
                .endpoint_for(upload_type)
                .to_string(),
            identifier: id.clone(),
            upload_type,
            payload,
            metadata: self.inner.options.metadata.clone(),
            attempt_count,
        };
        let outcome = self.inner.transport.send(request).await;

        if outcome.is_success() {
            if let Err(err) = self.inner.cache.delete_async(&id, upload_type).await {
                error!("UPLOAD | Failed to remove delivered upload {id} from cache: {err}");
            }
            return Ok(());
        }

        if self.retry_cap_reached(outcome.attempt_count) {
            self.drop_record(&id, upload_type, outcome.attempt_count)
                .await;
        } else if let Err(err) = self
            .inner
            .cache
            .update_attempt_count_async(&id, upload_type, outcome.attempt_count)
            .await
        {
            error!("UPLOAD | Failed to update attempt count of {id}: {err}");
        }

        Err(match outcome.error {
            Some(err) => UploadError::SendFailed(err),
            None => UploadError::OperationCancelled,
        })
    }

    fn retry_cap_reached(&self, attempt_count: u32) -> bool {
        let cap = self.inner.options.redundancy.maximum_amount_of_retries;
        cap > 0 && attempt_count >= cap
    }

    async fn drop_record(&self, id: &str, upload_type: UploadType, attempt_count: u32) {
        warn!("UPLOAD | Dropping upload {id} after {attempt_count} attempts");
        if let Err(err) = self.inner.cache.delete_async(id, upload_type).await {
            error!("UPLOAD | Failed to drop upload {id}: {err}");
        }
    }
}
