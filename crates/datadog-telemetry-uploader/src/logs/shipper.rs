// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use datadog_telemetry_store::{AttributeValue, LogRecord, Store};
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, error};

use crate::logs::batcher::{LogBatch, LogBatchDelegate};
use crate::upload::Uploader;

#[derive(Serialize)]
struct ScopePayload<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
}

#[derive(Serialize)]
struct LogPayload<'a> {
    id: &'a str,
    process_id: &'a str,
    severity_number: i64,
    body: &'a str,
    /// Unix milliseconds.
    timestamp: i64,
    attributes: &'a BTreeMap<String, AttributeValue>,
    resource: &'a BTreeMap<String, AttributeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<ScopePayload<'a>>,
}

impl<'a> From<&'a LogRecord> for LogPayload<'a> {
    fn from(log: &'a LogRecord) -> Self {
        Self {
            id: &log.id,
            process_id: log.process_id.as_str(),
            severity_number: log.severity.number(),
            body: &log.body,
            timestamp: (log.timestamp.unix_timestamp_nanos() / 1_000_000) as i64,
            attributes: &log.attributes,
            resource: &log.resource,
            scope: log.scope.as_ref().map(|scope| ScopePayload {
                name: &scope.name,
                version: scope.version.as_deref(),
            }),
        }
    }
}

/// Encodes a batch as a JSON array of logs.
pub fn encode_batch(batch: &LogBatch) -> Result<Vec<u8>, serde_json::Error> {
    let payloads: Vec<LogPayload<'_>> = batch.logs().iter().map(LogPayload::from).collect();
    serde_json::to_vec(&payloads)
}

/// Hands finished batches to the [`Uploader`].
///
/// Once a batch is accepted, its logs are removed from the store. The removal
/// is queued behind the cache write on the same store worker, so the payload
/// is durable before the individual rows go away.
pub struct LogShipper {
    uploader: Uploader,
    store: Store,
}

impl LogShipper {
    pub fn new(uploader: Uploader, store: Store) -> Self {
        Self { uploader, store }
    }
}

impl LogBatchDelegate for LogShipper {
    fn batch_finished(&self, batch: LogBatch) {
        let Some(first) = batch.logs().first() else {
            return;
        };
        let upload_id = format!("logs-{}", first.id);

        let payload = match encode_batch(&batch) {
            Ok(payload) => payload,
            Err(e) => {
                error!("LOGS | Failed to encode batch {upload_id}: {e}");
                return;
            }
        };

        if let Err(e) = self.uploader.upload_logs(&upload_id, payload) {
            error!("LOGS | Failed to enqueue batch {upload_id}: {e}");
            return;
        }
        debug!("LOGS | Enqueued batch {upload_id} with {} logs", batch.len());

        let ids = batch.into_logs().into_iter().map(|log| log.id).collect();
        let removal = self.store.remove_logs_async(ids);
        if let Ok(runtime) = Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = removal.await {
                    error!("LOGS | Failed to remove shipped logs of {upload_id}: {e}");
                }
            });
        }
    }
}
