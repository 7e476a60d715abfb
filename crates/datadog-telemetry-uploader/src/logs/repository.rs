// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use datadog_telemetry_store::{LogRecord, Store, StoreError};

/// Where the batcher persists logs before batching them.
#[async_trait]
pub trait LogRepository: Send + Sync {
    async fn create_log(&self, log: LogRecord) -> Result<(), StoreError>;
}

#[async_trait]
impl LogRepository for Store {
    async fn create_log(&self, log: LogRecord) -> Result<(), StoreError> {
        self.create_log_async(log).await
    }
}
