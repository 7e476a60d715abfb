// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching and delivery of client-side telemetry.
//!
//! Logs flow through the [`logs`] batcher; serialized payloads of any kind go
//! through the [`upload`] pipeline, which persists them in the upload cache
//! before sending and re-drives whatever is left when connectivity returns.
//! Everything durable lives in a [`datadog_telemetry_store::Store`].

#![deny(clippy::all)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod config;
pub mod error;
pub mod logger;
pub mod logs;
pub mod upload;

pub use config::TelemetryConfig;
pub use error::{BatcherError, ConfigError, TransportError, UploadError};
pub use logs::{LogBatch, LogBatchDelegate, LogBatchLimits, LogBatcherHandle, LogBatcherService, LogShipper};
pub use upload::{HttpTransport, RetrySweep, UploadTicket, UploadType, Uploader};
