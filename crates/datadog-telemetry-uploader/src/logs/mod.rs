// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log batching.
//!
//! Logs are persisted through a [`LogRepository`] and grouped into batches
//! bounded by count and age. A [`LogBatchDelegate`] receives every finished
//! batch and decides how to ship it; [`LogShipper`] encodes it and hands it
//! to the uploader.

pub mod batcher;
pub mod repository;
pub mod shipper;

pub use batcher::{
    BatcherCommand, LogBatch, LogBatchDelegate, LogBatchLimits, LogBatcherHandle,
    LogBatcherService,
};
pub use repository::LogRepository;
pub use shipper::{encode_batch, LogShipper};
