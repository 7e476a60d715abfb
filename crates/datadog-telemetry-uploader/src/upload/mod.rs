// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Durable, retried delivery of serialized payloads.

pub mod backoff;
pub mod cache;
pub mod http;
pub mod options;
pub mod reachability;
pub mod transport;
pub mod uploader;

pub use backoff::{BackoffPolicy, ExponentialBackoff};
pub use cache::UploadCache;
pub use http::HttpTransport;
pub use options::{CacheOptions, MetadataOptions, RedundancyOptions, UploadEndpoints, UploadOptions};
pub use reachability::{NetworkStatus, ReachabilityMonitor};
pub use transport::{SendOutcome, Transport, UploadRequest};
pub use uploader::{RetrySweep, UploadTicket, Uploader};
pub use datadog_telemetry_store::UploadType;
