// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Persisted record types.

pub mod log;
pub mod metadata;
pub mod session;
pub mod span;
pub mod upload;

use rusqlite::types::{Type, Value};

pub use log::{AttributeValue, InstrumentationScope, LogRecord, LogSeverity};
pub use metadata::{MetadataLifespan, MetadataRecord, MetadataType};
pub use session::{SessionRecord, SessionState};
pub use span::SpanRecord;
pub use upload::{PendingUploadRecord, UploadType};

/// A stored enum value that this build does not know about.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

pub(crate) fn conversion_error<E>(column: usize, kind: Type, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, kind, Box::new(err))
}

pub(crate) fn text(value: impl Into<String>) -> Value {
    Value::Text(value.into())
}

pub(crate) fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |value| Value::Text(value.to_string()))
}

pub(crate) fn opt_millis(value: Option<time::OffsetDateTime>) -> Value {
    value.map_or(Value::Null, |value| {
        Value::Integer(crate::timestamp::to_millis(value))
    })
}

pub(crate) fn millis(value: time::OffsetDateTime) -> Value {
    Value::Integer(crate::timestamp::to_millis(value))
}
