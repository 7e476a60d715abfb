// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use rusqlite::types::Value;
use rusqlite::Row;
use time::OffsetDateTime;

use super::{millis, text};
use crate::error::StoreError;
use crate::record::Record;
use crate::timestamp::from_millis;

/// Kind of payload waiting for delivery. Persisted as an integer tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadType {
    Session,
    Blob,
    Spans,
    Logs,
}

impl UploadType {
    pub fn tag(&self) -> i64 {
        match self {
            UploadType::Session => 0,
            UploadType::Blob => 1,
            UploadType::Spans => 2,
            UploadType::Logs => 3,
        }
    }

    pub fn from_tag(tag: i64) -> Option<Self> {
        match tag {
            0 => Some(UploadType::Session),
            1 => Some(UploadType::Blob),
            2 => Some(UploadType::Spans),
            3 => Some(UploadType::Logs),
            _ => None,
        }
    }
}

/// A payload persisted until its delivery is confirmed, keyed by `(id, type_tag)`.
///
/// The raw tag is kept so rows written by a newer build survive in the table
/// even though this build cannot send them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUploadRecord {
    pub id: String,
    pub type_tag: i64,
    pub payload: Vec<u8>,
    pub attempt_count: u32,
    pub created_at: OffsetDateTime,
}

impl PendingUploadRecord {
    pub fn new(id: impl Into<String>, upload_type: UploadType, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            type_tag: upload_type.tag(),
            payload,
            attempt_count: 0,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn upload_type(&self) -> Option<UploadType> {
        UploadType::from_tag(self.type_tag)
    }
}

impl Record for PendingUploadRecord {
    const TABLE: &'static str = "pending_uploads";
    const COLUMNS: &'static [&'static str] = &["id", "type", "data", "attempt_count", "created_at"];
    const KEY_COLUMNS: &'static [&'static str] = &["id", "type"];

    fn values(&self) -> Result<Vec<Value>, StoreError> {
        Ok(vec![
            text(self.id.as_str()),
            Value::Integer(self.type_tag),
            Value::Blob(self.payload.clone()),
            Value::Integer(i64::from(self.attempt_count)),
            millis(self.created_at),
        ])
    }

    fn key(&self) -> Vec<Value> {
        vec![text(self.id.as_str()), Value::Integer(self.type_tag)]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            type_tag: row.get(1)?,
            payload: row.get(2)?,
            attempt_count: row.get(3)?,
            created_at: from_millis(4, row.get(4)?)?,
        })
    }
}
