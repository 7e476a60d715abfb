// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use rusqlite::types::{Type, Value};
use rusqlite::Row;
use time::OffsetDateTime;

use super::{conversion_error, millis, opt_millis, text};
use crate::error::StoreError;
use crate::identifiers::ProcessIdentifier;
use crate::record::Record;
use crate::timestamp::{from_millis, opt_from_millis};

/// One unit of work, keyed by `(id, trace_id)`.
///
/// A span without `end_time` is open. `data` is the serialized span as produced
/// by the tracing side and is never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanRecord {
    pub id: String,
    pub name: String,
    pub trace_id: String,
    pub kind: String,
    pub data: Vec<u8>,
    pub start_time: OffsetDateTime,
    pub end_time: Option<OffsetDateTime>,
    pub process_id: ProcessIdentifier,
}

impl SpanRecord {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

impl Record for SpanRecord {
    const TABLE: &'static str = "spans";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "trace_id",
        "kind",
        "data",
        "start_time",
        "end_time",
        "process_id",
    ];
    const KEY_COLUMNS: &'static [&'static str] = &["id", "trace_id"];

    fn values(&self) -> Result<Vec<Value>, StoreError> {
        Ok(vec![
            text(self.id.as_str()),
            text(self.name.as_str()),
            text(self.trace_id.as_str()),
            text(self.kind.as_str()),
            Value::Blob(self.data.clone()),
            millis(self.start_time),
            opt_millis(self.end_time),
            text(self.process_id.as_str()),
        ])
    }

    fn key(&self) -> Vec<Value> {
        vec![text(self.id.as_str()), text(self.trace_id.as_str())]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            trace_id: row.get(2)?,
            kind: row.get(3)?,
            data: row.get(4)?,
            start_time: from_millis(5, row.get(5)?)?,
            end_time: opt_from_millis(6, row.get(6)?)?,
            process_id: ProcessIdentifier::new(row.get::<_, String>(7)?)
                .map_err(|err| conversion_error(7, Type::Text, err))?,
        })
    }
}
