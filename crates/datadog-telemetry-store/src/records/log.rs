// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use rusqlite::types::{Type, Value};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{conversion_error, millis, opt_text, text};
use crate::error::StoreError;
use crate::identifiers::ProcessIdentifier;
use crate::record::Record;
use crate::timestamp::from_millis;

/// Scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Double(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

/// Severity numbers follow the OpenTelemetry log data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogSeverity {
    Trace = 1,
    Debug = 5,
    Info = 9,
    Warn = 13,
    Error = 17,
    Fatal = 21,
}

impl LogSeverity {
    pub fn number(&self) -> i64 {
        *self as i64
    }

    /// Maps any severity number onto its bucket.
    pub fn from_number(number: i64) -> Self {
        match number {
            i64::MIN..=4 => LogSeverity::Trace,
            5..=8 => LogSeverity::Debug,
            9..=12 => LogSeverity::Info,
            13..=16 => LogSeverity::Warn,
            17..=20 => LogSeverity::Error,
            _ => LogSeverity::Fatal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstrumentationScope {
    pub name: String,
    pub version: Option<String>,
}

/// A captured log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub id: String,
    pub process_id: ProcessIdentifier,
    pub severity: LogSeverity,
    pub body: String,
    pub timestamp: OffsetDateTime,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub resource: BTreeMap<String, AttributeValue>,
    pub scope: Option<InstrumentationScope>,
}

impl LogRecord {
    /// A log with a generated id and no attributes.
    pub fn new(
        process_id: ProcessIdentifier,
        severity: LogSeverity,
        body: impl Into<String>,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            process_id,
            severity,
            body: body.into(),
            timestamp,
            attributes: BTreeMap::new(),
            resource: BTreeMap::new(),
            scope: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl Record for LogRecord {
    const TABLE: &'static str = "logs";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "process_id",
        "severity",
        "body",
        "timestamp",
        "attributes",
        "resource",
        "scope_name",
        "scope_version",
    ];
    const KEY_COLUMNS: &'static [&'static str] = &["id"];

    fn values(&self) -> Result<Vec<Value>, StoreError> {
        Ok(vec![
            text(self.id.as_str()),
            text(self.process_id.as_str()),
            Value::Integer(self.severity.number()),
            text(self.body.as_str()),
            millis(self.timestamp),
            text(serde_json::to_string(&self.attributes)?),
            text(serde_json::to_string(&self.resource)?),
            opt_text(self.scope.as_ref().map(|scope| scope.name.as_str())),
            opt_text(self.scope.as_ref().and_then(|scope| scope.version.as_deref())),
        ])
    }

    fn key(&self) -> Vec<Value> {
        vec![text(self.id.as_str())]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let attributes = serde_json::from_str(&row.get::<_, String>(5)?)
            .map_err(|err| conversion_error(5, Type::Text, err))?;
        let resource = serde_json::from_str(&row.get::<_, String>(6)?)
            .map_err(|err| conversion_error(6, Type::Text, err))?;
        let scope = row
            .get::<_, Option<String>>(7)?
            .map(|name| -> rusqlite::Result<InstrumentationScope> {
                Ok(InstrumentationScope {
                    name,
                    version: row.get(8)?,
                })
            })
            .transpose()?;
        Ok(Self {
            id: row.get(0)?,
            process_id: ProcessIdentifier::new(row.get::<_, String>(1)?)
                .map_err(|err| conversion_error(1, Type::Text, err))?,
            severity: LogSeverity::from_number(row.get(2)?),
            body: row.get(3)?,
            timestamp: from_millis(4, row.get(4)?)?,
            attributes,
            resource,
            scope,
        })
    }
}
