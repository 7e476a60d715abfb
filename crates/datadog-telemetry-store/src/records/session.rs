// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;

use rusqlite::types::{Type, Value};
use rusqlite::Row;
use time::OffsetDateTime;

use super::{conversion_error, millis, opt_millis, opt_text, text, UnknownVariant};
use crate::error::StoreError;
use crate::identifiers::{ProcessIdentifier, SessionIdentifier};
use crate::record::Record;
use crate::timestamp::{from_millis, opt_from_millis};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Started while the app was not yet visible (e.g. a background launch).
    NotInForeground,
    Foreground,
    Background,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::NotInForeground => "not_in_foreground",
            SessionState::Foreground => "foreground",
            SessionState::Background => "background",
        }
    }
}

impl FromStr for SessionState {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "not_in_foreground" => Ok(SessionState::NotInForeground),
            "foreground" => Ok(SessionState::Foreground),
            "background" => Ok(SessionState::Background),
            other => Err(UnknownVariant {
                kind: "session state",
                value: other.to_string(),
            }),
        }
    }
}

/// One app-usage session, keyed by its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: SessionIdentifier,
    pub process_id: ProcessIdentifier,
    pub state: SessionState,
    pub trace_id: String,
    pub span_id: String,
    pub start_time: OffsetDateTime,
    pub end_time: Option<OffsetDateTime>,
    pub last_heartbeat_time: OffsetDateTime,
    pub crash_report_id: Option<String>,
    pub cold_start: bool,
    pub clean_exit: bool,
    pub app_terminated: bool,
}

impl SessionRecord {
    /// A freshly started session. The heartbeat starts at `start_time`.
    pub fn new(
        id: SessionIdentifier,
        process_id: ProcessIdentifier,
        state: SessionState,
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        start_time: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            process_id,
            state,
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            start_time,
            end_time: None,
            last_heartbeat_time: start_time,
            crash_report_id: None,
            cold_start: false,
            clean_exit: false,
            app_terminated: false,
        }
    }
}

impl Record for SessionRecord {
    const TABLE: &'static str = "sessions";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "process_id",
        "state",
        "trace_id",
        "span_id",
        "start_time",
        "end_time",
        "last_heartbeat_time",
        "crash_report_id",
        "cold_start",
        "clean_exit",
        "app_terminated",
    ];
    const KEY_COLUMNS: &'static [&'static str] = &["id"];

    fn values(&self) -> Result<Vec<Value>, StoreError> {
        Ok(vec![
            text(self.id.as_str()),
            text(self.process_id.as_str()),
            text(self.state.as_str()),
            text(self.trace_id.as_str()),
            text(self.span_id.as_str()),
            millis(self.start_time),
            opt_millis(self.end_time),
            millis(self.last_heartbeat_time),
            opt_text(self.crash_report_id.as_deref()),
            Value::Integer(i64::from(self.cold_start)),
            Value::Integer(i64::from(self.clean_exit)),
            Value::Integer(i64::from(self.app_terminated)),
        ])
    }

    fn key(&self) -> Vec<Value> {
        vec![text(self.id.as_str())]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let id = SessionIdentifier::new(row.get::<_, String>(0)?)
            .map_err(|err| conversion_error(0, Type::Text, err))?;
        let process_id = ProcessIdentifier::new(row.get::<_, String>(1)?)
            .map_err(|err| conversion_error(1, Type::Text, err))?;
        let state = row
            .get::<_, String>(2)?
            .parse()
            .map_err(|err| conversion_error(2, Type::Text, err))?;
        Ok(Self {
            id,
            process_id,
            state,
            trace_id: row.get(3)?,
            span_id: row.get(4)?,
            start_time: from_millis(5, row.get(5)?)?,
            end_time: opt_from_millis(6, row.get(6)?)?,
            last_heartbeat_time: from_millis(7, row.get(7)?)?,
            crash_report_id: row.get(8)?,
            cold_start: row.get(9)?,
            clean_exit: row.get(10)?,
            app_terminated: row.get(11)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_through_text() {
        for state in [
            SessionState::NotInForeground,
            SessionState::Foreground,
            SessionState::Background,
        ] {
            assert_eq!(state.as_str().parse::<SessionState>().unwrap(), state);
        }
        assert!("sleeping".parse::<SessionState>().is_err());
    }

    #[test]
    fn test_new_session_starts_heartbeat_at_start_time() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let session = SessionRecord::new(
            SessionIdentifier::random(),
            ProcessIdentifier::random(),
            SessionState::Foreground,
            "trace",
            "span",
            start,
        );
        assert_eq!(session.last_heartbeat_time, start);
        assert!(session.end_time.is_none());
        assert!(!session.clean_exit);
    }
}
