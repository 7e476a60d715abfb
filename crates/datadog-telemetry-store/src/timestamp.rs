// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Timestamps are persisted as INTEGER unix milliseconds.

use rusqlite::types::Type;
use time::OffsetDateTime;

pub(crate) fn to_millis(value: OffsetDateTime) -> i64 {
    (value.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_millis(column: usize, millis: i64) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(column, Type::Integer, Box::new(err)))
}

pub(crate) fn opt_from_millis(
    column: usize,
    millis: Option<i64>,
) -> rusqlite::Result<Option<OffsetDateTime>> {
    millis.map(|value| from_millis(column, value)).transpose()
}

/// Truncates to the millisecond precision the store keeps, so values compare
/// equal after a round trip.
pub fn truncate_to_millis(value: OffsetDateTime) -> OffsetDateTime {
    let nanos = (value.unix_timestamp_nanos() / 1_000_000) * 1_000_000;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap_or(value)
}
