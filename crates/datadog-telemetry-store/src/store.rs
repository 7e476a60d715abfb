// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The store handle.
//!
//! [`Store`] is a cheap, cloneable handle onto one serial worker. Every method
//! comes in a blocking form and, where callers need it, an `_async` form that
//! queues the job immediately and hands back a [`StoreTask`]. Both forms go
//! through the same queue, so they are ordered against each other.

use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::database::Database;
use crate::error::StoreError;
use crate::identifiers::{ProcessIdentifier, SessionIdentifier};
use crate::migrations::{self, Migration};
use crate::options::StoreOptions;
use crate::record::{self, Record};
use crate::records::{LogRecord, MetadataLifespan, MetadataRecord, MetadataType, SessionRecord, SpanRecord};
use crate::timestamp::to_millis;
use crate::worker::{StoreTask, Worker};

/// Handle onto a durable store. Clones share the same worker and connection.
#[derive(Debug, Clone)]
pub struct Store {
    worker: Worker,
    options: Arc<StoreOptions>,
}

impl Store {
    /// Opens (or creates) the store described by `options` and migrates it.
    ///
    /// A database that cannot be opened is deleted and recreated once. A failing
    /// migration wipes the store unless `reset_on_migration_failure` is off.
    pub fn open(options: StoreOptions) -> Result<Self, StoreError> {
        let mut db = Database::open(&options.storage)?;
        let version = db.migrate(migrations::migrations(), options.reset_on_migration_failure)?;
        info!(
            "STORE | Opened {:?} at schema version {version}",
            options.storage
        );
        Ok(Self {
            worker: Worker::spawn(db)?,
            options: Arc::new(options),
        })
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Identifier of the process that owns this handle.
    pub fn process_id(&self) -> &ProcessIdentifier {
        &self.options.process_id
    }

    /// Applies the bundled migrations that are not applied yet.
    pub fn perform_migration(&self, reset_if_error: bool) -> Result<u32, StoreError> {
        self.perform_migration_with(migrations::migrations().to_vec(), reset_if_error)
    }

    pub fn perform_migration_with(
        &self,
        migrations: Vec<Migration>,
        reset_if_error: bool,
    ) -> Result<u32, StoreError> {
        self.worker
            .run_sync(move |db| db.migrate(&migrations, reset_if_error))
    }

    /// Deletes everything and recreates an empty, migrated store.
    pub fn reset(&self) -> Result<(), StoreError> {
        self.worker.run_sync(|db| {
            db.reset()?;
            db.migrate(migrations::migrations(), false)?;
            Ok(())
        })
    }

    /// Runs `f` against the connection on the worker.
    pub fn execute<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        self.worker.run_sync(move |db| f(db.connection_mut()))
    }

    pub fn execute_async<F, R>(&self, f: F) -> StoreTask<R>
    where
        F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        self.worker.run_async(move |db| f(db.connection_mut()))
    }

    /// Runs `f` inside a transaction that commits only when `f` succeeds.
    pub fn write<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        self.worker.run_sync(move |db| in_transaction(db, f))
    }

    pub fn write_async<F, R>(&self, f: F) -> StoreTask<R>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        self.worker.run_async(move |db| in_transaction(db, f))
    }

    // Generic record access.

    pub fn insert<R: Record>(&self, record: R) -> Result<(), StoreError> {
        self.execute(move |conn| record::insert(conn, &record))
    }

    pub fn insert_async<R: Record>(&self, record: R) -> StoreTask<()> {
        self.execute_async(move |conn| record::insert(conn, &record))
    }

    /// Inserts `record`, replacing any row with the same key.
    pub fn upsert<R: Record>(&self, record: R) -> Result<(), StoreError> {
        self.execute(move |conn| record::upsert(conn, &record))
    }

    pub fn upsert_async<R: Record>(&self, record: R) -> StoreTask<()> {
        self.execute_async(move |conn| record::upsert(conn, &record))
    }

    /// Rewrites the row matching `record`'s key. Returns false if there was none.
    pub fn update<R: Record>(&self, record: R) -> Result<bool, StoreError> {
        self.execute(move |conn| record::update(conn, &record))
    }

    pub fn update_async<R: Record>(&self, record: R) -> StoreTask<bool> {
        self.execute_async(move |conn| record::update(conn, &record))
    }

    pub fn delete<R: Record>(&self, record: &R) -> Result<bool, StoreError> {
        let key = record.key();
        self.execute(move |conn| record::delete::<R>(conn, key))
    }

    pub fn delete_async<R: Record>(&self, record: &R) -> StoreTask<bool> {
        let key = record.key();
        self.execute_async(move |conn| record::delete::<R>(conn, key))
    }

    pub fn fetch_all<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        self.execute(|conn| record::fetch_all::<R>(conn))
    }

    pub fn fetch_all_async<R: Record>(&self) -> StoreTask<Vec<R>> {
        self.execute_async(|conn| record::fetch_all::<R>(conn))
    }

    /// Fetches the row whose key columns equal `key`, in [`Record::KEY_COLUMNS`] order.
    pub fn fetch_one<R: Record>(&self, key: Vec<Value>) -> Result<Option<R>, StoreError> {
        self.execute(move |conn| record::fetch_one::<R>(conn, key))
    }

    pub fn fetch_one_async<R: Record>(&self, key: Vec<Value>) -> StoreTask<Option<R>> {
        self.execute_async(move |conn| record::fetch_one::<R>(conn, key))
    }

    /// Runs one raw statement and returns the number of changed rows.
    pub fn execute_raw(&self, sql: impl Into<String>, params: Vec<Value>) -> Result<usize, StoreError> {
        let sql = sql.into();
        self.execute(move |conn| Ok(conn.execute(&sql, params_from_iter(params))?))
    }

    pub fn execute_raw_async(&self, sql: impl Into<String>, params: Vec<Value>) -> StoreTask<usize> {
        let sql = sql.into();
        self.execute_async(move |conn| Ok(conn.execute(&sql, params_from_iter(params))?))
    }

    // Spans.

    pub fn insert_span(&self, span: SpanRecord) -> Result<(), StoreError> {
        self.insert(span)
    }

    /// Inserts the span or replaces the stored one with the same `(id, trace_id)`.
    pub fn upsert_span(&self, span: SpanRecord) -> Result<(), StoreError> {
        self.upsert(span)
    }

    pub fn upsert_span_async(&self, span: SpanRecord) -> StoreTask<()> {
        self.upsert_async(span)
    }

    pub fn fetch_span(&self, id: &str, trace_id: &str) -> Result<Option<SpanRecord>, StoreError> {
        self.fetch_one(vec![
            Value::Text(id.to_string()),
            Value::Text(trace_id.to_string()),
        ])
    }

    /// Ends every open span left behind by another process instance.
    ///
    /// Spans owned by the current process stay open. Returns how many spans were closed.
    pub fn close_open_spans(&self, end_time: OffsetDateTime) -> Result<usize, StoreError> {
        let process_id = self.process_id().as_str().to_string();
        self.write(move |tx| {
            let closed = tx.execute(
                "UPDATE spans SET end_time = ?1 WHERE end_time IS NULL AND process_id != ?2",
                params![to_millis(end_time), process_id],
            )?;
            debug!("STORE | Closed {closed} orphaned spans");
            Ok(closed)
        })
    }

    /// Deletes closed spans that ended at or before `older_than`, or every
    /// closed span when no cutoff is given. Open spans are never deleted.
    pub fn clean_up_spans(&self, older_than: Option<OffsetDateTime>) -> Result<usize, StoreError> {
        self.write(move |tx| {
            let deleted = match older_than {
                Some(cutoff) => tx.execute(
                    "DELETE FROM spans WHERE end_time IS NOT NULL AND end_time <= ?1",
                    params![to_millis(cutoff)],
                )?,
                None => tx.execute("DELETE FROM spans WHERE end_time IS NOT NULL", [])?,
            };
            Ok(deleted)
        })
    }

    // Sessions.

    pub fn insert_session(&self, session: SessionRecord) -> Result<(), StoreError> {
        self.insert(session)
    }

    pub fn update_session(&self, session: SessionRecord) -> Result<bool, StoreError> {
        self.update(session)
    }

    pub fn fetch_session(&self, id: &SessionIdentifier) -> Result<Option<SessionRecord>, StoreError> {
        self.fetch_one(vec![Value::Text(id.as_str().to_string())])
    }

    /// The session with the most recent start time, if any.
    pub fn fetch_latest_session(&self) -> Result<Option<SessionRecord>, StoreError> {
        self.execute(|conn| {
            let sql = format!(
                "{} ORDER BY start_time DESC, rowid DESC LIMIT 1",
                record::select_sql::<SessionRecord>()
            );
            Ok(conn.query_row(&sql, [], SessionRecord::from_row).optional()?)
        })
    }

    // Metadata.

    /// Stores `metadata`; an existing value with the same key, type and lifespan
    /// scope is overwritten.
    pub fn insert_metadata(&self, metadata: MetadataRecord) -> Result<(), StoreError> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO metadata (id, key, value, type, lifespan, lifespan_id, collected_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (key, type, lifespan, lifespan_id)
                 DO UPDATE SET value = excluded.value, collected_at = excluded.collected_at",
                params_from_iter(metadata.values()?),
            )?;
            Ok(())
        })
    }

    pub fn fetch_metadata(
        &self,
        lifespan: MetadataLifespan,
        lifespan_id: &str,
    ) -> Result<Vec<MetadataRecord>, StoreError> {
        let params = vec![
            Value::Text(lifespan.as_str().to_string()),
            Value::Text(lifespan_id.to_string()),
        ];
        self.execute(move |conn| {
            record::fetch_where(conn, "lifespan = ? AND lifespan_id = ? ORDER BY key", params)
        })
    }

    pub fn remove_metadata(
        &self,
        key: &str,
        kind: MetadataType,
        lifespan: MetadataLifespan,
        lifespan_id: &str,
    ) -> Result<bool, StoreError> {
        let params = vec![
            Value::Text(key.to_string()),
            Value::Text(kind.as_str().to_string()),
            Value::Text(lifespan.as_str().to_string()),
            Value::Text(lifespan_id.to_string()),
        ];
        self.execute(move |conn| {
            Ok(conn.execute(
                "DELETE FROM metadata WHERE key = ? AND type = ? AND lifespan = ? AND lifespan_id = ?",
                params_from_iter(params),
            )? > 0)
        })
    }

    /// Removes session-scoped values of other sessions and process-scoped values
    /// of other processes. Permanent values are kept.
    pub fn clean_up_metadata(
        &self,
        current_session: Option<&SessionIdentifier>,
        current_process: &ProcessIdentifier,
    ) -> Result<usize, StoreError> {
        let session = current_session.map(|id| id.as_str().to_string());
        let process = current_process.as_str().to_string();
        self.write(move |tx| {
            let sessions = tx.execute(
                "DELETE FROM metadata WHERE lifespan = ?1 AND lifespan_id IS NOT ?2",
                params![MetadataLifespan::Session.as_str(), session],
            )?;
            let processes = tx.execute(
                "DELETE FROM metadata WHERE lifespan = ?1 AND lifespan_id != ?2",
                params![MetadataLifespan::Process.as_str(), process],
            )?;
            Ok(sessions + processes)
        })
    }

    // Logs.

    pub fn create_log(&self, log: LogRecord) -> Result<(), StoreError> {
        self.insert(log)
    }

    pub fn create_log_async(&self, log: LogRecord) -> StoreTask<()> {
        self.insert_async(log)
    }

    /// All stored logs, oldest first.
    pub fn fetch_all_logs(&self) -> Result<Vec<LogRecord>, StoreError> {
        self.execute(|conn| record::fetch_where(conn, "1 = 1 ORDER BY timestamp, rowid", Vec::new()))
    }

    pub fn remove_logs(&self, ids: Vec<String>) -> Result<usize, StoreError> {
        self.write(move |tx| delete_logs(tx, &ids))
    }

    pub fn remove_logs_async(&self, ids: Vec<String>) -> StoreTask<usize> {
        self.write_async(move |tx| delete_logs(tx, &ids))
    }
}

fn delete_logs(tx: &Transaction<'_>, ids: &[String]) -> Result<usize, StoreError> {
    let mut stmt = tx.prepare("DELETE FROM logs WHERE id = ?1")?;
    let mut removed = 0;
    for id in ids {
        removed += stmt.execute([id])?;
    }
    Ok(removed)
}

fn in_transaction<F, R>(db: &mut Database, f: F) -> Result<R, StoreError>
where
    F: FnOnce(&Transaction<'_>) -> Result<R, StoreError>,
{
    let tx = db.connection_mut().transaction()?;
    let result = f(&tx)?;
    tx.commit()?;
    Ok(result)
}
