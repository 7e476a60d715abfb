// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Size-bounded queue of payloads waiting for delivery.
//!
//! Records live in the store's `pending_uploads` table. Saving beyond
//! `cache_limit` evicts the oldest records, whether or not they were ever
//! attempted.

use datadog_telemetry_store::record::{self, Record};
use datadog_telemetry_store::{PendingUploadRecord, Store, StoreError, StoreTask, UploadType};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Transaction};
use tracing::warn;

use crate::upload::options::CacheOptions;

#[derive(Debug, Clone)]
pub struct UploadCache {
    store: Store,
    options: CacheOptions,
}

impl UploadCache {
    pub fn new(store: Store, options: CacheOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> CacheOptions {
        self.options
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Persists `payload` under `(id, upload_type)`.
    ///
    /// Saving an existing key replaces its payload and keeps its creation time
    /// and attempt count.
    pub fn save(
        &self,
        id: &str,
        upload_type: UploadType,
        payload: Vec<u8>,
    ) -> Result<PendingUploadRecord, StoreError> {
        let record = PendingUploadRecord::new(id, upload_type, payload);
        let limit = self.options.cache_limit;
        self.store.write(move |tx| save_in(tx, record, limit))
    }

    pub fn save_async(
        &self,
        id: &str,
        upload_type: UploadType,
        payload: Vec<u8>,
    ) -> StoreTask<PendingUploadRecord> {
        let record = PendingUploadRecord::new(id, upload_type, payload);
        let limit = self.options.cache_limit;
        self.store.write_async(move |tx| save_in(tx, record, limit))
    }

    /// Every cached record, oldest first.
    pub fn fetch_all(&self) -> Result<Vec<PendingUploadRecord>, StoreError> {
        self.store.execute(|conn| fetch_all_in(conn))
    }

    pub fn fetch_all_async(&self) -> StoreTask<Vec<PendingUploadRecord>> {
        self.store.execute_async(|conn| fetch_all_in(conn))
    }

    pub fn fetch(
        &self,
        id: &str,
        upload_type: UploadType,
    ) -> Result<Option<PendingUploadRecord>, StoreError> {
        self.store.fetch_one(key(id, upload_type.tag()))
    }

    /// Sets the attempt count. Returns false when the record is gone.
    pub fn update_attempt_count(
        &self,
        id: &str,
        upload_type: UploadType,
        attempt_count: u32,
    ) -> Result<bool, StoreError> {
        let key = key(id, upload_type.tag());
        self.store
            .execute(move |conn| update_attempt_count_in(conn, key, attempt_count))
    }

    pub fn update_attempt_count_async(
        &self,
        id: &str,
        upload_type: UploadType,
        attempt_count: u32,
    ) -> StoreTask<bool> {
        let key = key(id, upload_type.tag());
        self.store
            .execute_async(move |conn| update_attempt_count_in(conn, key, attempt_count))
    }

    /// Removes the record. Returns false when there was nothing to remove.
    pub fn delete(&self, id: &str, upload_type: UploadType) -> Result<bool, StoreError> {
        self.delete_tag(id, upload_type.tag())
    }

    pub fn delete_async(&self, id: &str, upload_type: UploadType) -> StoreTask<bool> {
        let key = key(id, upload_type.tag());
        self.store
            .execute_async(move |conn| record::delete::<PendingUploadRecord>(conn, key))
    }

    /// Removes a record by raw tag, including tags this build does not know.
    pub fn delete_tag(&self, id: &str, type_tag: i64) -> Result<bool, StoreError> {
        let key = key(id, type_tag);
        self.store
            .execute(move |conn| record::delete::<PendingUploadRecord>(conn, key))
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        self.store.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT count(*) FROM pending_uploads", [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
    }
}

fn key(id: &str, type_tag: i64) -> Vec<Value> {
    vec![Value::Text(id.to_string()), Value::Integer(type_tag)]
}

fn save_in(
    tx: &Transaction<'_>,
    record: PendingUploadRecord,
    limit: usize,
) -> Result<PendingUploadRecord, StoreError> {
    tx.execute(
        "INSERT INTO pending_uploads (id, type, data, attempt_count, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (id, type) DO UPDATE SET data = excluded.data",
        params_from_iter(record.values()?),
    )?;

    if limit > 0 {
        let count: i64 =
            tx.query_row("SELECT count(*) FROM pending_uploads", [], |row| row.get(0))?;
        let excess = count - i64::try_from(limit).unwrap_or(i64::MAX);
        if excess > 0 {
            tx.execute(
                "DELETE FROM pending_uploads WHERE rowid IN (
                    SELECT rowid FROM pending_uploads ORDER BY created_at ASC, rowid ASC LIMIT ?1
                 )",
                params![excess],
            )?;
            warn!("UPLOAD | Cache limit {limit} reached, evicted {excess} pending uploads");
        }
    }

    // The stored row may predate this call; return what is actually persisted.
    let stored = record::fetch_one::<PendingUploadRecord>(tx, record.key())?;
    Ok(stored.unwrap_or(record))
}

fn fetch_all_in(conn: &Connection) -> Result<Vec<PendingUploadRecord>, StoreError> {
    record::fetch_where(conn, "1 = 1 ORDER BY created_at ASC, rowid ASC", Vec::new())
}

fn update_attempt_count_in(
    conn: &Connection,
    mut key: Vec<Value>,
    attempt_count: u32,
) -> Result<bool, StoreError> {
    key.insert(0, Value::Integer(i64::from(attempt_count)));
    let updated = conn.execute(
        "UPDATE pending_uploads SET attempt_count = ?1 WHERE id = ?2 AND type = ?3",
        params_from_iter(key),
    )?;
    Ok(updated > 0)
}
