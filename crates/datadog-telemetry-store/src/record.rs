// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Table mapping shared by every persisted record type.
//!
//! A [`Record`] describes its table, its columns and which of those form the
//! primary key. The generic statements below are built from that description,
//! so record types only deal with converting values.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};

use crate::error::StoreError;

/// A row type stored in its own table.
pub trait Record: Sized + Send + 'static {
    const TABLE: &'static str;
    /// All columns, in the order produced by [`Record::values`] and read by [`Record::from_row`].
    const COLUMNS: &'static [&'static str];
    /// Columns forming the primary key, in the order produced by [`Record::key`].
    const KEY_COLUMNS: &'static [&'static str];

    fn values(&self) -> Result<Vec<Value>, StoreError>;
    fn key(&self) -> Vec<Value>;
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn key_clause(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|column| format!("{column} = ?"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

pub fn select_sql<R: Record>() -> String {
    format!("SELECT {} FROM {}", R::COLUMNS.join(", "), R::TABLE)
}

pub fn insert<R: Record>(conn: &Connection, record: &R) -> Result<(), StoreError> {
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        R::TABLE,
        R::COLUMNS.join(", "),
        placeholders(R::COLUMNS.len())
    );
    conn.execute(&sql, params_from_iter(record.values()?))?;
    Ok(())
}

pub fn upsert<R: Record>(conn: &Connection, record: &R) -> Result<(), StoreError> {
    let sql = format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        R::TABLE,
        R::COLUMNS.join(", "),
        placeholders(R::COLUMNS.len())
    );
    conn.execute(&sql, params_from_iter(record.values()?))?;
    Ok(())
}

/// Updates every non-key column. Returns whether a row matched.
pub fn update<R: Record>(conn: &Connection, record: &R) -> Result<bool, StoreError> {
    let mut assignments = Vec::new();
    let mut params = Vec::new();
    for (column, value) in R::COLUMNS.iter().zip(record.values()?) {
        if !R::KEY_COLUMNS.contains(column) {
            assignments.push(format!("{column} = ?"));
            params.push(value);
        }
    }
    params.extend(record.key());
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        R::TABLE,
        assignments.join(", "),
        key_clause(R::KEY_COLUMNS)
    );
    Ok(conn.execute(&sql, params_from_iter(params))? > 0)
}

pub fn delete<R: Record>(conn: &Connection, key: Vec<Value>) -> Result<bool, StoreError> {
    let sql = format!(
        "DELETE FROM {} WHERE {}",
        R::TABLE,
        key_clause(R::KEY_COLUMNS)
    );
    Ok(conn.execute(&sql, params_from_iter(key))? > 0)
}

pub fn fetch_all<R: Record>(conn: &Connection) -> Result<Vec<R>, StoreError> {
    fetch_where(conn, "1 = 1", Vec::new())
}

pub fn fetch_one<R: Record>(
    conn: &Connection,
    key: Vec<Value>,
) -> Result<Option<R>, StoreError> {
    let sql = format!("{} WHERE {}", select_sql::<R>(), key_clause(R::KEY_COLUMNS));
    Ok(conn
        .query_row(&sql, params_from_iter(key), R::from_row)
        .optional()?)
}

/// Fetches rows matching a raw `WHERE` fragment.
pub fn fetch_where<R: Record>(
    conn: &Connection,
    condition: &str,
    params: Vec<Value>,
) -> Result<Vec<R>, StoreError> {
    let sql = format!("{} WHERE {condition}", select_sql::<R>());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params), R::from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Pair {
        a: String,
        b: i64,
        note: String,
    }

    impl Record for Pair {
        const TABLE: &'static str = "pairs";
        const COLUMNS: &'static [&'static str] = &["a", "b", "note"];
        const KEY_COLUMNS: &'static [&'static str] = &["a", "b"];

        fn values(&self) -> Result<Vec<Value>, StoreError> {
            Ok(vec![
                Value::Text(self.a.clone()),
                Value::Integer(self.b),
                Value::Text(self.note.clone()),
            ])
        }

        fn key(&self) -> Vec<Value> {
            vec![Value::Text(self.a.clone()), Value::Integer(self.b)]
        }

        fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self {
                a: row.get(0)?,
                b: row.get(1)?,
                note: row.get(2)?,
            })
        }
    }

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE pairs (a TEXT, b INTEGER, note TEXT, PRIMARY KEY (a, b))")
            .unwrap();
        conn
    }

    fn pair(a: &str, b: i64, note: &str) -> Pair {
        Pair {
            a: a.to_string(),
            b,
            note: note.to_string(),
        }
    }

    #[test]
    fn test_update_uses_composite_key() {
        let conn = conn();
        insert(&conn, &pair("x", 1, "first")).unwrap();
        insert(&conn, &pair("x", 2, "second")).unwrap();

        assert!(update(&conn, &pair("x", 2, "changed")).unwrap());
        assert!(!update(&conn, &pair("y", 2, "missing")).unwrap());

        let rows: Vec<Pair> = fetch_all(&conn).unwrap();
        assert_eq!(rows, vec![pair("x", 1, "first"), pair("x", 2, "changed")]);
    }

    #[test]
    fn test_insert_rejects_duplicate_key_but_upsert_replaces() {
        let conn = conn();
        insert(&conn, &pair("x", 1, "first")).unwrap();
        assert!(insert(&conn, &pair("x", 1, "again")).is_err());

        upsert(&conn, &pair("x", 1, "again")).unwrap();
        let row: Option<Pair> =
            fetch_one(&conn, vec![Value::Text("x".into()), Value::Integer(1)]).unwrap();
        assert_eq!(row, Some(pair("x", 1, "again")));
    }

    #[test]
    fn test_delete_reports_whether_row_existed() {
        let conn = conn();
        insert(&conn, &pair("x", 1, "first")).unwrap();
        assert!(delete::<Pair>(&conn, pair("x", 1, "").key()).unwrap());
        assert!(!delete::<Pair>(&conn, pair("x", 1, "").key()).unwrap());
    }
}
