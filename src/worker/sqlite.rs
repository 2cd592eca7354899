//! rusqlite-backed embedded driver.

use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{Map, Value};

use super::driver::{Driver, DriverAttributes, DriverFailure};
use crate::protocol::Row;

/// Embedded SQLite driver.
///
/// Statements are executed eagerly: result rows are materialized into the
/// cursor at execute time. This keeps the cursor free of borrows into the
/// connection and fits the strictly sequential worker model, where a
/// cursor never outlives the request that produced it.
#[derive(Debug, Default)]
pub struct SqliteDriver;

/// An open SQLite connection plus the fetch attributes applied to it.
pub struct SqliteConnection {
    conn: Connection,
    stringify_fetches: bool,
}

/// Materialized result of one statement.
#[derive(Debug)]
pub struct SqliteCursor {
    rows: std::vec::IntoIter<Row>,
    row_count: u64,
}

impl SqliteDriver {
    fn failure(context: &str, err: rusqlite::Error) -> DriverFailure {
        let (driver_code, driver_message) = match &err {
            rusqlite::Error::SqliteFailure(code, message) => (
                Some(code.extended_code.to_string()),
                message.clone().or_else(|| Some(code.to_string())),
            ),
            _ => (None, None),
        };
        DriverFailure {
            message: err.to_string(),
            context: context.to_string(),
            // SQLite has no SQLSTATE taxonomy; report the general error
            // class and carry the extended result code separately.
            sql_state: Some("HY000".to_string()),
            driver_code,
            driver_message,
        }
    }

    fn bind_value(param: &Value) -> Result<rusqlite::types::Value, DriverFailure> {
        use rusqlite::types::Value as Sql;
        Ok(match param {
            Value::Null => Sql::Null,
            Value::Bool(b) => Sql::Integer(*b as i64),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Sql::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Sql::Real(f)
                } else {
                    return Err(DriverFailure::plain(format!(
                        "unbindable numeric parameter: {}",
                        n
                    )));
                }
            }
            Value::String(s) => Sql::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => {
                return Err(DriverFailure::plain(
                    "compound parameter reached the driver; expand placeholders client-side",
                ));
            }
        })
    }

    fn column_value(value: ValueRef<'_>, stringify: bool) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => {
                if stringify {
                    Value::String(i.to_string())
                } else {
                    Value::from(i)
                }
            }
            ValueRef::Real(f) => {
                if stringify {
                    Value::String(f.to_string())
                } else {
                    Value::from(f)
                }
            }
            ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
        }
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    type Connection = SqliteConnection;
    type Cursor = SqliteCursor;

    async fn connect(
        &self,
        dsn: &str,
        attrs: &DriverAttributes,
    ) -> Result<SqliteConnection, DriverFailure> {
        let conn = if dsn == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(dsn)
        }
        .map_err(|e| Self::failure("connect", e))?;

        if attrs.timeout_seconds > 0 {
            conn.busy_timeout(Duration::from_secs(attrs.timeout_seconds))
                .map_err(|e| Self::failure("busy_timeout", e))?;
        }
        // emulate_prepares has no SQLite analog; accepted and ignored.

        Ok(SqliteConnection {
            conn,
            stringify_fetches: attrs.stringify_fetches,
        })
    }

    async fn prepare_and_execute(
        &self,
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[Value],
    ) -> Result<SqliteCursor, DriverFailure> {
        let mut stmt = conn
            .conn
            .prepare(sql)
            .map_err(|e| Self::failure("prepare", e))?;

        let bound: Vec<rusqlite::types::Value> = params
            .iter()
            .map(Self::bind_value)
            .collect::<Result<_, _>>()?;

        if stmt.column_count() == 0 {
            let affected = stmt
                .execute(rusqlite::params_from_iter(bound.iter()))
                .map_err(|e| Self::failure("execute", e))?;
            return Ok(SqliteCursor {
                rows: Vec::new().into_iter(),
                row_count: affected as u64,
            });
        }

        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        let stringify = conn.stringify_fetches;

        let mut rows = stmt
            .query(rusqlite::params_from_iter(bound.iter()))
            .map_err(|e| Self::failure("execute", e))?;
        let mut out: Vec<Row> = Vec::new();
        while let Some(row) = rows.next().map_err(|e| Self::failure("fetch", e))? {
            let mut object = Map::with_capacity(column_names.len());
            for (i, name) in column_names.iter().enumerate() {
                let value = row.get_ref(i).map_err(|e| Self::failure("fetch", e))?;
                object.insert(name.clone(), Self::column_value(value, stringify));
            }
            out.push(object);
        }

        let row_count = out.len() as u64;
        Ok(SqliteCursor {
            rows: out.into_iter(),
            row_count,
        })
    }

    async fn fetch_one(&self, cursor: &mut SqliteCursor) -> Result<Option<Row>, DriverFailure> {
        Ok(cursor.rows.next())
    }

    async fn fetch_all(&self, cursor: &mut SqliteCursor) -> Result<Vec<Row>, DriverFailure> {
        Ok(cursor.rows.by_ref().collect())
    }

    fn row_count(&self, cursor: &SqliteCursor) -> u64 {
        cursor.row_count
    }

    async fn close_cursor(&self, cursor: SqliteCursor) {
        drop(cursor);
    }
}
