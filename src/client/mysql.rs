//! MySQL client implementation.
//!
//! Implements the [`SqlClient`] boundary on top of sqlx with a single
//! non-pooled connection; the worker is the only thread that ever touches it.

use super::{RowSet, SqlClient, SqlConnector};
use crate::config::DatabaseConfig;
use crate::error::{CourierError, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{ConnectOptions, Connection, Either, Row as SqlxRow};
use tracing::debug;

/// A single MySQL connection.
pub struct MySqlClient {
    conn: MySqlConnection,
}

#[async_trait]
impl SqlClient for MySqlClient {
    async fn execute(&mut self, sql: &str) -> Result<Vec<RowSet>> {
        let mut sets: Vec<RowSet> = Vec::new();
        let mut current: Vec<Vec<Option<String>>> = Vec::new();
        let mut column_count = 0;

        // fetch_many streams every row set of a multi-statement or CALL
        // batch, so trailing sets are consumed rather than left on the wire.
        let mut stream = sqlx::query(sql).fetch_many(&mut self.conn);
        loop {
            let item = match stream.try_next().await {
                Ok(item) => item,
                Err(e) => return Err(map_execute_error(e)),
            };
            match item {
                Some(Either::Right(row)) => {
                    column_count = row.columns().len();
                    current.push(convert_row(&row));
                }
                Some(Either::Left(_done)) => {
                    if !current.is_empty() {
                        sets.push(RowSet::new(column_count, std::mem::take(&mut current)));
                        column_count = 0;
                    }
                }
                None => break,
            }
        }
        if !current.is_empty() {
            sets.push(RowSet::new(column_count, current));
        }

        Ok(sets)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| CourierError::connection(e.to_string()))
    }
}

/// Converts one sqlx row into owned nullable strings.
fn convert_row(row: &MySqlRow) -> Vec<Option<String>> {
    (0..row.columns().len())
        .map(|i| convert_field(row, i))
        .collect()
}

/// Decodes one field as text, trying the common MySQL scalar types in turn.
/// A value no decoding applies to surfaces as NULL.
fn convert_field(row: &MySqlRow, index: usize) -> Option<String> {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v;
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(index) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(|b| b.to_string());
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v.map(|b| String::from_utf8_lossy(&b).into_owned());
    }
    debug!(index, "field type has no text decoding; surfacing NULL");
    None
}

/// Returns true when the error means the link itself is gone, as opposed to
/// the statement having failed on a healthy connection.
fn is_disconnect_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

fn map_execute_error(e: sqlx::Error) -> CourierError {
    if is_disconnect_error(&e) {
        return CourierError::connection(e.to_string());
    }
    match &e {
        sqlx::Error::Database(db) => CourierError::query(db.message().to_string()),
        _ => CourierError::query(e.to_string()),
    }
}

/// Connector producing [`MySqlClient`]s from the dispatcher configuration.
pub struct MySqlConnector {
    options: MySqlConnectOptions,
}

impl MySqlConnector {
    /// Creates a connector for the given connection parameters.
    pub fn new(config: &DatabaseConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database);
        Self { options }
    }
}

#[async_trait]
impl SqlConnector for MySqlConnector {
    async fn connect(&self) -> Result<Box<dyn SqlClient>> {
        let conn = self
            .options
            .connect()
            .await
            .map_err(|e| CourierError::connection(e.to_string()))?;
        Ok(Box::new(MySqlClient { conn }))
    }
}
