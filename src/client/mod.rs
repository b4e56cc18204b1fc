//! SQL execution boundary for db-courier.
//!
//! The dispatcher core treats the database protocol as an opaque capability:
//! connect, execute a statement, get row sets or an error. Implementations
//! live behind the [`SqlClient`] and [`SqlConnector`] traits so that the
//! worker can be exercised against scripted doubles.

mod mock;
mod mysql;

pub use mock::{MockConnector, MockScript, MockSqlClient};
pub use mysql::{MySqlClient, MySqlConnector};

use crate::error::Result;
use async_trait::async_trait;

/// One row set produced by an executed statement.
///
/// A multi-statement batch or stored-procedure call may produce several of
/// these; the dispatcher retains only the first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    /// Number of columns in every row.
    pub column_count: usize,

    /// Row data; `None` is SQL NULL.
    pub rows: Vec<Vec<Option<String>>>,
}

impl RowSet {
    /// Creates a row set with the given width and rows.
    pub fn new(column_count: usize, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { column_count, rows }
    }

    /// Returns the number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// An established database connection.
///
/// Owned and mutated exclusively by the worker; no `Sync` bound is needed.
#[async_trait]
pub trait SqlClient: Send {
    /// Executes one statement and returns every row set it produced, in
    /// order. Trailing row sets must be fetched (not abandoned) so the
    /// connection is left ready for the next statement. A statement that
    /// produces no row set and no error returns an empty vec.
    ///
    /// Errors distinguish a dead link (`CourierError::Connection`) from a
    /// failed statement (`CourierError::Query`).
    async fn execute(&mut self, sql: &str) -> Result<Vec<RowSet>>;

    /// Closes the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Establishes [`SqlClient`] connections for the worker.
#[async_trait]
pub trait SqlConnector: Send + Sync {
    /// Attempts to establish a new connection.
    async fn connect(&self) -> Result<Box<dyn SqlClient>>;
}
