//! Completed query results.

use crate::client::RowSet;

/// The outcome of one executed statement, queued in the owning scope's inbox
/// until the caller drains it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Whether the statement executed without error.
    pub success: bool,

    /// Rows in the retained row set; zero when no row set was produced.
    pub row_count: usize,

    /// Columns in the retained row set; zero when no row set was produced.
    pub column_count: usize,

    /// The retained row set, present only when rows were returned.
    pub grid: Option<ResultGrid>,

    /// The original query text, moved in from the submission.
    pub query: String,

    /// The caller-supplied label, echoed back.
    pub name: String,

    /// The caller-supplied type tag, echoed back.
    pub kind: i32,

    /// The caller-supplied opaque word, echoed back.
    pub user_data: u64,

    /// The module identity of the submitting scope.
    pub module: String,
}

/// A fixed-size rows x columns table of nullable strings.
///
/// Storage is a single flat allocation; every row has exactly
/// [`ResultGrid::column_count`] cells.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultGrid {
    column_count: usize,
    cells: Vec<Option<String>>,
}

impl ResultGrid {
    /// Builds a grid from one row set. Short rows are padded with NULL and
    /// long rows truncated so the rows x columns shape always holds. Returns
    /// `None` when the cell count cannot be represented.
    pub(crate) fn from_set(set: RowSet) -> Option<Self> {
        let column_count = set.column_count;
        set.rows.len().checked_mul(column_count)?;

        let mut cells = Vec::with_capacity(set.rows.len() * column_count);
        for row in set.rows {
            cells.extend(
                row.into_iter()
                    .map(Some)
                    .chain(std::iter::repeat(None))
                    .take(column_count)
                    .map(Option::flatten),
            );
        }
        Some(Self {
            column_count,
            cells,
        })
    }

    /// Returns the number of rows.
    pub fn row_count(&self) -> usize {
        if self.column_count == 0 {
            0
        } else {
            self.cells.len() / self.column_count
        }
    }

    /// Returns the number of columns.
    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Returns the cell at `(row, col)`, or `None` for a NULL field or an
    /// out-of-range position.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        if col >= self.column_count {
            return None;
        }
        self.cells
            .get(row.checked_mul(self.column_count)?.checked_add(col)?)
            .and_then(|c| c.as_deref())
    }

    /// Iterates over the rows as slices of nullable cells.
    pub fn rows(&self) -> impl Iterator<Item = &[Option<String>]> {
        self.cells.chunks(self.column_count.max(1))
    }
}
