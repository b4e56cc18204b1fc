//! The event-export boundary.
//!
//! Drained results leave the dispatcher through [`ResultSink`]; what happens
//! next (plugin events, metrics, replication) is the host's business.

use crate::dispatch::QueryResult;
use std::sync::{Mutex, PoisonError};

/// Receives completed query results from a caller's drain.
///
/// Implementations must be cheap and non-blocking; `deliver` runs inside the
/// caller's drain loop and counts against its time budget.
pub trait ResultSink: Send + Sync {
    /// Delivers one completed query result to the host.
    fn deliver(&self, result: &QueryResult);
}

/// A sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn deliver(&self, _result: &QueryResult) {}
}

/// A sink that records every delivered result, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<QueryResult>>,
}

impl RecordingSink {
    /// Creates an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of everything delivered so far, in delivery order.
    pub fn delivered(&self) -> Vec<QueryResult> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns how many results have been delivered so far.
    pub fn len(&self) -> usize {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing has been delivered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultSink for RecordingSink {
    fn deliver(&self, result: &QueryResult) {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result.clone());
    }
}
