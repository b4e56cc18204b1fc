//! Scripted SQL client for testing.
//!
//! Provides an in-memory stand-in for a real connection. A shared
//! [`MockScript`] handle lets a test script per-statement outcomes, observe
//! what the worker executed, fail connection attempts, and gate execution to
//! step through interleavings one statement at a time.

use super::{RowSet, SqlClient, SqlConnector};
use crate::error::{CourierError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;

#[derive(Debug)]
enum Scripted {
    Sets(Vec<RowSet>),
    QueryError(String),
    Disconnect(String),
}

#[derive(Debug, Default)]
struct ScriptState {
    scripted: HashMap<String, VecDeque<Scripted>>,
    executed: Vec<String>,
    connect_failures: usize,
    connects: usize,
}

/// Shared scripting handle for [`MockSqlClient`] and [`MockConnector`].
#[derive(Clone)]
pub struct MockScript {
    state: Arc<Mutex<ScriptState>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockScript {
    /// Creates a script whose clients execute immediately.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState::default())),
            gate: None,
        }
    }

    /// Creates a script whose clients block before each statement until a
    /// permit is released with [`MockScript::release`].
    pub fn gated() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState::default())),
            gate: Some(Arc::new(Semaphore::new(0))),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scripts the row sets returned for the next execution of `sql`.
    pub fn expect_rows(&self, sql: &str, sets: Vec<RowSet>) {
        self.lock()
            .scripted
            .entry(sql.to_string())
            .or_default()
            .push_back(Scripted::Sets(sets));
    }

    /// Scripts a statement-level failure for the next execution of `sql`.
    pub fn expect_error(&self, sql: &str, msg: &str) {
        self.lock()
            .scripted
            .entry(sql.to_string())
            .or_default()
            .push_back(Scripted::QueryError(msg.to_string()));
    }

    /// Scripts a dead-link failure for the next execution of `sql`.
    pub fn expect_disconnect(&self, sql: &str, msg: &str) {
        self.lock()
            .scripted
            .entry(sql.to_string())
            .or_default()
            .push_back(Scripted::Disconnect(msg.to_string()));
    }

    /// Makes the next `n` connection attempts fail.
    pub fn fail_connects(&self, n: usize) {
        self.lock().connect_failures = n;
    }

    /// Releases `n` gated executions. No-op for an ungated script.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Returns every statement executed so far, in execution order.
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    /// Returns the number of connection attempts made so far.
    pub fn connects(&self) -> usize {
        self.lock().connects
    }
}

impl Default for MockScript {
    fn default() -> Self {
        Self::new()
    }
}

/// A mock connection driven by a [`MockScript`].
pub struct MockSqlClient {
    script: MockScript,
}

#[async_trait]
impl SqlClient for MockSqlClient {
    async fn execute(&mut self, sql: &str) -> Result<Vec<RowSet>> {
        if let Some(gate) = &self.script.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let mut state = self.script.lock();
        state.executed.push(sql.to_string());

        if let Some(queue) = state.scripted.get_mut(sql) {
            if let Some(outcome) = queue.pop_front() {
                return match outcome {
                    Scripted::Sets(sets) => Ok(sets),
                    Scripted::QueryError(msg) => Err(CourierError::query(msg)),
                    Scripted::Disconnect(msg) => Err(CourierError::connection(msg)),
                };
            }
        }

        // Unscripted statements behave like a trivial SELECT: one 1x1 row
        // set echoing the statement, or no row set for anything else.
        if sql.trim_start().to_uppercase().starts_with("SELECT") {
            Ok(vec![RowSet::new(
                1,
                vec![vec![Some(format!("mock result for: {sql}"))]],
            )])
        } else {
            Ok(vec![])
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// A connector handing out [`MockSqlClient`]s, with scriptable failures.
pub struct MockConnector {
    script: MockScript,
}

impl MockConnector {
    /// Creates a connector backed by the given script.
    pub fn new(script: MockScript) -> Self {
        Self { script }
    }
}

#[async_trait]
impl SqlConnector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn SqlClient>> {
        let mut state = self.script.lock();
        state.connects += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(CourierError::connection("mock connection refused"));
        }
        drop(state);

        Ok(Box::new(MockSqlClient {
            script: self.script.clone(),
        }))
    }
}
