//! Per-caller query scopes.
//!
//! A [`ScopeHandle`] is the explicit capability a caller threads through its
//! submissions and drains; there is no ambient per-thread association, so the
//! dispatcher works from cooperative single-threaded schedulers too.
//!
//! Ownership rule: the caller holds one strong reference to its context, and
//! every in-flight query holds one. Ending the scope marks the context dead
//! and drops the caller's reference; the context is released when the last
//! in-flight reference drops, which for a scope with outstanding queries is
//! always on the worker side, after the final result is resolved.

use std::collections::VecDeque;
use std::fmt;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tracing::trace;

use super::{truncate_label, PendingQuery, Shared};
use crate::dispatch::result::QueryResult;
use crate::error::{CourierError, Result};
use crate::export::ResultSink;

/// Per-caller state: liveness, outstanding-query count, and the inbox of
/// completed results. The three are guarded by one lock and only ever
/// observed or mutated together.
pub(crate) struct QueryContext {
    module: String,
    state: Mutex<ContextState>,
}

pub(crate) struct ContextState {
    pub alive: bool,
    pub pending: usize,
    pub inbox: VecDeque<QueryResult>,
}

impl QueryContext {
    pub(crate) fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            state: Mutex::new(ContextState {
                alive: true,
                pending: 0,
                inbox: VecDeque::new(),
            }),
        }
    }

    pub(crate) fn module(&self) -> &str {
        &self.module
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A caller's handle to its query scope.
///
/// Dropping the handle ends the scope: queries already submitted still run,
/// but their results are discarded instead of delivered.
pub struct ScopeHandle {
    ctx: Arc<QueryContext>,
    shared: Arc<Shared>,
    sink: Arc<dyn ResultSink>,
}

impl ScopeHandle {
    pub(crate) fn new(
        ctx: Arc<QueryContext>,
        shared: Arc<Shared>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self { ctx, shared, sink }
    }

    /// Submits one query for asynchronous execution.
    ///
    /// Never blocks on the database. The label is truncated to
    /// [`super::QUERY_NAME_MAX`] bytes; `kind` and `user_data` are echoed
    /// back untouched on the result.
    pub fn submit(&self, kind: i32, user_data: u64, name: &str, query: &str) -> Result<()> {
        if !self.shared.is_enabled() {
            return Err(CourierError::Disabled);
        }

        {
            let mut state = self.ctx.lock();
            if !state.alive {
                return Err(CourierError::ScopeEnded);
            }
            state.pending += 1;
        }

        self.shared.push(PendingQuery {
            query: query.to_owned(),
            name: truncate_label(name),
            kind,
            user_data,
            module: self.ctx.module().to_owned(),
            ctx: Arc::clone(&self.ctx),
        });
        trace!(module = %self.ctx.module(), name, "query submitted");
        Ok(())
    }

    /// Formats and submits a query in one step.
    ///
    /// A formatting failure is a rejection; nothing is enqueued.
    pub fn submit_fmt(
        &self,
        kind: i32,
        user_data: u64,
        name: &str,
        args: fmt::Arguments<'_>,
    ) -> Result<()> {
        let mut query = String::new();
        query.write_fmt(args).map_err(|_| CourierError::Format)?;
        self.submit(kind, user_data, name, &query)
    }

    /// Drains completed results to the sink, bounded by `budget`.
    ///
    /// At least one queued result is delivered per call; the budget is
    /// checked after each delivery, so a host loop is never stalled much
    /// longer than `budget` even under a large backlog. Returns the number
    /// of results delivered.
    pub fn drain(&self, budget: Duration) -> usize {
        let start = Instant::now();
        let mut delivered = 0;
        loop {
            let popped = {
                let mut state = self.ctx.lock();
                match state.inbox.pop_front() {
                    Some(result) => {
                        state.pending -= 1;
                        Some(result)
                    }
                    None => None,
                }
            };
            let Some(result) = popped else { break };

            self.sink.deliver(&result);
            delivered += 1;

            if start.elapsed() > budget {
                break;
            }
        }
        delivered
    }

    /// Ends the scope explicitly. Equivalent to dropping the handle.
    pub fn end(self) {}

    /// Returns a passive observer of this scope's context.
    pub fn watch(&self) -> ScopeWatch {
        ScopeWatch {
            ctx: Arc::downgrade(&self.ctx),
        }
    }

    /// The module identity this scope was created with.
    pub fn module(&self) -> &str {
        self.ctx.module()
    }

    /// Number of submitted queries not yet resolved by a drain or discard.
    pub fn pending(&self) -> usize {
        self.ctx.lock().pending
    }

    /// Number of completed results waiting to be drained.
    pub fn inbox_len(&self) -> usize {
        self.ctx.lock().inbox.len()
    }
}

impl Drop for ScopeHandle {
    fn drop(&mut self) {
        let mut state = self.ctx.lock();
        state.alive = false;
        trace!(module = %self.ctx.module(), pending = state.pending, "query scope ended");
    }
}

/// A weak observer of a scope's context, for diagnostics and tests.
///
/// Holds no strong reference, so it never extends the context's lifetime.
pub struct ScopeWatch {
    ctx: Weak<QueryContext>,
}

impl ScopeWatch {
    /// Returns true while the context is still allocated.
    pub fn is_live(&self) -> bool {
        self.ctx.strong_count() > 0
    }

    /// The context's outstanding-query count, or `None` once released.
    pub fn pending(&self) -> Option<usize> {
        self.ctx.upgrade().map(|ctx| ctx.lock().pending)
    }

    /// The context's inbox depth, or `None` once released.
    pub fn inbox_len(&self) -> Option<usize> {
        self.ctx.upgrade().map(|ctx| ctx.lock().inbox.len())
    }
}
