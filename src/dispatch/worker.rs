//! The worker task.
//!
//! One per dispatcher. Owns the physical connection and runs a four-phase
//! loop: wait on the submission signal with a timeout, honor the reconnect
//! window, then either keep the idle connection alive (timeout wake) or
//! drain the submission queue to empty (signaled wake), and finally poll the
//! shutdown flag. Locks are never held across statement execution.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::context::QueryContext;
use super::result::{QueryResult, ResultGrid};
use super::{PendingQuery, Shared};
use crate::client::{RowSet, SqlClient, SqlConnector};
use crate::error::CourierError;

/// No-op statement issued on idle timeouts so the server does not drop the
/// connection.
const KEEPALIVE_SQL: &str = "SELECT 1";

/// Wait and reconnect intervals for the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTimings {
    /// How long one wait on the submission signal lasts before the wake is
    /// treated as an idle timeout.
    pub wait_timeout: Duration,

    /// Minimum delay between connection attempts.
    pub reconnect_interval: Duration,
}

impl Default for WorkerTimings {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(30),
            reconnect_interval: Duration::from_secs(60),
        }
    }
}

/// Why the worker woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    /// The submission signal fired (new work or shutdown).
    Signal,
    /// The wait timed out with nothing to do.
    Timeout,
}

pub(crate) struct Worker {
    shared: Arc<Shared>,
    connector: Box<dyn SqlConnector>,
    timings: WorkerTimings,
    client: Option<Box<dyn SqlClient>>,
    last_attempt: Option<Instant>,
}

impl Worker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        connector: Box<dyn SqlConnector>,
        timings: WorkerTimings,
    ) -> Self {
        Self {
            shared,
            connector,
            timings,
            client: None,
            last_attempt: None,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("database worker started");
        loop {
            let wake = Self::wait_for_wake(&self.shared, self.timings.wait_timeout).await;
            self.tick(wake).await;
            if !self.shared.is_enabled() {
                break;
            }
        }

        if let Some(client) = self.client.take() {
            if let Err(e) = client.close().await {
                debug!(error = %e, "error closing database connection");
            }
        }
        info!("database worker exited");
    }

    async fn wait_for_wake(shared: &Shared, wait_timeout: Duration) -> Wake {
        match tokio::time::timeout(wait_timeout, shared.wait_for_signal()).await {
            Ok(()) => Wake::Signal,
            Err(_) => Wake::Timeout,
        }
    }

    /// One loop iteration past the wait: reconnect window, then keepalive or
    /// a full drain depending on the wake reason. Without a connection both
    /// branches are skipped and submissions keep accumulating in the queue.
    async fn tick(&mut self, wake: Wake) {
        self.reconnect_if_due().await;
        if self.client.is_none() {
            return;
        }

        match wake {
            Wake::Timeout => self.keepalive().await,
            Wake::Signal => {
                if self.shared.is_enabled() {
                    self.drain_submissions().await;
                }
            }
        }
    }

    /// Attempts a connection when none is held and the reconnect window has
    /// elapsed since the previous attempt. A held connection counts as
    /// already connected and is left alone.
    async fn reconnect_if_due(&mut self) {
        if self.client.is_some() {
            return;
        }
        let due = match self.last_attempt {
            None => true,
            Some(at) => at.elapsed() >= self.timings.reconnect_interval,
        };
        if !due {
            return;
        }

        let attempt = self.connector.connect().await;
        self.last_attempt = Some(Instant::now());
        match attempt {
            Ok(client) => {
                info!("connected to database");
                self.client = Some(client);
            }
            Err(e) => {
                warn!(error = %e, "database reconnection failure");
            }
        }
    }

    /// Issues the keepalive statement and discards whatever it returns. The
    /// submission queue is not touched on this path.
    async fn keepalive(&mut self) {
        let outcome = match self.client.as_mut() {
            Some(client) => client.execute(KEEPALIVE_SQL).await,
            None => return,
        };
        if let Err(e) = outcome {
            debug!(error = %e, "keepalive failed");
            if is_disconnect(&e) {
                warn!("database connection lost");
                self.client = None;
            }
        }
    }

    /// Pops and executes pending queries until the queue is empty. The queue
    /// lock is released before each execution.
    async fn drain_submissions(&mut self) {
        while let Some(pending) = self.shared.pop_front() {
            self.execute_one(pending).await;
        }
    }

    async fn execute_one(&mut self, pending: PendingQuery) {
        let PendingQuery {
            query,
            name,
            kind,
            user_data,
            module,
            ctx,
        } = pending;

        let outcome = match self.client.as_mut() {
            Some(client) => client.execute(&query).await,
            None => Err(CourierError::connection("no database connection")),
        };

        let (success, first_set) = match outcome {
            Ok(mut sets) => {
                // Multi-statement and CALL batches: keep the first row set
                // only; the rest were already fetched by the client.
                if sets.len() > 1 {
                    trace!(name = %name, discarded = sets.len() - 1, "extra row sets discarded");
                }
                let first = (!sets.is_empty()).then(|| sets.swap_remove(0));
                (true, first)
            }
            Err(e) => {
                debug!(name = %name, error = %e, "query execution failed");
                if is_disconnect(&e) {
                    warn!("database connection lost");
                    self.client = None;
                }
                (false, None)
            }
        };

        let result = build_result(success, first_set, query, name, kind, user_data, module);
        route_result(result, ctx);
    }
}

fn is_disconnect(e: &CourierError) -> bool {
    matches!(e, CourierError::Connection(_))
}

/// Assembles the result delivered back to the submitting scope. A grid that
/// cannot be represented degrades to a failed, zero-row result.
fn build_result(
    success: bool,
    set: Option<RowSet>,
    query: String,
    name: String,
    kind: i32,
    user_data: u64,
    module: String,
) -> QueryResult {
    let (success, row_count, column_count, grid) = match set {
        Some(set) if set.rows.is_empty() => (success, 0, set.column_count, None),
        Some(set) => match ResultGrid::from_set(set) {
            Some(grid) => (success, grid.row_count(), grid.column_count(), Some(grid)),
            None => {
                warn!(name = %name, "result grid too large; degrading to a failed result");
                (false, 0, 0, None)
            }
        },
        None => (success, 0, 0, None),
    };

    QueryResult {
        success,
        row_count,
        column_count,
        grid,
        query,
        name,
        kind,
        user_data,
        module,
    }
}

/// Hands a finished result to its owning context, or discards it when the
/// scope has ended. Holding the context lock for the alive/pending check and
/// the hand-off is the whole safety story: dropping `ctx` after a discard
/// releases the context once no other queries remain in flight.
fn route_result(result: QueryResult, ctx: Arc<QueryContext>) {
    let mut state = ctx.lock();
    if state.alive {
        state.inbox.push_back(result);
        return;
    }

    state.pending -= 1;
    let remaining = state.pending;
    drop(state);
    trace!(remaining, "discarded result for an ended scope");
}
