//! The query dispatcher core.
//!
//! One global FIFO of pending queries feeds a single worker task that owns
//! the database connection. Callers interact through per-scope handles:
//! submissions are non-blocking, and completed results come back through the
//! submitting scope's inbox, drained by the caller under a time budget.

mod context;
mod result;
mod worker;

pub use context::{ScopeHandle, ScopeWatch};
pub use result::{QueryResult, ResultGrid};
pub use worker::WorkerTimings;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::SqlConnector;
use crate::config::DatabaseConfig;
use crate::export::ResultSink;
use context::QueryContext;
use worker::Worker;

/// Longest caller-supplied query label, in bytes; longer labels are
/// truncated at a character boundary.
pub const QUERY_NAME_MAX: usize = 23;

/// One submitted-but-unexecuted request. Immutable once enqueued; the worker
/// consumes it exactly once and moves the query text into the result.
pub(crate) struct PendingQuery {
    pub query: String,
    pub name: String,
    pub kind: i32,
    pub user_data: u64,
    pub module: String,
    pub ctx: Arc<QueryContext>,
}

struct Control {
    enabled: bool,
    worker: Option<JoinHandle<()>>,
}

/// State shared between the dispatcher, its scope handles, and the worker:
/// the enable flag and worker handle under one lock, the submission queue
/// under another, and the worker's wake signal.
pub(crate) struct Shared {
    control: Mutex<Control>,
    queue: Mutex<VecDeque<PendingQuery>>,
    signal: Notify,
}

impl Shared {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            control: Mutex::new(Control {
                enabled,
                worker: None,
            }),
            queue: Mutex::new(VecDeque::new()),
            signal: Notify::new(),
        }
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<PendingQuery>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.control().enabled
    }

    /// Appends a pending query and wakes the worker.
    pub(crate) fn push(&self, query: PendingQuery) {
        self.queue().push_back(query);
        self.signal.notify_one();
    }

    /// Pops the oldest pending query, if any.
    pub(crate) fn pop_front(&self) -> Option<PendingQuery> {
        self.queue().pop_front()
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.queue().len()
    }

    pub(crate) async fn wait_for_signal(&self) {
        self.signal.notified().await;
    }
}

/// Truncates a caller-supplied label to [`QUERY_NAME_MAX`] bytes, backing
/// off to the nearest character boundary.
pub(crate) fn truncate_label(name: &str) -> String {
    if name.len() <= QUERY_NAME_MAX {
        return name.to_string();
    }
    let mut end = QUERY_NAME_MAX;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// The process-wide query dispatcher.
///
/// Created from configuration; spawns the worker task when enabled. All
/// caller-facing operations go through [`ScopeHandle`]s minted by
/// [`Dispatcher::begin_scope`].
pub struct Dispatcher {
    shared: Arc<Shared>,
    sink: Arc<dyn ResultSink>,
}

impl Dispatcher {
    /// Starts a dispatcher with the default worker timings.
    ///
    /// Must be called within a tokio runtime. When the configuration has the
    /// dispatcher disabled, no worker is spawned and every submission is
    /// rejected.
    pub fn start(
        config: &DatabaseConfig,
        connector: Box<dyn SqlConnector>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self::start_with_timings(config, connector, sink, WorkerTimings::default())
    }

    /// Starts a dispatcher with explicit worker timings.
    pub fn start_with_timings(
        config: &DatabaseConfig,
        connector: Box<dyn SqlConnector>,
        sink: Arc<dyn ResultSink>,
        timings: WorkerTimings,
    ) -> Self {
        let shared = Arc::new(Shared::new(config.enabled));

        if config.enabled {
            let worker = Worker::new(Arc::clone(&shared), connector, timings);
            let handle = tokio::spawn(worker.run());
            shared.control().worker = Some(handle);
            debug!(target = %config.display_string(), "database worker spawned");
        } else {
            info!("database dispatcher disabled by configuration");
        }

        Self { shared, sink }
    }

    /// Begins a new query scope for the given module identity.
    pub fn begin_scope(&self, module: impl Into<String>) -> ScopeHandle {
        ScopeHandle::new(
            Arc::new(QueryContext::new(module)),
            Arc::clone(&self.shared),
            Arc::clone(&self.sink),
        )
    }

    /// Returns true while submissions are accepted.
    pub fn is_enabled(&self) -> bool {
        self.shared.is_enabled()
    }

    /// Current depth of the global submission queue.
    pub fn queue_len(&self) -> usize {
        self.shared.queue_len()
    }

    /// Disables further submission, wakes the worker, and waits for it to
    /// exit after its current cycle. Idempotent.
    pub async fn shutdown(&self) {
        let handle = {
            let mut control = self.shared.control();
            control.enabled = false;
            control.worker.take()
        };

        let Some(handle) = handle else { return };

        info!("waiting for database worker to exit");
        self.shared.signal.notify_one();
        if handle.await.is_ok() {
            info!("database worker exited");
        } else {
            warn!("database worker terminated abnormally");
        }
    }
}
