use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sqlx::pool::PoolConnection;
use sqlx::Any;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::supervisor::ConnectionSupervisor;

/// Result of draining the dispatcher at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every dispatched write finished within the grace period.
    Drained,
    /// The grace period elapsed with writes still running; they were abandoned.
    TimedOut { pending: usize },
    /// The wait was cancelled before the writes finished.
    Interrupted,
}

/// Fire-and-forget write submission.
///
/// Every write runs as its own task on the runtime captured at construction,
/// so concurrency grows with demand and the submitting thread never waits.
/// Failures are logged with the submitter's context and dropped. There is no
/// ordering between writes; callers sequence their own read-modify-write.
pub struct WriteDispatcher {
    supervisor: Arc<ConnectionSupervisor>,
    tracker: TaskTracker,
    runtime: Handle,
    /// Guards the tracker's open/closed transitions as well as the flag.
    draining: Mutex<bool>,
    /// Fired when draining ends; writes still running drop their connection.
    abandon: CancellationToken,
    flush_lock: tokio::sync::Mutex<()>,
}

impl WriteDispatcher {
    /// Must be called from within a tokio runtime.
    pub fn new(supervisor: Arc<ConnectionSupervisor>) -> Self {
        Self::with_runtime(supervisor, Handle::current())
    }

    pub fn with_runtime(supervisor: Arc<ConnectionSupervisor>, runtime: Handle) -> Self {
        Self {
            supervisor,
            tracker: TaskTracker::new(),
            runtime,
            draining: Mutex::new(false),
            abandon: CancellationToken::new(),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Submit a write. Returns immediately; the outcome is only ever logged.
    ///
    /// Writes submitted while [`drain`](Self::drain) is waiting are accepted
    /// and run like any other. Once the drain has finished, new and unfinished
    /// writes are abandoned without reaching the database, and anything that
    /// still gets through fails with a shut-down error after the pool closes.
    pub fn execute<F, Fut>(&self, context: impl Into<Cow<'static, str>>, op: F)
    where
        F: FnOnce(PoolConnection<Any>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), sqlx::Error>> + Send + 'static,
    {
        let context = context.into();
        if *self.draining.lock() {
            tracing::debug!(context = %context, "Write submitted during shutdown");
        }
        let supervisor = self.supervisor.clone();
        let abandon = self.abandon.clone();
        self.tracker.spawn_on(
            async move {
                tokio::select! {
                    biased;
                    () = abandon.cancelled() => {
                        tracing::debug!(context = %context, "Write abandoned at shutdown");
                    }
                    () = run_write(&supervisor, &context, op) => {}
                }
            },
            &self.runtime,
        );
    }

    /// Number of dispatched writes that have not finished.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every write dispatched so far. Writes keep being accepted.
    pub async fn flush(&self) {
        let _guard = self.flush_lock.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        let draining = self.draining.lock();
        if !*draining {
            self.tracker.reopen();
        }
    }

    /// Stop waiting on writes after `grace`, or as soon as `cancel` fires.
    ///
    /// Writes still running at that point are abandoned and release their
    /// connection, so closing the pool afterwards does not wait on them.
    pub async fn drain(&self, grace: Duration, cancel: &CancellationToken) -> DrainOutcome {
        {
            let mut draining = self.draining.lock();
            *draining = true;
            self.tracker.close();
        }

        let outcome = tokio::select! {
            result = tokio::time::timeout(grace, self.tracker.wait()) => match result {
                Ok(()) => DrainOutcome::Drained,
                Err(_) => DrainOutcome::TimedOut { pending: self.tracker.len() },
            },
            _ = cancel.cancelled() => DrainOutcome::Interrupted,
        };
        self.abandon.cancel();

        match outcome {
            DrainOutcome::Drained => tracing::debug!("All pending writes completed"),
            DrainOutcome::TimedOut { pending } => tracing::warn!(
                pending,
                grace_secs = grace.as_secs(),
                "Some write operations were not sent to the database"
            ),
            DrainOutcome::Interrupted => {
                tracing::error!(
                    pending = self.tracker.len(),
                    "Interrupted while waiting for pending writes"
                );
                // Keep the signal visible to whoever else is watching the token.
                cancel.cancel();
            }
        }
        outcome
    }
}

async fn run_write<F, Fut>(supervisor: &ConnectionSupervisor, context: &str, op: F)
where
    F: FnOnce(PoolConnection<Any>) -> Fut,
    Fut: Future<Output = Result<(), sqlx::Error>>,
{
    let conn = match supervisor.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(error = %e, "{context}");
            return;
        }
    };
    if let Err(e) = op(conn).await {
        tracing::error!(error = %e, "{context}");
    }
}
