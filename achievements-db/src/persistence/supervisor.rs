//! Lifecycle of the shared connection pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyPool};

use super::backend::Backend;
use super::{DatabaseError, LoadStatus};
use crate::config::DatabaseConfig;

/// How long [`ConnectionSupervisor::close`] waits for connections in use.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Observable connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Open,
    /// The held pool was found closed; the next access replaces it.
    Reconnecting,
    /// Terminal, reached through [`ConnectionSupervisor::close`].
    Closed,
}

enum Install {
    Installed,
    /// Another caller replaced the observed pool first.
    Lost(Arc<AnyPool>),
    ShutDown,
}

/// Owns the shared pool and replaces it when it is found closed.
///
/// There is no reconnect lock: callers that observe a dead pool each build a
/// replacement, the first to swap it in wins and the others close theirs.
pub struct ConnectionSupervisor {
    backend: Arc<dyn Backend>,
    config: DatabaseConfig,
    current: Mutex<Option<Arc<AnyPool>>>,
    closed: AtomicBool,
    load_status: LoadStatus,
}

impl ConnectionSupervisor {
    pub fn new(backend: Arc<dyn Backend>, config: DatabaseConfig, load_status: LoadStatus) -> Self {
        Self {
            backend,
            config,
            current: Mutex::new(None),
            closed: AtomicBool::new(false),
            load_status,
        }
    }

    /// Check a connection out of the live pool. It returns to the pool on drop.
    pub async fn acquire(&self) -> Result<PoolConnection<Any>, DatabaseError> {
        let pool = self.pool().await?;
        pool.acquire().await.map_err(DatabaseError::Connection)
    }

    /// The live pool, opening or replacing it if needed.
    pub async fn pool(&self) -> Result<Arc<AnyPool>, DatabaseError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DatabaseError::ShutDown);
        }

        let observed = self.current.lock().clone();
        if let Some(pool) = observed.as_ref().filter(|pool| !pool.is_closed()) {
            return Ok(pool.clone());
        }

        let fresh = match self.backend.open_connection(&self.config).await {
            Ok(pool) => Arc::new(pool),
            Err(e) => {
                tracing::error!(
                    backend = self.backend.kind().as_str(),
                    error = %e,
                    "Error while attempting to retrieve connection to database"
                );
                self.load_status.mark_failed();
                return Err(e);
            }
        };

        match self.compare_and_install(observed.as_ref(), &fresh) {
            Install::Installed => {
                tracing::info!(
                    backend = self.backend.kind().as_str(),
                    replaced = observed.is_some(),
                    "Database connection pool opened"
                );
                Ok(fresh)
            }
            Install::Lost(winner) => {
                tracing::debug!("Concurrent reconnect already installed a pool, closing ours");
                fresh.close().await;
                Ok(winner)
            }
            Install::ShutDown => {
                fresh.close().await;
                Err(DatabaseError::ShutDown)
            }
        }
    }

    fn compare_and_install(&self, observed: Option<&Arc<AnyPool>>, fresh: &Arc<AnyPool>) -> Install {
        let mut slot = self.current.lock();
        if self.closed.load(Ordering::Acquire) {
            return Install::ShutDown;
        }
        let unchanged = match (slot.as_ref(), observed) {
            (Some(held), Some(observed)) => Arc::ptr_eq(held, observed),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            *slot = Some(fresh.clone());
            return Install::Installed;
        }
        match slot.as_ref() {
            Some(winner) => Install::Lost(winner.clone()),
            None => Install::ShutDown,
        }
    }

    /// Close the pool for good. Later acquisitions fail with
    /// [`DatabaseError::ShutDown`].
    ///
    /// Waits at most [`CLOSE_TIMEOUT`] for checked-out connections to come
    /// back; the pool is marked closed either way.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let pool = self.current.lock().take();
        if let Some(pool) = pool {
            match tokio::time::timeout(CLOSE_TIMEOUT, pool.close()).await {
                Ok(()) => tracing::info!("Database connection closed"),
                Err(_) => tracing::warn!(
                    in_use = (pool.size() as usize).saturating_sub(pool.num_idle()),
                    "Database connection closed with connections still in use"
                ),
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.closed.load(Ordering::Acquire) {
            return ConnectionState::Closed;
        }
        match self.current.lock().as_ref() {
            None => ConnectionState::Uninitialized,
            Some(pool) if pool.is_closed() => ConnectionState::Reconnecting,
            Some(_) => ConnectionState::Open,
        }
    }

    /// The currently installed pool, without liveness checks or reconnection.
    #[cfg(test)]
    pub(crate) fn installed(&self) -> Option<Arc<AnyPool>> {
        self.current.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::persistence::backend::{Dialect, SqliteBackend};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// SQLite backend that records every pool it opens.
    #[derive(Default)]
    struct RecordingBackend {
        opened: Mutex<Vec<Arc<AnyPool>>>,
        opens: AtomicUsize,
    }

    #[async_trait]
    impl Backend for RecordingBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Sqlite
        }

        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        fn prepare_driver(&self) -> Result<(), DatabaseError> {
            SqliteBackend.prepare_driver()
        }

        fn connection_url(&self, config: &DatabaseConfig) -> Result<String, DatabaseError> {
            SqliteBackend.connection_url(config)
        }

        async fn open_connection(&self, config: &DatabaseConfig) -> Result<AnyPool, DatabaseError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            // Yield so that concurrent callers interleave between observe and install.
            tokio::task::yield_now().await;
            let pool = SqliteBackend.open_connection(config).await?;
            self.opened.lock().push(Arc::new(pool.clone()));
            Ok(pool)
        }
    }

    /// Backend whose connections always fail.
    struct UnreachableBackend;

    #[async_trait]
    impl Backend for UnreachableBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Postgresql
        }

        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        fn prepare_driver(&self) -> Result<(), DatabaseError> {
            Ok(())
        }

        fn connection_url(&self, _config: &DatabaseConfig) -> Result<String, DatabaseError> {
            Ok("postgres://nowhere.invalid/aa".to_string())
        }

        async fn open_connection(&self, _config: &DatabaseConfig) -> Result<AnyPool, DatabaseError> {
            Err(DatabaseError::Connection(sqlx::Error::PoolTimedOut))
        }
    }

    fn supervisor_with(backend: Arc<dyn Backend>) -> (ConnectionSupervisor, LoadStatus) {
        backend.prepare_driver().unwrap();
        let status = LoadStatus::new();
        let supervisor =
            ConnectionSupervisor::new(backend, DatabaseConfig::in_memory(), status.clone());
        (supervisor, status)
    }

    #[tokio::test]
    async fn test_acquire_opens_lazily() {
        let (supervisor, status) = supervisor_with(Arc::new(SqliteBackend));
        assert_eq!(supervisor.state(), ConnectionState::Uninitialized);

        let mut conn = supervisor.acquire().await.unwrap();
        let one: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(one, 1);
        assert_eq!(supervisor.state(), ConnectionState::Open);
        assert!(!status.is_failed());
    }

    #[tokio::test]
    async fn test_acquire_reuses_live_pool() {
        let backend = Arc::new(RecordingBackend::default());
        let (supervisor, _) = supervisor_with(backend.clone());

        let first = supervisor.pool().await.unwrap();
        let second = supervisor.pool().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_pool_is_replaced_on_next_access() {
        let backend = Arc::new(RecordingBackend::default());
        let (supervisor, _) = supervisor_with(backend.clone());

        let first = supervisor.pool().await.unwrap();
        first.close().await;
        assert_eq!(supervisor.state(), ConnectionState::Reconnecting);

        let second = supervisor.pool().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_closed());
        assert_eq!(supervisor.state(), ConnectionState::Open);
        assert_eq!(backend.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_reconnect_keeps_one_pool() {
        let backend = Arc::new(RecordingBackend::default());
        let (supervisor, _) = supervisor_with(backend.clone());

        let (a, b) = tokio::join!(supervisor.pool(), supervisor.pool());
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(!a.is_closed());
        assert!(!b.is_closed());

        let installed = supervisor.installed().unwrap();
        let opened = backend.opened.lock().clone();
        assert_eq!(opened.len(), 2, "both callers observed an empty slot");
        // Exactly one of the two pools survived; the loser closed its own.
        let live: Vec<_> = opened.iter().filter(|pool| !pool.is_closed()).collect();
        assert_eq!(live.len(), 1);
        assert!(!installed.is_closed());
    }

    #[tokio::test]
    async fn test_connection_failure_marks_load_failed() {
        let (supervisor, status) = supervisor_with(Arc::new(UnreachableBackend));
        let result = supervisor.acquire().await;
        assert!(matches!(result, Err(DatabaseError::Connection(_))));
        assert!(status.is_failed());
        assert_eq!(supervisor.state(), ConnectionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let (supervisor, _) = supervisor_with(Arc::new(SqliteBackend));
        let pool = supervisor.pool().await.unwrap();
        supervisor.close().await;

        assert!(pool.is_closed());
        assert_eq!(supervisor.state(), ConnectionState::Closed);
        assert!(matches!(supervisor.acquire().await, Err(DatabaseError::ShutDown)));
    }

    #[tokio::test]
    async fn test_close_does_not_wait_on_held_connection() {
        let (supervisor, _) = supervisor_with(Arc::new(SqliteBackend));
        let held = supervisor.acquire().await.unwrap();
        let pool = supervisor.installed().unwrap();

        tokio::time::timeout(CLOSE_TIMEOUT * 3, supervisor.close())
            .await
            .expect("close waited on a checked-out connection");
        assert!(pool.is_closed());
        assert_eq!(supervisor.state(), ConnectionState::Closed);
        drop(held);
    }
}
