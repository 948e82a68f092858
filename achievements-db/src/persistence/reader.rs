use std::future::Future;
use std::sync::Arc;

use sqlx::pool::PoolConnection;
use sqlx::Any;

use super::supervisor::ConnectionSupervisor;

/// Runs reads on the caller's task.
///
/// A failed read is logged with the caller's context and replaced by
/// `T::default()`, so callers see `0`, `false`, `None` or an empty collection
/// instead of an error.
#[derive(Clone)]
pub struct ReadExecutor {
    supervisor: Arc<ConnectionSupervisor>,
}

impl ReadExecutor {
    pub fn new(supervisor: Arc<ConnectionSupervisor>) -> Self {
        Self { supervisor }
    }

    pub async fn execute<T, F, Fut>(&self, context: &str, op: F) -> T
    where
        T: Default,
        F: FnOnce(PoolConnection<Any>) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let conn = match self.supervisor.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "{context}");
                return T::default();
            }
        };
        match op(conn).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "{context}");
                T::default()
            }
        }
    }
}
