//! Startup, shutdown and shared plumbing for the repositories.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::achievement_repo::{AchievementRepository, DisplayNames};
use super::backend::{backend_for, Backend, Dialect};
use super::dispatcher::{DrainOutcome, WriteDispatcher};
use super::helpers::TableNames;
use super::leaderboard_repo::LeaderboardRepository;
use super::reader::ReadExecutor;
use super::schema::{run_schema_updates, SchemaContext, SchemaUpdater, StandardSchema};
use super::statistic_repo::StatisticRepository;
use super::supervisor::{ConnectionState, ConnectionSupervisor};
use super::{DatabaseError, LoadStatus};
use crate::config::DatabaseConfig;
use crate::dates::DateFormatter;

/// How long shutdown waits for dispatched writes before closing the pool.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Everything a repository needs to run a query.
pub(crate) struct SqlContext {
    pub(crate) reads: ReadExecutor,
    pub(crate) writes: WriteDispatcher,
    pub(crate) dialect: Dialect,
    pub(crate) tables: TableNames,
}

impl SqlContext {
    /// Render a `?`-placeholder template for the active dialect.
    pub(crate) fn sql(&self, template: &str) -> String {
        self.dialect.sql(template)
    }
}

/// Handle to an initialised database. Cheap to clone.
#[derive(Clone)]
pub struct AchievementDatabase {
    supervisor: Arc<ConnectionSupervisor>,
    ctx: Arc<SqlContext>,
    achievements: AchievementRepository,
    leaderboard: LeaderboardRepository,
    statistics: StatisticRepository,
    load_status: LoadStatus,
}

impl AchievementDatabase {
    pub fn builder(config: DatabaseConfig) -> DatabaseBuilder {
        DatabaseBuilder::new(config)
    }

    /// In-memory SQLite database with every table created.
    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Self, DatabaseError> {
        Self::builder(DatabaseConfig::in_memory()).initialise().await
    }

    /// Raw pool access for seeding rows the public API cannot produce.
    #[cfg(test)]
    pub(crate) async fn pool(&self) -> Arc<sqlx::AnyPool> {
        self.supervisor.pool().await.unwrap()
    }

    pub fn achievements(&self) -> &AchievementRepository {
        &self.achievements
    }

    pub fn leaderboard(&self) -> &LeaderboardRepository {
        &self.leaderboard
    }

    pub fn statistics(&self) -> &StatisticRepository {
        &self.statistics
    }

    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn load_status(&self) -> &LoadStatus {
        &self.load_status
    }

    pub fn pending_writes(&self) -> usize {
        self.ctx.writes.pending()
    }

    /// Wait until every write dispatched so far has completed.
    pub async fn flush(&self) {
        self.ctx.writes.flush().await;
    }

    /// Drain pending writes for up to [`SHUTDOWN_GRACE_PERIOD`], then close
    /// the connection.
    pub async fn shutdown(&self) -> DrainOutcome {
        self.shutdown_with(&CancellationToken::new()).await
    }

    /// Like [`shutdown`](Self::shutdown), but the wait for pending writes ends
    /// early when `cancel` fires. The connection is closed either way.
    pub async fn shutdown_with(&self, cancel: &CancellationToken) -> DrainOutcome {
        tracing::info!(pending = self.pending_writes(), "Shutting down database");
        let outcome = self.ctx.writes.drain(SHUTDOWN_GRACE_PERIOD, cancel).await;
        self.supervisor.close().await;
        outcome
    }
}

/// Configures and initialises an [`AchievementDatabase`].
pub struct DatabaseBuilder {
    config: DatabaseConfig,
    backend: Option<Arc<dyn Backend>>,
    display_names: Arc<dyn DisplayNames>,
    schema: Arc<dyn SchemaUpdater>,
    load_status: LoadStatus,
}

impl DatabaseBuilder {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            backend: None,
            display_names: Arc::new(HashMap::<String, String>::new()),
            schema: Arc::new(StandardSchema),
            load_status: LoadStatus::new(),
        }
    }

    /// Lookup from achievement key to the name shown to players.
    pub fn display_names(mut self, names: Arc<dyn DisplayNames>) -> Self {
        self.display_names = names;
        self
    }

    pub fn schema(mut self, schema: Arc<dyn SchemaUpdater>) -> Self {
        self.schema = schema;
        self
    }

    /// Flag raised when startup fails; share it with the host.
    pub fn load_status(mut self, status: LoadStatus) -> Self {
        self.load_status = status;
        self
    }

    /// Override the backend chosen from the configuration.
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Prepare the driver, open the connection and run the schema updates.
    ///
    /// Must be called from within a tokio runtime; dispatched writes run on it.
    pub async fn initialise(self) -> Result<AchievementDatabase, DatabaseError> {
        let Self {
            config,
            backend,
            display_names,
            schema,
            load_status,
        } = self;
        let backend = backend.unwrap_or_else(|| backend_for(config.backend));
        tracing::info!(
            backend = backend.kind().as_str(),
            prefix = %config.table_prefix,
            "Initialising database"
        );

        let tables = TableNames::new(&config.table_prefix)
            .map_err(|e| startup_failure(&load_status, e))?;
        backend
            .prepare_driver()
            .map_err(|e| startup_failure(&load_status, e))?;
        let dialect = backend.dialect();

        let supervisor = Arc::new(ConnectionSupervisor::new(
            backend,
            config.clone(),
            load_status.clone(),
        ));
        // Connection failures are logged and flagged by the supervisor.
        let pool = supervisor.pool().await?;

        let schema_ctx = SchemaContext {
            pool,
            dialect,
            tables: tables.clone(),
        };
        run_schema_updates(schema.as_ref(), &schema_ctx)
            .await
            .map_err(|e| {
                load_status.mark_failed();
                e
            })?;

        let ctx = Arc::new(SqlContext {
            reads: ReadExecutor::new(supervisor.clone()),
            writes: WriteDispatcher::new(supervisor.clone()),
            dialect,
            tables,
        });
        let dates = DateFormatter::new(&config.date_locale, config.date_display_time);

        Ok(AchievementDatabase {
            achievements: AchievementRepository::new(
                ctx.clone(),
                dates,
                config.chronological_order,
                display_names,
            ),
            leaderboard: LeaderboardRepository::new(ctx.clone()),
            statistics: StatisticRepository::new(ctx.clone()),
            supervisor,
            ctx,
            load_status,
        })
    }
}

fn startup_failure(status: &LoadStatus, error: DatabaseError) -> DatabaseError {
    tracing::error!(error = %error, "Database initialisation failed");
    status.mark_failed();
    error
}
