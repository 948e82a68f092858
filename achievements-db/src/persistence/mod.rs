//! SQL persistence for achievements and statistics.
//!
//! ## Connection handling
//!
//! [`ConnectionSupervisor`] owns the shared `sqlx::AnyPool`. The pool is
//! created lazily through the configured [`Backend`] and replaced with
//! compare-and-swap semantics whenever it is found closed. Every query checks
//! a connection out of that pool and returns it on drop.
//!
//! ## Reads and writes
//!
//! - Reads go through [`ReadExecutor`]: awaited by the caller, failures are
//!   logged and turned into the result type's default value.
//! - Writes go through [`WriteDispatcher`]: spawned and forgotten, failures
//!   are logged and dropped. [`AchievementDatabase::shutdown`] drains them
//!   with a fixed grace period before closing the pool.
//!
//! ## Query catalog
//!
//! | Type | Tables |
//! |------|--------|
//! | [`AchievementRepository`] | `achievements` |
//! | [`LeaderboardRepository`] | `achievements` (aggregates) |
//! | [`StatisticRepository`] | one table per [`crate::category`] entry |
//!
//! Table names are `<prefix><name>`. The prefix is validated at startup and
//! category names come from a closed enumeration; every other value is bound.

mod achievement_repo;
mod backend;
mod database;
mod dispatcher;
pub(crate) mod helpers;
mod leaderboard_repo;
mod reader;
mod schema;
mod statistic_repo;
mod supervisor;

pub use achievement_repo::{AchievementEntry, AchievementRepository, DisplayNames};
pub use backend::{backend_for, Backend, Dialect, MySqlBackend, PostgresBackend, SqliteBackend};
pub use database::{AchievementDatabase, DatabaseBuilder, SHUTDOWN_GRACE_PERIOD};
pub use dispatcher::{DrainOutcome, WriteDispatcher};
pub use helpers::TableNames;
pub use leaderboard_repo::{LeaderboardEntry, LeaderboardRepository};
pub use reader::ReadExecutor;
pub use schema::{SchemaContext, SchemaUpdater, StandardSchema};
pub use statistic_repo::StatisticRepository;
pub use supervisor::{ConnectionState, ConnectionSupervisor};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Errors from the persistence layer.
///
/// Only startup and shutdown surface these to the host; catalog operations
/// absorb them (see [`ReadExecutor`] and [`WriteDispatcher`]).
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("No {0} driver available in this build")]
    DriverUnavailable(&'static str),
    #[error("Connection error: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("SQL error: {0}")]
    Query(#[from] sqlx::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database connection has been shut down")]
    ShutDown,
    #[error("Invalid table prefix {0:?}: only ASCII letters, digits and underscores are allowed")]
    InvalidPrefix(String),
    #[error("Invalid database address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("Schema update step '{step}' failed: {source}")]
    SchemaUpdate {
        step: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// Shared "load failed" signal.
///
/// Raised when the driver cannot be prepared or a connection cannot be
/// established; the host checks it to abort its own startup.
#[derive(Debug, Clone, Default)]
pub struct LoadStatus {
    failed: Arc<AtomicBool>,
}

impl LoadStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::Release);
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}
