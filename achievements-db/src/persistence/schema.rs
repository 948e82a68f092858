//! Startup schema updates.
//!
//! The host supplies a [`SchemaUpdater`]; [`run_schema_updates`] drives it
//! through the fixed step order once, before any catalog operation runs.
//! [`StandardSchema`] only creates missing tables.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::AnyPool;

use super::backend::Dialect;
use super::helpers::TableNames;
use super::DatabaseError;
use crate::category::{MultipleCategory, NormalCategory};

/// What a schema step gets to work with.
pub struct SchemaContext {
    pub pool: Arc<AnyPool>,
    pub dialect: Dialect,
    pub tables: TableNames,
}

#[async_trait]
pub trait SchemaUpdater: Send + Sync {
    async fn rename_legacy_tables(&self, _ctx: &SchemaContext) -> Result<(), sqlx::Error> {
        Ok(())
    }

    async fn create_missing_tables(&self, ctx: &SchemaContext) -> Result<(), sqlx::Error>;

    async fn migrate_legacy_types(&self, _ctx: &SchemaContext) -> Result<(), sqlx::Error> {
        Ok(())
    }

    async fn migrate_legacy_dates(&self, _ctx: &SchemaContext) -> Result<(), sqlx::Error> {
        Ok(())
    }

    async fn migrate_legacy_column_sizes(&self, _ctx: &SchemaContext) -> Result<(), sqlx::Error> {
        Ok(())
    }
}

pub(crate) async fn run_schema_updates(
    updater: &dyn SchemaUpdater,
    ctx: &SchemaContext,
) -> Result<(), DatabaseError> {
    run_step("rename_legacy_tables", updater.rename_legacy_tables(ctx)).await?;
    run_step("create_missing_tables", updater.create_missing_tables(ctx)).await?;
    run_step("migrate_legacy_types", updater.migrate_legacy_types(ctx)).await?;
    run_step("migrate_legacy_dates", updater.migrate_legacy_dates(ctx)).await?;
    run_step(
        "migrate_legacy_column_sizes",
        updater.migrate_legacy_column_sizes(ctx),
    )
    .await?;
    tracing::info!(prefix = ctx.tables.prefix(), "Database schema up to date");
    Ok(())
}

async fn run_step<F>(step: &'static str, fut: F) -> Result<(), DatabaseError>
where
    F: Future<Output = Result<(), sqlx::Error>>,
{
    tracing::debug!(step, "Running schema update step");
    fut.await.map_err(|source| {
        tracing::error!(step, error = %source, "Schema update step failed");
        DatabaseError::SchemaUpdate { step, source }
    })
}

/// Creates the achievements table and one table per statistic category.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardSchema;

impl StandardSchema {
    fn table_ddl(dialect: Dialect, tables: &TableNames) -> Vec<String> {
        let suffix = match dialect {
            Dialect::MySql => " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            Dialect::Sqlite | Dialect::Postgres => "",
        };
        let mut ddl = Vec::with_capacity(1 + NormalCategory::ALL.len() + MultipleCategory::ALL.len());
        ddl.push(format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             playername VARCHAR(36) NOT NULL, \
             achievement VARCHAR(64) NOT NULL, \
             description VARCHAR(255), \
             date VARCHAR(32), \
             PRIMARY KEY (playername, achievement)){suffix}",
            tables.achievements()
        ));
        for category in NormalCategory::ALL {
            ddl.push(format!(
                "CREATE TABLE IF NOT EXISTS {} (\
                 playername VARCHAR(36) NOT NULL, \
                 {} BIGINT, \
                 date VARCHAR(32), \
                 PRIMARY KEY (playername)){suffix}",
                tables.normal(category),
                category.db_name()
            ));
        }
        for category in MultipleCategory::ALL {
            ddl.push(format!(
                "CREATE TABLE IF NOT EXISTS {} (\
                 playername VARCHAR(36) NOT NULL, \
                 {sub} VARCHAR(128) NOT NULL, \
                 {} BIGINT, \
                 date VARCHAR(32), \
                 PRIMARY KEY (playername, {sub})){suffix}",
                tables.multiple(category),
                category.db_name(),
                sub = category.subcategory_column()
            ));
        }
        ddl
    }
}

#[async_trait]
impl SchemaUpdater for StandardSchema {
    async fn create_missing_tables(&self, ctx: &SchemaContext) -> Result<(), sqlx::Error> {
        for statement in Self::table_ddl(ctx.dialect, &ctx.tables) {
            sqlx::query(&statement).execute(ctx.pool.as_ref()).await?;
        }
        Ok(())
    }
}
