//! Per-category statistic tables.

use std::sync::Arc;

use sqlx::Any;
use uuid::Uuid;

use super::backend::Dialect;
use super::database::SqlContext;
use super::helpers::TableNames;
use crate::category::{MultipleCategory, NormalCategory};
use crate::dates::now_stored;

#[derive(Clone)]
pub struct StatisticRepository {
    ctx: Arc<SqlContext>,
}

impl StatisticRepository {
    pub(crate) fn new(ctx: Arc<SqlContext>) -> Self {
        Self { ctx }
    }

    /// Stored amount for `category`, `0` when absent.
    pub async fn normal_amount(&self, player: Uuid, category: NormalCategory) -> i64 {
        let column = category.db_name();
        let sql = self.ctx.sql(&format!(
            "SELECT {column} FROM {} WHERE playername = ?",
            self.ctx.tables.normal(category)
        ));
        let context = format!("Failed to read {column} statistic");
        self.ctx
            .reads
            .execute(&context, |mut conn| async move {
                let amount = sqlx::query_scalar::<Any, Option<i64>>(&sql)
                    .bind(player.to_string())
                    .fetch_optional(&mut *conn)
                    .await?;
                Ok(amount.flatten().unwrap_or(0))
            })
            .await
    }

    /// Stored amount for one subcategory of `category`, `0` when absent.
    pub async fn multiple_amount(
        &self,
        player: Uuid,
        category: MultipleCategory,
        subcategory: &str,
    ) -> i64 {
        let column = category.db_name();
        let sql = self.ctx.sql(&format!(
            "SELECT {column} FROM {} WHERE playername = ? AND {} = ?",
            self.ctx.tables.multiple(category),
            category.subcategory_column()
        ));
        let context = format!("Failed to read {column} statistic");
        self.ctx
            .reads
            .execute(&context, |mut conn| async move {
                let amount = sqlx::query_scalar::<Any, Option<i64>>(&sql)
                    .bind(player.to_string())
                    .bind(subcategory.to_string())
                    .fetch_optional(&mut *conn)
                    .await?;
                Ok(amount.flatten().unwrap_or(0))
            })
            .await
    }

    /// Number of distinct days `player` has connected on.
    pub async fn connections_amount(&self, player: Uuid) -> i64 {
        self.normal_amount(player, NormalCategory::Connections).await
    }

    /// Day of the last recorded connection, as stored.
    pub async fn connection_date(&self, player: Uuid) -> Option<String> {
        let sql = self.ctx.sql(&format!(
            "SELECT date FROM {} WHERE playername = ?",
            self.ctx.tables.normal(NormalCategory::Connections)
        ));
        self.ctx
            .reads
            .execute("Failed to read last connection date", |mut conn| async move {
                let date = sqlx::query_scalar::<Any, Option<String>>(&sql)
                    .bind(player.to_string())
                    .fetch_optional(&mut *conn)
                    .await?;
                Ok(date.flatten())
            })
            .await
    }

    /// Count a connection on `date` and return the new total.
    ///
    /// The total is computed from a read and written back through the
    /// dispatcher, so two calls for the same player that overlap before the
    /// first write lands will both see the same starting count. Returns `0`
    /// and writes nothing when the read fails.
    pub async fn update_and_get_connection(&self, player: Uuid, date: &str) -> i64 {
        let category = NormalCategory::Connections;
        let table = self.ctx.tables.normal(category);
        let read_sql = self.ctx.sql(&format!(
            "SELECT {} FROM {table} WHERE playername = ?",
            category.db_name()
        ));
        // `None` only when the read itself failed.
        let current: Option<i64> = self
            .ctx
            .reads
            .execute("Failed to handle connection event", |mut conn| async move {
                let amount = sqlx::query_scalar::<Any, Option<i64>>(&read_sql)
                    .bind(player.to_string())
                    .fetch_optional(&mut *conn)
                    .await?;
                Ok(Some(amount.flatten().unwrap_or(0)))
            })
            .await;
        let Some(current) = current else {
            return 0;
        };

        let connections = current + 1;
        let write_sql = self
            .ctx
            .dialect
            .upsert(&table, &["playername"], &[category.db_name(), "date"]);
        let date = date.to_string();
        self.ctx
            .writes
            .execute("Failed to update connections", move |mut conn| async move {
                sqlx::query(&write_sql)
                    .bind(player.to_string())
                    .bind(connections)
                    .bind(date)
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            });
        connections
    }

    /// Overwrite the amount stored for `category`. Dispatched.
    pub fn set_normal_amount(&self, player: Uuid, category: NormalCategory, amount: i64) {
        let sql = self.ctx.dialect.upsert(
            &self.ctx.tables.normal(category),
            &["playername"],
            &[category.db_name(), "date"],
        );
        let date = now_stored();
        self.ctx.writes.execute(
            format!("Failed to save {} statistic", category.db_name()),
            move |mut conn| async move {
                sqlx::query(&sql)
                    .bind(player.to_string())
                    .bind(amount)
                    .bind(date)
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            },
        );
    }

    /// Overwrite the amount stored for one subcategory of `category`. Dispatched.
    pub fn set_multiple_amount(
        &self,
        player: Uuid,
        category: MultipleCategory,
        subcategory: &str,
        amount: i64,
    ) {
        let sql = multiple_upsert_sql(self.ctx.dialect, &self.ctx.tables, category);
        let subcategory = subcategory.to_string();
        let date = now_stored();
        self.ctx.writes.execute(
            format!("Failed to save {} statistic", category.db_name()),
            move |mut conn| async move {
                sqlx::query(&sql)
                    .bind(player.to_string())
                    .bind(subcategory)
                    .bind(amount)
                    .bind(date)
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            },
        );
    }

    /// Remove the player's row for `category`. Dispatched.
    pub fn clear_normal_statistic(&self, player: Uuid, category: NormalCategory) {
        self.dispatch_clear(
            player,
            category,
            format!("Failed to clear {} statistic", category.db_name()),
        );
    }

    /// Remove the player's connection count and last connection day. Dispatched.
    pub fn clear_connection(&self, player: Uuid) {
        self.dispatch_clear(
            player,
            NormalCategory::Connections,
            "Failed to clear connections".to_string(),
        );
    }

    fn dispatch_clear(&self, player: Uuid, category: NormalCategory, context: String) {
        let sql = self.ctx.sql(&format!(
            "DELETE FROM {} WHERE playername = ?",
            self.ctx.tables.normal(category)
        ));
        self.ctx
            .writes
            .execute(context, move |mut conn| async move {
                sqlx::query(&sql)
                    .bind(player.to_string())
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            });
    }
}

/// Bind order: player, subcategory, amount, date.
fn multiple_upsert_sql(dialect: Dialect, tables: &TableNames, category: MultipleCategory) -> String {
    dialect.upsert(
        &tables.multiple(category),
        &["playername", category.subcategory_column()],
        &[category.db_name(), "date"],
    )
}
