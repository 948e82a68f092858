//! Achievement records: listing, lookup, registration and removal.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::Any;
use uuid::Uuid;

use super::backend::Dialect;
use super::database::SqlContext;
use super::helpers::{collapse_legacy_quotes, key_condition, legacy_key_form, TableNames};
use crate::dates::{now_stored, DateFormatter};

/// Lookup from achievement key to the name shown to players.
pub trait DisplayNames: Send + Sync {
    fn display_name(&self, key: &str) -> Option<String>;
}

impl DisplayNames for HashMap<String, String> {
    fn display_name(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// One achievement as presented to a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AchievementEntry {
    /// Display name, or the raw key when none is configured.
    pub name: String,
    pub message: String,
    /// Date received, formatted for display.
    pub date: String,
}

#[derive(sqlx::FromRow)]
struct AchievementRow {
    achievement: String,
    description: Option<String>,
    date: Option<String>,
}

#[derive(Clone)]
pub struct AchievementRepository {
    ctx: Arc<SqlContext>,
    dates: DateFormatter,
    chronological: bool,
    display_names: Arc<dyn DisplayNames>,
}

impl AchievementRepository {
    pub(crate) fn new(
        ctx: Arc<SqlContext>,
        dates: DateFormatter,
        chronological: bool,
        display_names: Arc<dyn DisplayNames>,
    ) -> Self {
        Self {
            ctx,
            dates,
            chronological,
            display_names,
        }
    }

    /// Every achievement of `player`, oldest first unless reverse
    /// chronological order is configured.
    pub async fn player_achievements(&self, player: Uuid) -> Vec<AchievementEntry> {
        let order = if self.chronological { "ASC" } else { "DESC" };
        let sql = self.ctx.sql(&format!(
            "SELECT achievement, description, date FROM {} WHERE playername = ? ORDER BY date {order}",
            self.ctx.tables.achievements()
        ));
        let rows: Vec<AchievementRow> = self
            .ctx
            .reads
            .execute("Failed to list player achievements", |mut conn| async move {
                sqlx::query_as::<Any, AchievementRow>(&sql)
                    .bind(player.to_string())
                    .fetch_all(&mut *conn)
                    .await
            })
            .await;

        rows.into_iter()
            .map(|row| {
                let key = collapse_legacy_quotes(&row.achievement);
                let name = self
                    .display_names
                    .display_name(&key)
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or(key);
                AchievementEntry {
                    name,
                    message: row.description.unwrap_or_default(),
                    date: row
                        .date
                        .map(|date| self.dates.format_stored(&date))
                        .unwrap_or_default(),
                }
            })
            .collect()
    }

    /// Raw keys of every achievement `player` has received.
    pub async fn achievement_names(&self, player: Uuid) -> Vec<String> {
        let sql = self.ctx.sql(&format!(
            "SELECT achievement FROM {} WHERE playername = ?",
            self.ctx.tables.achievements()
        ));
        let keys: Vec<String> = self
            .ctx
            .reads
            .execute("Failed to list player achievement names", |mut conn| async move {
                sqlx::query_scalar::<Any, String>(&sql)
                    .bind(player.to_string())
                    .fetch_all(&mut *conn)
                    .await
            })
            .await;
        keys.iter().map(|key| collapse_legacy_quotes(key)).collect()
    }

    /// Display-formatted date on which `player` received `key`.
    pub async fn achievement_date(&self, player: Uuid, key: &str) -> Option<String> {
        let legacy = legacy_key_form(key);
        let sql = self.ctx.sql(&format!(
            "SELECT date FROM {} WHERE playername = ? AND {}",
            self.ctx.tables.achievements(),
            key_condition(legacy.is_some())
        ));
        let stored: Option<String> = self
            .ctx
            .reads
            .execute("Failed to read achievement date", |mut conn| async move {
                let mut query = sqlx::query_scalar::<Any, Option<String>>(&sql)
                    .bind(player.to_string())
                    .bind(key.to_string());
                if let Some(legacy) = legacy {
                    query = query.bind(legacy);
                }
                Ok(query.fetch_optional(&mut *conn).await?.flatten())
            })
            .await;
        stored.map(|date| self.dates.format_stored(&date))
    }

    pub async fn achievement_count(&self, player: Uuid) -> i64 {
        let sql = self.ctx.sql(&format!(
            "SELECT COUNT(*) FROM {} WHERE playername = ?",
            self.ctx.tables.achievements()
        ));
        self.ctx
            .reads
            .execute("Failed to count player achievements", |mut conn| async move {
                sqlx::query_scalar::<Any, i64>(&sql)
                    .bind(player.to_string())
                    .fetch_one(&mut *conn)
                    .await
            })
            .await
    }

    /// Achievement count of every player with at least one achievement.
    pub async fn all_achievement_counts(&self) -> HashMap<Uuid, i64> {
        let sql = format!(
            "SELECT playername, COUNT(*) FROM {} GROUP BY playername",
            self.ctx.tables.achievements()
        );
        let rows: Vec<(String, i64)> = self
            .ctx
            .reads
            .execute("Failed to count achievements of all players", |mut conn| async move {
                sqlx::query_as::<Any, (String, i64)>(&sql)
                    .fetch_all(&mut *conn)
                    .await
            })
            .await;

        rows.into_iter()
            .filter_map(|(player, count)| match Uuid::parse_str(player.trim()) {
                Ok(id) => Some((id, count)),
                Err(e) => {
                    tracing::warn!(player = %player, error = %e, "Skipping row with invalid player id");
                    None
                }
            })
            .collect()
    }

    /// Record `key` for `player`, replacing any earlier record of it.
    /// The write is dispatched; this returns immediately.
    pub fn register_achievement(&self, player: Uuid, key: &str, message: &str) {
        let sql = self.ctx.dialect.upsert(
            &self.ctx.tables.achievements(),
            &["playername", "achievement"],
            &["description", "date"],
        );
        let key = key.to_string();
        let message = message.to_string();
        let date = now_stored();
        self.ctx
            .writes
            .execute("Failed to register achievement", move |mut conn| async move {
                sqlx::query(&sql)
                    .bind(player.to_string())
                    .bind(key)
                    .bind(message)
                    .bind(date)
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            });
    }

    pub async fn has_achievement(&self, player: Uuid, key: &str) -> bool {
        let legacy = legacy_key_form(key);
        let sql = has_achievement_sql(self.ctx.dialect, &self.ctx.tables, legacy.is_some());
        self.ctx
            .reads
            .execute("Failed to check achievement", |mut conn| async move {
                let mut query = sqlx::query::<Any>(&sql)
                    .bind(player.to_string())
                    .bind(key.to_string());
                if let Some(legacy) = legacy {
                    query = query.bind(legacy);
                }
                Ok(query.fetch_optional(&mut *conn).await?.is_some())
            })
            .await
    }

    /// Remove `key` from `player`, in both stored forms. Dispatched.
    pub fn delete_achievement(&self, player: Uuid, key: &str) {
        let legacy = legacy_key_form(key);
        let sql = self.ctx.sql(&format!(
            "DELETE FROM {} WHERE playername = ? AND {}",
            self.ctx.tables.achievements(),
            key_condition(legacy.is_some())
        ));
        let key = key.to_string();
        self.ctx
            .writes
            .execute("Failed to delete achievement", move |mut conn| async move {
                let mut query = sqlx::query::<Any>(&sql).bind(player.to_string()).bind(key);
                if let Some(legacy) = legacy {
                    query = query.bind(legacy);
                }
                query.execute(&mut *conn).await?;
                Ok(())
            });
    }
}

/// Bind order: player, key, then the doubled-quote key when `has_legacy_form`.
fn has_achievement_sql(dialect: Dialect, tables: &TableNames, has_legacy_form: bool) -> String {
    dialect.sql(&format!(
        "SELECT achievement FROM {} WHERE playername = ? AND {}",
        tables.achievements(),
        key_condition(has_legacy_form)
    ))
}
