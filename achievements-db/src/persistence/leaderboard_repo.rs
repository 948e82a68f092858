//! Rankings over the achievements table.
//!
//! Every query takes a `start` timestamp in epoch milliseconds. `0` (or any
//! non-positive value) considers all records; otherwise only achievements
//! received strictly after `start` count.

use std::sync::Arc;

use sqlx::Any;
use uuid::Uuid;

use super::backend::Dialect;
use super::database::SqlContext;
use super::helpers::TableNames;
use crate::dates::stored_start;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub player: Uuid,
    pub achievements: i64,
}

#[derive(Clone)]
pub struct LeaderboardRepository {
    ctx: Arc<SqlContext>,
}

impl LeaderboardRepository {
    pub(crate) fn new(ctx: Arc<SqlContext>) -> Self {
        Self { ctx }
    }

    /// Up to `length` players with the most achievements, best first.
    /// Ties are ordered by player id.
    pub async fn top_list(&self, length: u32, start_millis: i64) -> Vec<LeaderboardEntry> {
        if length == 0 {
            return Vec::new();
        }
        let start = stored_start(start_millis);
        let filter = if start.is_some() { "WHERE date > ? " } else { "" };
        let sql = self.ctx.sql(&format!(
            "SELECT playername, COUNT(*) AS total FROM {} {filter}\
             GROUP BY playername ORDER BY total DESC, playername ASC LIMIT {length}",
            self.ctx.tables.achievements()
        ));
        let rows: Vec<(String, i64)> = self
            .ctx
            .reads
            .execute("Failed to compute top list", |mut conn| async move {
                let mut query = sqlx::query_as::<Any, (String, i64)>(&sql);
                if let Some(start) = start {
                    query = query.bind(start);
                }
                query.fetch_all(&mut *conn).await
            })
            .await;

        rows.into_iter()
            .filter_map(|(player, achievements)| match Uuid::parse_str(player.trim()) {
                Ok(player) => Some(LeaderboardEntry {
                    player,
                    achievements,
                }),
                Err(e) => {
                    tracing::warn!(player = %player, error = %e, "Skipping leaderboard row with invalid player id");
                    None
                }
            })
            .collect()
    }

    /// Number of distinct players with at least one qualifying achievement.
    pub async fn total_players(&self, start_millis: i64) -> i64 {
        let start = stored_start(start_millis);
        let filter = if start.is_some() { " WHERE date > ?" } else { "" };
        let sql = self.ctx.sql(&format!(
            "SELECT COUNT(DISTINCT playername) FROM {}{filter}",
            self.ctx.tables.achievements()
        ));
        self.ctx
            .reads
            .execute("Failed to count ranked players", |mut conn| async move {
                let mut query = sqlx::query_scalar::<Any, i64>(&sql);
                if let Some(start) = start {
                    query = query.bind(start);
                }
                query.fetch_one(&mut *conn).await
            })
            .await
    }

    /// `1 +` the number of players with strictly more qualifying achievements
    /// than `player`, so tied players share a rank. `0` if the rank could not
    /// be computed.
    pub async fn player_rank(&self, player: Uuid, start_millis: i64) -> i64 {
        let start = stored_start(start_millis);
        let sql = player_rank_sql(self.ctx.dialect, &self.ctx.tables, start.is_some());
        self.ctx
            .reads
            .execute("Failed to compute player rank", |mut conn| async move {
                let mut query = sqlx::query_scalar::<Any, i64>(&sql);
                if let Some(start) = &start {
                    query = query.bind(start.clone());
                }
                query = query.bind(player.to_string());
                if let Some(start) = start {
                    query = query.bind(start);
                }
                let ahead = query.fetch_one(&mut *conn).await?;
                Ok(ahead + 1)
            })
            .await
    }
}

/// Bind order: start, player, start when `filtered`; otherwise just player.
fn player_rank_sql(dialect: Dialect, tables: &TableNames, filtered: bool) -> String {
    let (filter, player_filter) = if filtered {
        (" WHERE date > ?", " AND date > ?")
    } else {
        ("", "")
    };
    let table = tables.achievements();
    dialect.sql(&format!(
        "SELECT COUNT(*) FROM (\
         SELECT COUNT(*) AS total FROM {table}{filter} GROUP BY playername\
         ) AS totals WHERE total > (\
         SELECT COUNT(*) FROM {table} WHERE playername = ?{player_filter})"
    ))
}

#[cfg(test)]
mod tests {
    use super::player_rank_sql;
    use crate::persistence::{AchievementDatabase, Dialect, TableNames};
    use uuid::Uuid;

    #[test]
    fn test_rank_sql_numbers_postgres_placeholders_in_bind_order() {
        let tables = TableNames::new("aa_").unwrap();
        assert_eq!(
            player_rank_sql(Dialect::Postgres, &tables, true),
            "SELECT COUNT(*) FROM (SELECT COUNT(*) AS total FROM aa_achievements \
             WHERE date > $1 GROUP BY playername) AS totals WHERE total > \
             (SELECT COUNT(*) FROM aa_achievements WHERE playername = $2 AND date > $3)"
        );
        assert_eq!(
            player_rank_sql(Dialect::Postgres, &tables, false),
            "SELECT COUNT(*) FROM (SELECT COUNT(*) AS total FROM aa_achievements \
             GROUP BY playername) AS totals WHERE total > \
             (SELECT COUNT(*) FROM aa_achievements WHERE playername = $1)"
        );
    }

    #[test]
    fn test_rank_sql_keeps_mysql_placeholders() {
        let tables = TableNames::new("").unwrap();
        let sql = player_rank_sql(Dialect::MySql, &tables, true);
        assert_eq!(sql.matches('?').count(), 3);
        assert!(!sql.contains('$'));
        assert!(sql.contains("FROM achievements WHERE playername = ? AND date > ?"));
    }

    #[tokio::test]
    async fn test_empty_leaderboard() {
        let db = AchievementDatabase::new_in_memory().await.unwrap();
        let board = db.leaderboard();
        assert!(board.top_list(10, 0).await.is_empty());
        assert_eq!(board.total_players(0).await, 0);
        // Nobody is ahead of a player without achievements.
        assert_eq!(board.player_rank(Uuid::new_v4(), 0).await, 1);
    }

    #[tokio::test]
    async fn test_zero_length_top_list() {
        let db = AchievementDatabase::new_in_memory().await.unwrap();
        let player = Uuid::new_v4();
        db.achievements().register_achievement(player, "a", "m");
        db.flush().await;
        assert!(db.leaderboard().top_list(0, 0).await.is_empty());
        assert_eq!(db.leaderboard().top_list(1, 0).await.len(), 1);
    }
}
