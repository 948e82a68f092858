//! Achievement and statistic storage for a multiplayer game server.
//!
//! One [`AchievementDatabase`] is created at startup with
//! [`AchievementDatabase::builder`] and shared (it is cheap to clone). Reads
//! are awaited by the caller; writes are dispatched in the background and
//! never block. Neither surfaces errors: failed reads return an empty value
//! and failed writes are logged and dropped. Call
//! [`AchievementDatabase::shutdown`] before exiting to give pending writes a
//! chance to land.
//!
//! ```no_run
//! # async fn run() -> Result<(), achievements_db::DatabaseError> {
//! use achievements_db::{AchievementDatabase, DatabaseConfig};
//!
//! let db = AchievementDatabase::builder(DatabaseConfig::from_env())
//!     .initialise()
//!     .await?;
//! let player = uuid::Uuid::new_v4();
//! db.achievements()
//!     .register_achievement(player, "FirstJoin", "Joined the server");
//! let rank = db.leaderboard().player_rank(player, 0).await;
//! # let _ = rank;
//! db.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod category;
pub mod config;
pub mod dates;
pub mod persistence;

pub use category::{MultipleCategory, NormalCategory};
pub use config::{BackendKind, DatabaseConfig};
pub use persistence::{
    AchievementDatabase, AchievementEntry, ConnectionState, DatabaseBuilder, DatabaseError,
    DisplayNames, DrainOutcome, LeaderboardEntry, LoadStatus, SchemaUpdater,
};
