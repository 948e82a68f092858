//! Per-dialect connection strategies and SQL shaping.
//!
//! Every backend is reached through `sqlx::any`, so the drivers are installed
//! once at startup and the dialect differences left to handle are the
//! connection URL, placeholder syntax and the replace-upsert statement.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{AnyConnectOptions, AnyPoolOptions};
use sqlx::AnyPool;
use url::Url;

use crate::config::{BackendKind, DatabaseConfig};
use crate::persistence::DatabaseError;

/// SQL flavour spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

impl Dialect {
    /// Rewrite `?` placeholders into the dialect's bind syntax.
    ///
    /// Templates must not contain a literal `?`; identifiers come from
    /// [`crate::persistence::TableNames`] and the category enumeration.
    pub fn sql(self, template: &str) -> String {
        match self {
            Self::Sqlite | Self::MySql => template.to_string(),
            Self::Postgres => {
                let mut out = String::with_capacity(template.len() + 8);
                let mut index = 0;
                for ch in template.chars() {
                    if ch == '?' {
                        index += 1;
                        out.push('$');
                        out.push_str(&index.to_string());
                    } else {
                        out.push(ch);
                    }
                }
                out
            }
        }
    }

    /// Replace-upsert: a row matching `keys` is overwritten with `values`.
    /// Bind order is `keys` followed by `values`.
    pub fn upsert(self, table: &str, keys: &[&str], values: &[&str]) -> String {
        let columns: Vec<&str> = keys.iter().chain(values).copied().collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let template = match self {
            Self::Sqlite => format!(
                "INSERT OR REPLACE INTO {table} ({}) VALUES ({placeholders})",
                columns.join(", ")
            ),
            Self::MySql => format!(
                "REPLACE INTO {table} ({}) VALUES ({placeholders})",
                columns.join(", ")
            ),
            Self::Postgres => {
                let updates: Vec<String> = values
                    .iter()
                    .map(|column| format!("{column} = EXCLUDED.{column}"))
                    .collect();
                format!(
                    "INSERT INTO {table} ({}) VALUES ({placeholders}) \
                     ON CONFLICT ({}) DO UPDATE SET {}",
                    columns.join(", "),
                    keys.join(", "),
                    updates.join(", ")
                )
            }
        };
        self.sql(&template)
    }
}

/// Connection strategy for one SQL dialect.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn dialect(&self) -> Dialect;

    /// One-time driver bootstrap. Fails when the dialect's driver was not
    /// compiled into this build.
    fn prepare_driver(&self) -> Result<(), DatabaseError>;

    /// Connection URL built from address, credentials and extra options.
    fn connection_url(&self, config: &DatabaseConfig) -> Result<String, DatabaseError>;

    fn pool_options(&self, config: &DatabaseConfig) -> AnyPoolOptions {
        AnyPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .test_before_acquire(true)
    }

    /// Open a new pool. Transport and authentication failures map to
    /// [`DatabaseError::Connection`].
    async fn open_connection(&self, config: &DatabaseConfig) -> Result<AnyPool, DatabaseError> {
        let url = self.connection_url(config)?;
        connect_pool(&url, self.pool_options(config)).await
    }
}

async fn connect_pool(url: &str, options: AnyPoolOptions) -> Result<AnyPool, DatabaseError> {
    let connect_options = AnyConnectOptions::from_str(url).map_err(DatabaseError::Connection)?;
    options
        .connect_with(connect_options)
        .await
        .map_err(DatabaseError::Connection)
}

fn install_drivers(enabled: bool, name: &'static str) -> Result<(), DatabaseError> {
    if !enabled {
        return Err(DatabaseError::DriverUnavailable(name));
    }
    sqlx::any::install_default_drivers();
    Ok(())
}

/// Select the strategy for a configured backend.
pub fn backend_for(kind: BackendKind) -> Arc<dyn Backend> {
    match kind {
        BackendKind::Sqlite => Arc::new(SqliteBackend),
        BackendKind::Postgresql => Arc::new(PostgresBackend),
        BackendKind::Mysql => Arc::new(MySqlBackend),
    }
}

// ── SQLite ─────────────────────────────────────────────────────────────

/// SQLite file or in-memory database.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteBackend;

impl SqliteBackend {
    fn is_memory(address: &str) -> bool {
        let address = strip_jdbc(address, &["sqlite"]);
        address.is_empty() || address == ":memory:"
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn prepare_driver(&self) -> Result<(), DatabaseError> {
        install_drivers(cfg!(feature = "sqlite"), "sqlite")
    }

    fn connection_url(&self, config: &DatabaseConfig) -> Result<String, DatabaseError> {
        let options = trim_options(&config.additional_options);
        if Self::is_memory(&config.address) {
            return Ok("sqlite::memory:".to_string());
        }
        let path = strip_jdbc(&config.address, &["sqlite"]);
        let mut url = format!("sqlite:{path}?mode=rwc");
        if !options.is_empty() {
            url.push('&');
            url.push_str(options);
        }
        Ok(url)
    }

    fn pool_options(&self, config: &DatabaseConfig) -> AnyPoolOptions {
        let options = AnyPoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .test_before_acquire(true);
        if Self::is_memory(&config.address) {
            // Each in-memory connection is its own database: keep exactly one alive.
            options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            options.max_connections(config.max_connections.max(1))
        }
    }

    async fn open_connection(&self, config: &DatabaseConfig) -> Result<AnyPool, DatabaseError> {
        if !Self::is_memory(&config.address) {
            let path = std::path::Path::new(strip_jdbc(&config.address, &["sqlite"]));
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }
        let url = self.connection_url(config)?;
        connect_pool(&url, self.pool_options(config)).await
    }
}

// ── PostgreSQL ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresBackend;

#[async_trait]
impl Backend for PostgresBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgresql
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn prepare_driver(&self) -> Result<(), DatabaseError> {
        install_drivers(cfg!(feature = "postgres"), "postgres")
    }

    fn connection_url(&self, config: &DatabaseConfig) -> Result<String, DatabaseError> {
        server_url("postgres", &["postgresql", "postgres"], config)
    }
}

// ── MySQL ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlBackend;

#[async_trait]
impl Backend for MySqlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Mysql
    }

    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn prepare_driver(&self) -> Result<(), DatabaseError> {
        install_drivers(cfg!(feature = "mysql"), "mysql")
    }

    fn connection_url(&self, config: &DatabaseConfig) -> Result<String, DatabaseError> {
        server_url("mysql", &["mysql", "mariadb"], config)
    }
}

// ── URL construction ───────────────────────────────────────────────────

/// Strip a legacy `jdbc:` prefix and any of the given schemes
/// (`jdbc:mysql://host/db` -> `host/db`).
fn strip_jdbc<'a>(address: &'a str, schemes: &[&str]) -> &'a str {
    let address = address.trim();
    let address = address.strip_prefix("jdbc:").unwrap_or(address);
    for scheme in schemes {
        if let Some(rest) = address
            .strip_prefix(scheme)
            .and_then(|rest| rest.strip_prefix(':'))
        {
            return rest.strip_prefix("//").unwrap_or(rest);
        }
    }
    address
}

fn trim_options(options: &str) -> &str {
    options.trim().trim_start_matches(['?', '&'])
}

fn server_url(
    scheme: &str,
    legacy_schemes: &[&str],
    config: &DatabaseConfig,
) -> Result<String, DatabaseError> {
    let invalid = |reason: &str| DatabaseError::InvalidAddress {
        address: config.address.clone(),
        reason: reason.to_string(),
    };

    let location = strip_jdbc(&config.address, legacy_schemes);
    if location.is_empty() {
        return Err(invalid("address is empty"));
    }

    let mut url =
        Url::parse(&format!("{scheme}://{location}")).map_err(|e| invalid(&e.to_string()))?;
    if !config.user.is_empty() {
        url.set_username(&config.user)
            .map_err(|_| invalid("address cannot carry credentials"))?;
    }
    if !config.password.is_empty() {
        url.set_password(Some(&config.password))
            .map_err(|_| invalid("address cannot carry credentials"))?;
    }

    let options = trim_options(&config.additional_options);
    if !options.is_empty() {
        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{options}"),
            _ => options.to_string(),
        };
        url.set_query(Some(&query));
    }

    Ok(url.to_string())
}
