//! Configuration consumed by the database layer.
//!
//! Values come from the host's configuration file (any serde format) or from
//! the environment, with the following precedence:
//! 1. `ACHIEVEMENTS_DB_*` environment variables
//! 2. Built-in defaults (SQLite file `./data/achievements.db`, no prefix)

use serde::Deserialize;

const DEFAULT_SQLITE_ADDRESS: &str = "./data/achievements.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    #[serde(alias = "postgres")]
    Postgresql,
    Mysql,
}

impl BackendKind {
    /// Parse the names accepted by the `ACHIEVEMENTS_DB_TYPE` variable.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "postgresql" | "postgres" => Some(Self::Postgresql),
            "mysql" => Some(Self::Mysql),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgresql => "postgresql",
            Self::Mysql => "mysql",
        }
    }
}

/// Connection settings and catalog presentation options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: BackendKind,
    /// SQLite: file path or `:memory:`. Server backends: `host[:port]/database`,
    /// optionally in legacy JDBC form (`jdbc:mysql://host:3306/database`).
    pub address: String,
    pub user: String,
    pub password: String,
    /// Extra driver options appended to the connection URL query.
    pub additional_options: String,
    pub table_prefix: String,
    /// List player achievements oldest first when `true`, newest first otherwise.
    pub chronological_order: bool,
    pub date_locale: String,
    pub date_display_time: bool,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sqlite,
            address: DEFAULT_SQLITE_ADDRESS.to_string(),
            user: String::new(),
            password: String::new(),
            additional_options: String::new(),
            table_prefix: String::new(),
            chronological_order: true,
            date_locale: "en".to_string(),
            date_display_time: false,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl DatabaseConfig {
    /// Build a configuration from `ACHIEVEMENTS_DB_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(kind) = lookup("ACHIEVEMENTS_DB_TYPE").and_then(|v| BackendKind::parse(&v)) {
            config.backend = kind;
        }
        if let Some(address) = lookup("ACHIEVEMENTS_DB_ADDRESS") {
            config.address = address;
        }
        if let Some(user) = lookup("ACHIEVEMENTS_DB_USER") {
            config.user = user;
        }
        if let Some(password) = lookup("ACHIEVEMENTS_DB_PASSWORD") {
            config.password = password;
        }
        if let Some(options) = lookup("ACHIEVEMENTS_DB_OPTIONS") {
            config.additional_options = options;
        }
        if let Some(prefix) = lookup("ACHIEVEMENTS_DB_TABLE_PREFIX") {
            config.table_prefix = prefix;
        }
        if let Some(flag) = lookup("ACHIEVEMENTS_DB_CHRONOLOGICAL").and_then(|v| parse_flag(&v)) {
            config.chronological_order = flag;
        }
        if let Some(locale) = lookup("ACHIEVEMENTS_DB_DATE_LOCALE") {
            config.date_locale = locale;
        }
        if let Some(flag) = lookup("ACHIEVEMENTS_DB_DATE_TIME").and_then(|v| parse_flag(&v)) {
            config.date_display_time = flag;
        }
        if let Some(max) = lookup("ACHIEVEMENTS_DB_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            config.max_connections = max;
        }

        config
    }

    /// In-memory SQLite configuration, used by tests and local tooling.
    pub fn in_memory() -> Self {
        Self {
            address: ":memory:".to_string(),
            ..Self::default()
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
