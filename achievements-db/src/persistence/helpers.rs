//! Table naming and the legacy quoting shim shared by the repositories.

use crate::category::{MultipleCategory, NormalCategory};
use crate::persistence::DatabaseError;

/// Prefix-qualified table names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    prefix: String,
}

impl TableNames {
    /// The prefix is concatenated into SQL text, so it is restricted to
    /// ASCII letters, digits and underscores.
    pub fn new(prefix: &str) -> Result<Self, DatabaseError> {
        if !prefix
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            return Err(DatabaseError::InvalidPrefix(prefix.to_string()));
        }
        Ok(Self {
            prefix: prefix.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn achievements(&self) -> String {
        format!("{}achievements", self.prefix)
    }

    pub fn normal(&self, category: NormalCategory) -> String {
        format!("{}{}", self.prefix, category.db_name())
    }

    pub fn multiple(&self, category: MultipleCategory) -> String {
        format!("{}{}", self.prefix, category.db_name())
    }
}

// ── Legacy quoting ─────────────────────────────────────────────────────
//
// Some releases stored keys containing a single quote with the quote doubled
// (`Miner''s Luck`). Keys read back are collapsed, and lookups by a key that
// contains a quote also match the doubled form.

/// Collapse doubled single quotes in a stored key.
pub fn collapse_legacy_quotes(stored: &str) -> String {
    stored.replace("''", "'")
}

/// The doubled-quote form of `key`, when it differs from `key`.
pub fn legacy_key_form(key: &str) -> Option<String> {
    key.contains('\'').then(|| key.replace('\'', "''"))
}

/// `WHERE` fragment matching the achievement key, with one placeholder per
/// accepted form.
pub fn key_condition(has_legacy_form: bool) -> &'static str {
    if has_legacy_form {
        "(achievement = ? OR achievement = ?)"
    } else {
        "achievement = ?"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_validation() {
        assert!(TableNames::new("").is_ok());
        assert!(TableNames::new("aa_Server2_").is_ok());
        assert!(matches!(
            TableNames::new("x; DROP TABLE achievements; --"),
            Err(DatabaseError::InvalidPrefix(_))
        ));
        assert!(TableNames::new("with space").is_err());
    }

    #[test]
    fn test_table_names_are_prefixed() {
        let tables = TableNames::new("aa_").unwrap();
        assert_eq!(tables.achievements(), "aa_achievements");
        assert_eq!(tables.normal(NormalCategory::Connections), "aa_connections");
        assert_eq!(tables.multiple(MultipleCategory::Kills), "aa_kills");
    }

    #[test]
    fn test_collapse_legacy_quotes() {
        assert_eq!(collapse_legacy_quotes("Miner''s Luck"), "Miner's Luck");
        assert_eq!(collapse_legacy_quotes("Miner's Luck"), "Miner's Luck");
        assert_eq!(collapse_legacy_quotes("plain"), "plain");
    }

    #[test]
    fn test_legacy_key_form() {
        assert_eq!(legacy_key_form("Miner's Luck").as_deref(), Some("Miner''s Luck"));
        assert_eq!(legacy_key_form("plain"), None);
    }

    #[test]
    fn test_key_condition_placeholders() {
        assert_eq!(key_condition(false).matches('?').count(), 1);
        assert_eq!(key_condition(true).matches('?').count(), 2);
    }
}
