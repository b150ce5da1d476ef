use serde::Deserialize;

use crate::error::Error;

/// Buffered change events per subscriber before lag kicks in.
pub const DEFAULT_FEED_CAPACITY: usize = 64;

/// Runtime configuration, loaded from `CAMPUSMAIL_`-prefixed environment
/// variables. Everything has a default so an empty environment works.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Path of the SQLite database file. Unset selects a private in-memory
    /// store, which lives only as long as the service.
    pub db_path: Option<String>,

    /// What happens to a message once both parties have soft-deleted it.
    #[serde(default)]
    pub retention: RetentionPolicy,

    /// Per-subscriber buffer size of the change feed.
    pub feed_capacity: Option<usize>,
}

/// Disposition of doubly-deleted messages.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Keep the row; it stays visible in both parties' trash.
    #[default]
    Retain,
    /// Drop the row, and its attachment ledger with it.
    Purge,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        Ok(envy::prefixed("CAMPUSMAIL_").from_env::<Self>()?)
    }

    pub fn db_path(&self) -> Option<&str> {
        self.db_path.as_deref()
    }

    pub fn feed_capacity(&self) -> usize {
        self.feed_capacity.unwrap_or(DEFAULT_FEED_CAPACITY)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            retention: RetentionPolicy::default(),
            feed_capacity: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_memory_and_retaining() {
        let config = Config::default();

        assert_eq!(config.db_path(), None);
        assert_eq!(config.retention, RetentionPolicy::Retain);
        assert_eq!(config.feed_capacity(), DEFAULT_FEED_CAPACITY);
    }

    #[test]
    fn reads_prefixed_environment() {
        let vars = vec![
            ("CAMPUSMAIL_DB_PATH".to_owned(), "mail.db".to_owned()),
            ("CAMPUSMAIL_RETENTION".to_owned(), "purge".to_owned()),
            ("CAMPUSMAIL_FEED_CAPACITY".to_owned(), "8".to_owned()),
        ];

        let config: Config = envy::prefixed("CAMPUSMAIL_")
            .from_iter(vars)
            .unwrap();

        assert_eq!(config.db_path(), Some("mail.db"));
        assert_eq!(config.retention, RetentionPolicy::Purge);
        assert_eq!(config.feed_capacity(), 8);
    }
}
