//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// History database configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database file. Use `:memory:` for a throwaway database.
    Sqlite {
        path: PathBuf,
        /// Advisory only: SQLite cannot cancel a running statement.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over the individual fields.
        url: Option<String>,
        host: Option<String>,
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        username: Option<String>,
        /// Prefer QUIRE_METADATA__PASSWORD over storing it in a file.
        password: Option<String>,
        database: Option<String>,
        ssl_mode: Option<PgSslMode>,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Server-side statement timeout in milliseconds.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    5
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(120_000)
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/history.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> crate::Result<()> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                max_connections,
                ..
            } => {
                if *max_connections == 0 {
                    return Err(crate::Error::InvalidConfig(
                        "metadata.max_connections must be at least 1".to_string(),
                    ));
                }
                match (url.as_ref(), host.as_ref(), database.as_ref()) {
                    (Some(_), _, _) | (None, Some(_), Some(_)) => Ok(()),
                    (None, None, _) => Err(crate::Error::InvalidConfig(
                        "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                    )),
                    (None, Some(_), None) => Err(crate::Error::InvalidConfig(
                        "postgres config requires 'database' when using individual fields"
                            .to_string(),
                    )),
                }
            }
        }
    }
}

/// Retention defaults.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Versions kept per resource when a snapshot is written or a purge
    /// runs without an explicit limit.
    #[serde(default = "default_max_versions")]
    pub max_versions: u32,
    /// Upper bound on project records returned by a project listing.
    #[serde(default = "default_project_list_limit")]
    pub project_list_limit: u32,
}

fn default_max_versions() -> u32 {
    10
}

fn default_project_list_limit() -> u32 {
    300
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_versions: default_max_versions(),
            project_list_limit: default_project_list_limit(),
        }
    }
}

impl RetentionConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_versions == 0 {
            return Err(crate::Error::InvalidConfig(
                "retention.max_versions must be at least 1".to_string(),
            ));
        }
        if self.project_list_limit == 0 {
            return Err(crate::Error::InvalidConfig(
                "retention.project_list_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    /// `tracing` filter directive used when RUST_LOG is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info,sqlx=warn".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    pub fn validate(&self) -> crate::Result<()> {
        self.metadata.validate()?;
        self.retention.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn test_retention_defaults_when_missing() {
        let config: AppConfig = toml::from_str("[retention]\n").unwrap();
        assert_eq!(config.retention.max_versions, 10);
        assert_eq!(config.retention.project_list_limit, 300);
    }

    #[test]
    fn test_zero_versions_rejected() {
        let config = RetentionConfig {
            max_versions: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_postgres_requires_database_with_host() {
        let config: MetadataConfig = serde_json::from_str(
            r#"{"type": "postgres", "host": "db.internal", "max_connections": 4}"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("requires 'database'"));
    }

    #[test]
    fn test_postgres_url_is_enough() {
        let config: MetadataConfig =
            serde_json::from_str(r#"{"type": "postgres", "url": "postgres://localhost/quire"}"#)
                .unwrap();
        config.validate().unwrap();
        match config {
            MetadataConfig::Postgres {
                port,
                max_connections,
                ..
            } => {
                assert_eq!(port, Some(5432));
                assert_eq!(max_connections, 5);
            }
            _ => panic!("expected postgres config"),
        }
    }
}
