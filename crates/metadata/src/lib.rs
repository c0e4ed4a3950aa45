//! History store and version retention for Quire.
//!
//! This crate provides:
//! - The history store trait and its SQLite and PostgreSQL implementations
//! - Row models for the structure, resource, content and property tables
//! - Lookups into the user directory and live property usage
//! - The retention manager that writes snapshots and purges old versions

#[macro_use]
mod queries;

pub mod directory;
pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod retention;
pub mod store;

pub use directory::{
    LivePropertyIndex, NoLiveProperties, StaticDirectory, StaticPropertyIndex, UserDirectory,
};
pub use error::{MetadataError, MetadataResult};
pub use postgres::PostgresStore;
pub use repos::PurgeStats;
pub use retention::{RetentionManager, SnapshotOutcome};
pub use store::{MetadataStore, SqliteStore};

use quire_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a history store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
        MetadataConfig::Postgres {
            url,
            host,
            port,
            username,
            password,
            database,
            ssl_mode,
            max_connections,
            statement_timeout_ms,
        } => {
            let store = if let Some(url) = url {
                tracing::info!("Connecting to PostgreSQL using connection URL");
                PostgresStore::from_url(url, *max_connections, *statement_timeout_ms).await?
            } else if let (Some(host), Some(database)) = (host.as_ref(), database.as_ref()) {
                PostgresStore::from_params(
                    host,
                    port.unwrap_or(5432),
                    username.as_deref(),
                    password.as_deref(),
                    database,
                    *ssl_mode,
                    *max_connections,
                    *statement_timeout_ms,
                )
                .await?
            } else {
                return Err(MetadataError::Config(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ));
            };
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::ProjectRepo;

    #[tokio::test]
    async fn test_from_config_sqlite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("history.db");
        let config = MetadataConfig::Sqlite {
            path: db_path.clone(),
            query_timeout_secs: None,
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        assert!(db_path.exists());
        assert_eq!(store.next_tag().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_from_config_postgres_requires_target() {
        let config = MetadataConfig::Postgres {
            url: None,
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
            ssl_mode: None,
            max_connections: 1,
            statement_timeout_ms: None,
        };
        let err = match from_config(&config).await {
            Ok(_) => panic!("expected a configuration error"),
            Err(err) => err,
        };
        assert!(matches!(err, MetadataError::Config(_)));
    }
}
