use common::{ConnectionConfig, Error, Result, StoreTarget};
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{PgPool, SqlitePool};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Live handle to the local store.
#[derive(Debug, Clone)]
pub enum Backend {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// Resolved local store plus its single connection.
///
/// Every write goes through a transaction that commits on success. Returning early
/// or dropping the future drops the transaction, which rolls it back.
#[derive(Debug, Clone)]
pub struct Connector {
    backend: Backend,
    target: StoreTarget,
}

impl Connector {
    /// Resolve `config` against `base_dir` and connect.
    pub async fn resolve(config: &ConnectionConfig, base_dir: &Path, connect_timeout: Duration) -> Result<Self> {
        Self::connect(config.resolve_target(base_dir), connect_timeout).await
    }

    pub async fn connect(target: StoreTarget, connect_timeout: Duration) -> Result<Self> {
        let backend = match &target {
            StoreTarget::Network { url } => {
                let pool = PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(connect_timeout)
                    .connect(url)
                    .await?;
                Backend::Postgres(pool)
            }
            StoreTarget::Embedded { path } => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true);
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(connect_timeout)
                    .connect_with(options)
                    .await?;
                Backend::Sqlite(pool)
            }
        };

        info!("Connected to local store {}", target.display_location());
        Ok(Self { backend, target })
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn target(&self) -> &StoreTarget {
        &self.target
    }

    pub fn location(&self) -> String {
        self.target.display_location()
    }

    /// Run one DDL statement in its own transaction.
    pub async fn execute_ddl(&self, table: &str, ddl: &str) -> Result<()> {
        debug!("Executing DDL for {}", table);
        let result = match &self.backend {
            Backend::Postgres(pool) => {
                let mut tx = pool.begin().await.map_err(|e| Error::write(table, e))?;
                sqlx::query(ddl).execute(&mut *tx).await.map_err(|e| Error::write(table, e))?;
                tx.commit().await
            }
            Backend::Sqlite(pool) => {
                let mut tx = pool.begin().await.map_err(|e| Error::write(table, e))?;
                sqlx::query(ddl).execute(&mut *tx).await.map_err(|e| Error::write(table, e))?;
                tx.commit().await
            }
        };
        result.map_err(|e| Error::write(table, e))
    }

    pub async fn close(self) {
        match self.backend {
            Backend::Postgres(pool) => pool.close().await,
            Backend::Sqlite(pool) => pool.close().await,
        }
        debug!("Closed local store {}", self.target.display_location());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_path_only_uses_sqlite_and_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConnectionConfig::embedded("nested/data/local.db");

        let connector = Connector::resolve(&config, dir.path(), TIMEOUT).await.unwrap();

        assert!(matches!(connector.backend(), Backend::Sqlite(_)));
        assert!(dir.path().join("nested/data").is_dir());
        assert_eq!(
            connector.target(),
            &StoreTarget::Embedded {
                path: dir.path().join("nested/data/local.db")
            }
        );
        connector.close().await;
    }

    #[tokio::test]
    async fn test_url_wins_and_path_is_never_touched() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConnectionConfig::new(
            Some("postgres://nobody:pw@127.0.0.1:1/none".to_string()),
            Some(PathBuf::from("should_not_exist/local.db")),
        );

        let result = Connector::resolve(&config, dir.path(), Duration::from_secs(2)).await;

        assert!(matches!(result, Err(Error::DatabaseError(_))));
        assert!(!dir.path().join("should_not_exist").exists());
    }

    #[tokio::test]
    async fn test_execute_ddl_commits() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Connector::resolve(&ConnectionConfig::embedded("local.db"), dir.path(), TIMEOUT)
            .await
            .unwrap();

        connector
            .execute_ddl("events", "CREATE TABLE IF NOT EXISTS events (\n  id BIGINT\n);")
            .await
            .unwrap();

        let Backend::Sqlite(pool) = connector.backend() else {
            panic!("expected sqlite backend");
        };
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE name = 'events'")
            .fetch_one(pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_bad_ddl_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Connector::resolve(&ConnectionConfig::embedded("local.db"), dir.path(), TIMEOUT)
            .await
            .unwrap();

        let err = connector.execute_ddl("broken", "CREATE TABLE (").await.unwrap_err();
        assert!(matches!(err, Error::WriteError { ref table, .. } if table == "broken"));
    }
}
