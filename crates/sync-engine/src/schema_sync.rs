//! Mirror warehouse table schemas as local DDL files and, optionally, apply them.

use async_trait::async_trait;
use common::{ConnectionConfig, Error, Result, SyncPhase, SyncSettings, SyncStatus};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::connector::Connector;
use crate::ddl::{build_create_table, ddl_file_name};
use crate::orchestrator::{bounded, PhaseTracker, SyncStep};
use crate::source::RemoteSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSyncMode {
    /// Write DDL files only; never touch the local store.
    WriteOnly,
    /// Apply the DDL files already in the schema directory.
    ExecuteOnly,
    /// Write DDL files, then apply each when a store URL is configured.
    WriteAndExecute,
}

impl SchemaSyncMode {
    pub fn from_flags(write_only: bool, execute_only: bool) -> Result<Self> {
        match (write_only, execute_only) {
            (true, true) => Err(Error::ConfigError(
                "--write-only and --execute-only cannot be combined".to_string(),
            )),
            (true, false) => Ok(SchemaSyncMode::WriteOnly),
            (false, true) => Ok(SchemaSyncMode::ExecuteOnly),
            (false, false) => Ok(SchemaSyncMode::WriteAndExecute),
        }
    }

    pub fn fetches_remote(self) -> bool {
        !matches!(self, SchemaSyncMode::ExecuteOnly)
    }
}

/// Fetch a table schema, write its DDL file and optionally execute it.
pub struct SchemaSyncStep<S> {
    source: S,
    schema_dir: PathBuf,
    connector: Option<Connector>,
    settings: SyncSettings,
}

impl<S: RemoteSource> SchemaSyncStep<S> {
    /// Without a connector the DDL is only written to disk.
    pub fn new(source: S, schema_dir: impl Into<PathBuf>, connector: Option<Connector>, settings: SyncSettings) -> Self {
        Self {
            source,
            schema_dir: schema_dir.into(),
            connector,
            settings,
        }
    }

    pub fn ddl_path(&self, table_id: &str) -> PathBuf {
        self.schema_dir.join(ddl_file_name(table_id))
    }

    async fn sync_phases(&self, table_id: &str, tracker: &mut PhaseTracker<'_>) -> Result<String> {
        tracker.advance(SyncPhase::Fetching);
        let fetch_timeout = self.settings.fetch_timeout();
        let spec = bounded(fetch_timeout, self.source.fetch_schema(table_id), || {
            Error::remote_fetch(table_id, format!("timed out after {}s", fetch_timeout.as_secs()))
        })
        .await?;
        if spec.fields.is_empty() {
            return Err(Error::remote_fetch(table_id, "table schema has no fields"));
        }

        tracker.advance(SyncPhase::Building);
        let ddl = build_create_table(table_id, &spec.fields);
        let path = self.ddl_path(table_id);
        tokio::fs::create_dir_all(&self.schema_dir).await?;
        tokio::fs::write(&path, format!("{}\n", ddl)).await?;
        debug!("Wrote {}", path.display());

        let Some(connector) = &self.connector else {
            return Ok(format!("wrote {}", path.display()));
        };

        tracker.advance(SyncPhase::Writing);
        let write_timeout = self.settings.write_timeout();
        bounded(write_timeout, connector.execute_ddl(table_id, &ddl), || {
            Error::write(table_id, format!("timed out after {}s", write_timeout.as_secs()))
        })
        .await?;

        Ok(format!("wrote {}, applied to {}", path.display(), connector.location()))
    }

    pub async fn close(self) {
        if let Some(connector) = self.connector {
            connector.close().await;
        }
    }
}

#[async_trait]
impl<S: RemoteSource> SyncStep for SchemaSyncStep<S> {
    async fn sync_table(&self, table_id: &str) -> Result<String> {
        let mut tracker = PhaseTracker::new(table_id);
        let result = self.sync_phases(table_id, &mut tracker).await;
        match &result {
            Ok(_) => tracker.advance(SyncPhase::Succeeded),
            Err(e) => tracker.fail(e, self.fetch_failure_status()),
        }
        debug_assert!(tracker.phase().is_terminal());
        result
    }

    fn fetch_failure_status(&self) -> SyncStatus {
        SyncStatus::Skipped
    }
}

/// Warn about table ids that map to the same DDL file; the later table overwrites it.
/// Returns the number of colliding ids.
pub fn warn_file_collisions(tables: &[String]) -> usize {
    let mut owners: HashMap<String, &str> = HashMap::new();
    let mut collisions = 0;
    for table_id in tables {
        let file = ddl_file_name(table_id);
        match owners.get(&file) {
            Some(first) => {
                warn!("{} and {} both map to {}, the later one overwrites it", first, table_id, file);
                collisions += 1;
            }
            None => {
                owners.insert(file, table_id);
            }
        }
    }
    collisions
}

/// Check execute-only preconditions and list the DDL files to apply, sorted by name.
pub fn plan_execute_only(connection: &ConnectionConfig, schema_dir: &Path) -> Result<Vec<String>> {
    if !connection.has_url() {
        return Err(Error::ConfigError(
            "Set LOCAL_DB_URL to apply DDL with --execute-only".to_string(),
        ));
    }
    if !schema_dir.is_dir() {
        return Err(Error::ConfigError(format!(
            "Schema directory {} does not exist",
            schema_dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(schema_dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "sql") {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                files.push(name.to_string());
            }
        }
    }
    files.sort();

    info!("Found {} DDL files in {}", files.len(), schema_dir.display());
    Ok(files)
}

/// Apply one existing DDL file per unit; the unit id is the file name.
pub struct ApplyDdlStep {
    connector: Connector,
    schema_dir: PathBuf,
    settings: SyncSettings,
}

impl ApplyDdlStep {
    pub fn new(connector: Connector, schema_dir: impl Into<PathBuf>, settings: SyncSettings) -> Self {
        Self {
            connector,
            schema_dir: schema_dir.into(),
            settings,
        }
    }

    pub async fn close(self) {
        self.connector.close().await;
    }
}

#[async_trait]
impl SyncStep for ApplyDdlStep {
    async fn sync_table(&self, file_name: &str) -> Result<String> {
        let path = self.schema_dir.join(file_name);
        let ddl = tokio::fs::read_to_string(&path).await?;
        if ddl.trim().is_empty() {
            return Err(Error::write(file_name, "DDL file is empty"));
        }

        let write_timeout = self.settings.write_timeout();
        bounded(write_timeout, self.connector.execute_ddl(file_name, &ddl), || {
            Error::write(file_name, format!("timed out after {}s", write_timeout.as_secs()))
        })
        .await?;

        Ok(format!("applied to {}", self.connector.location()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::Backend;
    use crate::orchestrator::SyncOrchestrator;
    use crate::source::MockRemoteSource;
    use common::{FieldSpec, TableSpec};
    use std::time::Duration;

    fn events_spec(table_id: &str) -> TableSpec {
        TableSpec::new(
            table_id,
            vec![FieldSpec::new("id", "INT64", None), FieldSpec::new("name", "STRING", None)],
        )
    }

    async fn sqlite_connector(dir: &Path) -> Connector {
        Connector::resolve(&ConnectionConfig::embedded("local.db"), dir, Duration::from_secs(5))
            .await
            .unwrap()
    }

    async fn sqlite_tables(connector: &Connector) -> Vec<String> {
        let Backend::Sqlite(pool) = connector.backend() else {
            panic!("expected sqlite backend");
        };
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[test]
    fn test_mode_from_flags() {
        assert_eq!(SchemaSyncMode::from_flags(false, false).unwrap(), SchemaSyncMode::WriteAndExecute);
        assert_eq!(SchemaSyncMode::from_flags(true, false).unwrap(), SchemaSyncMode::WriteOnly);
        assert_eq!(SchemaSyncMode::from_flags(false, true).unwrap(), SchemaSyncMode::ExecuteOnly);
        assert!(matches!(SchemaSyncMode::from_flags(true, true), Err(Error::ConfigError(_))));
        assert!(!SchemaSyncMode::ExecuteOnly.fetches_remote());
    }

    #[tokio::test]
    async fn test_write_only_writes_ddl_and_skips_missing_tables() {
        let dir = tempfile::tempdir().unwrap();
        let schema_dir = dir.path().join("schema/bronze");

        let mut source = MockRemoteSource::new();
        source.expect_fetch_schema().times(2).returning(|table| {
            if table == "gone" {
                Err(Error::remote_fetch(table, "404 Not Found: Table gone"))
            } else {
                Ok(events_spec(table))
            }
        });

        let step = SchemaSyncStep::new(source, &schema_dir, None, SyncSettings::default());
        let tables = vec!["raw events".to_string(), "gone".to_string()];
        let report = SyncOrchestrator::new("schema-sync").run(&step, &tables).await;

        assert_eq!(report.statuses(), vec![SyncStatus::Succeeded, SyncStatus::Skipped]);
        assert_eq!(report.exit_code(), 1);

        let written = std::fs::read_to_string(schema_dir.join("raw_events.sql")).unwrap();
        assert_eq!(
            written,
            "CREATE TABLE IF NOT EXISTS \"raw events\" (\n  id BIGINT,\n  name TEXT\n);\n"
        );
        assert!(!schema_dir.join("gone.sql").exists());
    }

    #[tokio::test]
    async fn test_write_and_execute_creates_tables() {
        let dir = tempfile::tempdir().unwrap();
        let connector = sqlite_connector(dir.path()).await;

        let mut source = MockRemoteSource::new();
        source
            .expect_fetch_schema()
            .times(2)
            .returning(|table| Ok(events_spec(table)));

        let step = SchemaSyncStep::new(
            source,
            dir.path().join("ddl"),
            Some(connector.clone()),
            SyncSettings::default(),
        );
        let tables = vec!["events".to_string(), "orders".to_string()];
        let report = SyncOrchestrator::new("schema-sync").run(&step, &tables).await;

        assert!(report.is_success());
        assert_eq!(sqlite_tables(&connector).await, vec!["events", "orders"]);
        assert!(dir.path().join("ddl/orders.sql").is_file());
    }

    #[tokio::test]
    async fn test_empty_schema_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockRemoteSource::new();
        source
            .expect_fetch_schema()
            .returning(|table| Ok(TableSpec::new(table, Vec::new())));

        let step = SchemaSyncStep::new(source, dir.path(), None, SyncSettings::default());
        let report = SyncOrchestrator::new("schema-sync")
            .run(&step, &["empty".to_string()])
            .await;

        assert_eq!(report.statuses(), vec![SyncStatus::Skipped]);
    }

    #[test]
    fn test_file_collisions_are_counted() {
        let tables = vec!["a b".to_string(), "a_b".to_string(), "events".to_string(), "a-b".to_string()];
        assert_eq!(warn_file_collisions(&tables), 1);
        assert_eq!(warn_file_collisions(&["events".to_string(), "orders".to_string()]), 0);
    }

    #[test]
    fn test_execute_only_requires_url_and_directory() {
        let dir = tempfile::tempdir().unwrap();

        let err = plan_execute_only(&ConnectionConfig::embedded("local.db"), dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));

        let with_url = ConnectionConfig::new(Some("postgres://localhost/dev".to_string()), None);
        let err = plan_execute_only(&with_url, &dir.path().join("missing")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_execute_only_lists_sql_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["orders.sql", "events.sql", "notes.txt"] {
            std::fs::write(dir.path().join(name), "CREATE TABLE IF NOT EXISTS t (\n  id BIGINT\n);\n").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.sql")).unwrap();

        let with_url = ConnectionConfig::new(Some("postgres://localhost/dev".to_string()), None);
        let files = plan_execute_only(&with_url, dir.path()).unwrap();
        assert_eq!(files, vec!["events.sql", "orders.sql"]);
    }

    #[tokio::test]
    async fn test_apply_ddl_isolates_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let schema_dir = dir.path().join("schema");
        std::fs::create_dir_all(&schema_dir).unwrap();
        std::fs::write(schema_dir.join("a.sql"), "CREATE TABLE IF NOT EXISTS a (\n  id BIGINT\n);\n").unwrap();
        std::fs::write(schema_dir.join("b.sql"), "CREATE TABLE (\n").unwrap();
        std::fs::write(schema_dir.join("c.sql"), "CREATE TABLE IF NOT EXISTS c (\n  id BIGINT\n);\n").unwrap();

        let connector = sqlite_connector(dir.path()).await;
        let step = ApplyDdlStep::new(connector.clone(), &schema_dir, SyncSettings::default());
        let files = vec!["a.sql".to_string(), "b.sql".to_string(), "c.sql".to_string()];
        let report = SyncOrchestrator::new("schema-apply").run(&step, &files).await;

        assert_eq!(
            report.statuses(),
            vec![SyncStatus::Succeeded, SyncStatus::Failed, SyncStatus::Succeeded]
        );
        assert_eq!(sqlite_tables(&connector).await, vec!["a", "c"]);
    }
}
