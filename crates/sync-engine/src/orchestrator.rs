use async_trait::async_trait;
use common::{BatchReport, Error, Result, SourceConfig, SyncJob, SyncPhase, SyncResult, SyncSettings, SyncStatus, WriteMode};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::connector::Connector;
use crate::query::build_job_query;
use crate::replication::ReplicationEngine;
use crate::source::RemoteSource;

/// One unit of per-table work driven by [`SyncOrchestrator`].
#[async_trait]
pub trait SyncStep: Send + Sync {
    /// Sync a single table. The returned string is recorded as the result detail.
    async fn sync_table(&self, table_id: &str) -> Result<String>;

    /// Status recorded when the remote fetch for a table fails.
    fn fetch_failure_status(&self) -> SyncStatus {
        SyncStatus::Failed
    }
}

/// Runs a step over a list of tables, isolating failures per table.
#[derive(Debug, Clone)]
pub struct SyncOrchestrator {
    kind: &'static str,
}

impl SyncOrchestrator {
    pub fn new(kind: &'static str) -> Self {
        Self { kind }
    }

    pub async fn run<S>(&self, step: &S, tables: &[String]) -> BatchReport
    where
        S: SyncStep + ?Sized,
    {
        let span = info_span!("batch", kind = self.kind, run_id = %Uuid::new_v4());
        async move {
            let mut report = BatchReport::new();

            for table_id in tables {
                info!("Syncing {} ...", table_id);
                let result = match step.sync_table(table_id).await {
                    Ok(detail) => {
                        info!("{}: {}", table_id, detail);
                        SyncResult::succeeded(table_id.as_str(), detail)
                    }
                    Err(e) => {
                        warn!("{}: {}", table_id, e);
                        let status = if e.is_remote_fetch() {
                            step.fetch_failure_status()
                        } else {
                            SyncStatus::Failed
                        };
                        SyncResult::new(table_id.as_str(), status, Some(e.to_string()))
                    }
                };
                report.push(result);
            }

            report.finish();
            info!("{}", report.summary());
            report
        }
        .instrument(span)
        .await
    }
}

/// Per-table phase bookkeeping; out-of-order transitions are logged and ignored.
#[derive(Debug)]
pub(crate) struct PhaseTracker<'a> {
    table: &'a str,
    phase: SyncPhase,
}

impl<'a> PhaseTracker<'a> {
    pub(crate) fn new(table: &'a str) -> Self {
        Self {
            table,
            phase: SyncPhase::Pending,
        }
    }

    pub(crate) fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub(crate) fn advance(&mut self, next: SyncPhase) {
        if self.phase.can_advance_to(next) {
            debug!("{}: {} -> {}", self.table, self.phase, next);
            self.phase = next;
        } else {
            warn!("{}: ignoring phase change {} -> {}", self.table, self.phase, next);
        }
    }

    /// Record the terminal phase for a failed table.
    pub(crate) fn fail(&mut self, error: &Error, fetch_failure: SyncStatus) {
        let next = if error.is_remote_fetch()
            && self.phase == SyncPhase::Fetching
            && fetch_failure == SyncStatus::Skipped
        {
            SyncPhase::Skipped
        } else {
            SyncPhase::Failed
        };
        self.advance(next);
    }
}

/// Await `future`, mapping an elapsed deadline to `on_timeout`.
pub(crate) async fn bounded<T, F>(limit: Duration, future: F, on_timeout: impl FnOnce() -> Error) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

/// Data sync: query the warehouse and replace the local target table.
pub struct TableSync<S> {
    source: S,
    engine: ReplicationEngine,
    source_config: SourceConfig,
    settings: SyncSettings,
}

impl<S: RemoteSource> TableSync<S> {
    pub fn new(source: S, connector: Connector, source_config: SourceConfig, settings: SyncSettings) -> Self {
        Self {
            source,
            engine: ReplicationEngine::new(connector, WriteMode::Replace),
            source_config,
            settings,
        }
    }

    /// Fetch and write one job. Returns the number of rows written.
    pub async fn run_job(&self, job: &SyncJob) -> Result<usize> {
        let mut tracker = PhaseTracker::new(&job.table_id);
        let result = self.run_phases(job, &mut tracker).await;
        match &result {
            Ok(_) => tracker.advance(SyncPhase::Succeeded),
            Err(e) => tracker.fail(e, SyncStatus::Failed),
        }
        debug_assert!(tracker.phase().is_terminal());
        result
    }

    async fn run_phases(&self, job: &SyncJob, tracker: &mut PhaseTracker<'_>) -> Result<usize> {
        tracker.advance(SyncPhase::Fetching);
        let query = build_job_query(&self.source_config, job)?;
        let fetch_timeout = self.settings.fetch_timeout();
        let batch = bounded(fetch_timeout, self.source.fetch_rows(&job.table_id, &query), || {
            Error::remote_fetch(&job.table_id, format!("timed out after {}s", fetch_timeout.as_secs()))
        })
        .await?;

        tracker.advance(SyncPhase::Building);
        debug!("Fetched {} rows from {}", batch.len(), job.table_id);

        tracker.advance(SyncPhase::Writing);
        let write_timeout = self.settings.write_timeout();
        bounded(write_timeout, self.engine.write_batch(&job.target_table, &batch), || {
            Error::write(&job.target_table, format!("timed out after {}s", write_timeout.as_secs()))
        })
        .await
    }

    /// Step syncing every listed table into a target of the same name.
    pub fn batch_step(&self, partition_filter: Option<String>, limit: u64) -> BatchTableSync<'_, S> {
        BatchTableSync {
            sync: self,
            partition_filter,
            limit,
        }
    }

    pub async fn close(self) {
        self.engine.close().await;
    }
}

pub struct BatchTableSync<'a, S> {
    sync: &'a TableSync<S>,
    partition_filter: Option<String>,
    limit: u64,
}

#[async_trait]
impl<S: RemoteSource> SyncStep for BatchTableSync<'_, S> {
    async fn sync_table(&self, table_id: &str) -> Result<String> {
        let job = SyncJob::new(table_id, self.partition_filter.clone(), self.limit, table_id)?;
        let rows = self.sync.run_job(&job).await?;
        Ok(format!("{} rows -> {}", rows, job.target_table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::Backend;
    use crate::source::MockRemoteSource;
    use common::{ConnectionConfig, FieldSpec, RowBatch, SqlValue, TableSpec};
    use std::collections::HashSet;

    struct FakeStep {
        failing: HashSet<&'static str>,
        fetch_failure: SyncStatus,
    }

    #[async_trait]
    impl SyncStep for FakeStep {
        async fn sync_table(&self, table_id: &str) -> Result<String> {
            match table_id {
                t if self.failing.contains(t) => Err(Error::remote_fetch(t, "404 Not Found")),
                "bad_config" => Err(Error::ValidationError("limit".to_string())),
                _ => Ok("ok".to_string()),
            }
        }

        fn fetch_failure_status(&self) -> SyncStatus {
            self.fetch_failure
        }
    }

    fn tables(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let step = FakeStep {
            failing: ["b"].into_iter().collect(),
            fetch_failure: SyncStatus::Failed,
        };

        let report = SyncOrchestrator::new("test").run(&step, &tables(&["a", "b", "c"])).await;

        assert_eq!(
            report.statuses(),
            vec![SyncStatus::Succeeded, SyncStatus::Failed, SyncStatus::Succeeded]
        );
        assert_eq!(report.exit_code(), 1);
        assert!(report.results[1].detail.as_deref().unwrap().contains("404 Not Found"));
        assert!(report.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_fetch_failure_status_only_applies_to_fetch_errors() {
        let step = FakeStep {
            failing: ["missing"].into_iter().collect(),
            fetch_failure: SyncStatus::Skipped,
        };

        let report = SyncOrchestrator::new("test")
            .run(&step, &tables(&["missing", "bad_config", "ok"]))
            .await;

        assert_eq!(
            report.statuses(),
            vec![SyncStatus::Skipped, SyncStatus::Failed, SyncStatus::Succeeded]
        );
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_empty_table_list_succeeds() {
        let step = FakeStep {
            failing: HashSet::new(),
            fetch_failure: SyncStatus::Failed,
        };
        let report = SyncOrchestrator::new("test").run(&step, &[]).await;
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.summary(), "0 tables: 0 succeeded, 0 failed, 0 skipped");
    }

    fn sample_batch() -> RowBatch {
        RowBatch::new(
            vec![FieldSpec::new("id", "INT64", None), FieldSpec::new("ts", "TIMESTAMP", None)],
            vec![
                vec![SqlValue::Int(1), SqlValue::Text("2024-01-01T00:00:00.000000Z".to_string())],
                vec![SqlValue::Int(2), SqlValue::Null],
            ],
        )
    }

    async fn sqlite_connector(dir: &tempfile::TempDir) -> Connector {
        Connector::resolve(
            &ConnectionConfig::embedded("local.db"),
            dir.path(),
            Duration::from_secs(5),
        )
        .await
        .unwrap()
    }

    async fn table_exists(connector: &Connector, table: &str) -> bool {
        let Backend::Sqlite(pool) = connector.backend() else {
            panic!("expected sqlite backend");
        };
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_one(pool)
            .await
            .unwrap();
        count == 1
    }

    #[tokio::test]
    async fn test_batch_sync_with_failing_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let connector = sqlite_connector(&dir).await;

        let mut source = MockRemoteSource::new();
        source.expect_fetch_rows().times(3).returning(|table, query| {
            assert!(query.starts_with("SELECT * FROM `p`.`bronze`."));
            assert!(query.ends_with(" LIMIT 10"));
            if table == "b" {
                Err(Error::remote_fetch(table, "403 Access Denied"))
            } else {
                Ok(sample_batch())
            }
        });
        source.expect_fetch_schema().never();

        let sync = TableSync::new(
            source,
            connector.clone(),
            SourceConfig::new("p", "bronze"),
            SyncSettings::default(),
        );
        let report = SyncOrchestrator::new("batch-sync")
            .run(&sync.batch_step(None, 10), &tables(&["a", "b", "c"]))
            .await;

        assert_eq!(
            report.statuses(),
            vec![SyncStatus::Succeeded, SyncStatus::Failed, SyncStatus::Succeeded]
        );
        assert_eq!(report.results[0].detail.as_deref(), Some("2 rows -> a"));
        assert!(table_exists(&connector, "a").await);
        assert!(!table_exists(&connector, "b").await);
        assert!(table_exists(&connector, "c").await);
    }

    #[tokio::test]
    async fn test_run_job_writes_to_target_table() {
        let dir = tempfile::tempdir().unwrap();
        let connector = sqlite_connector(&dir).await;

        let mut source = MockRemoteSource::new();
        source
            .expect_fetch_rows()
            .times(1)
            .returning(|_, query| {
                assert_eq!(query, "SELECT * FROM `p`.`d`.`bronze_events` WHERE dt = '2024-01-01' LIMIT 5");
                Ok(sample_batch())
            });

        let sync = TableSync::new(source, connector.clone(), SourceConfig::new("p", "d"), SyncSettings::default());
        let job = SyncJob::new("bronze_events", Some("dt = '2024-01-01'".to_string()), 5, "events_local").unwrap();

        assert_eq!(sync.run_job(&job).await.unwrap(), 2);
        assert!(table_exists(&connector, "events_local").await);
    }

    #[tokio::test]
    async fn test_missing_project_fails_before_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockRemoteSource::new();
        source.expect_fetch_rows().never();

        let sync = TableSync::new(
            source,
            sqlite_connector(&dir).await,
            SourceConfig::new("", "d"),
            SyncSettings::default(),
        );
        let job = SyncJob::new("events", None, 5, "events").unwrap();

        assert!(matches!(sync.run_job(&job).await, Err(Error::ConfigError(_))));
    }

    struct SlowSource;

    #[async_trait]
    impl RemoteSource for SlowSource {
        async fn fetch_schema(&self, table_id: &str) -> Result<TableSpec> {
            Ok(TableSpec::new(table_id, Vec::new()))
        }

        async fn fetch_rows(&self, _table_id: &str, _query: &str) -> Result<RowBatch> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(sample_batch())
        }
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_remote_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SyncSettings {
            fetch_timeout_secs: 0,
            ..SyncSettings::default()
        };
        let sync = TableSync::new(SlowSource, sqlite_connector(&dir).await, SourceConfig::new("p", "d"), settings);
        let job = SyncJob::new("events", None, 5, "events").unwrap();

        let err = sync.run_job(&job).await.unwrap_err();
        assert!(err.is_remote_fetch());
        assert!(err.to_string().contains("timed out after 0s"));
    }

    #[test]
    fn test_phase_tracker_follows_transitions() {
        let mut tracker = PhaseTracker::new("events");
        tracker.advance(SyncPhase::Writing);
        assert_eq!(tracker.phase(), SyncPhase::Pending);

        tracker.advance(SyncPhase::Fetching);
        tracker.fail(&Error::remote_fetch("events", "gone"), SyncStatus::Skipped);
        assert_eq!(tracker.phase(), SyncPhase::Skipped);

        let mut tracker = PhaseTracker::new("events");
        tracker.advance(SyncPhase::Fetching);
        tracker.fail(&Error::remote_fetch("events", "gone"), SyncStatus::Failed);
        assert_eq!(tracker.phase(), SyncPhase::Failed);
    }
}
