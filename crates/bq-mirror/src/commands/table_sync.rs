use anyhow::Result;
use common::{ConnectionConfig, SyncJob};
use std::path::PathBuf;
use std::process::ExitCode;
use sync_engine::TableSync;
use tracing::info;

use crate::config::Config;

pub struct TableSyncArgs {
    pub table: String,
    pub partition_filter: Option<String>,
    pub limit: u64,
    pub local_db: Option<PathBuf>,
    pub target_table: String,
}

/// Sync one table partition into the local store.
pub async fn execute(config: &Config, args: TableSyncArgs) -> Result<ExitCode> {
    let job = SyncJob::new(args.table, args.partition_filter, args.limit, args.target_table)?;
    let client = config.warehouse_client()?;

    // An explicit file forces SQLite even when a URL is configured.
    let connection = match args.local_db {
        Some(path) => ConnectionConfig::embedded(path),
        None => config.connection.clone(),
    };
    let connector = config.connect(&connection).await?;
    let location = connector.location();

    let sync = TableSync::new(client, connector, config.source.clone(), config.settings.clone());
    let result = sync.run_job(&job).await;
    sync.close().await;

    let rows = result?;
    info!("Wrote {} rows to {} table {}", rows, location, job.target_table);
    Ok(ExitCode::SUCCESS)
}
