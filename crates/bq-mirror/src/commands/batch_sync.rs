use anyhow::{bail, Result};
use std::process::ExitCode;
use sync_engine::{SyncOrchestrator, TableSync};

use super::report_exit_code;
use crate::config::Config;

/// Sync every listed table into a local table of the same name.
pub async fn execute(config: &Config, partition_filter: Option<String>, limit: u64) -> Result<ExitCode> {
    config.source.validate()?;
    let loader = config.table_loader();
    let tables = loader.load()?;
    if tables.is_empty() {
        bail!(common::Error::ConfigError(format!(
            "No tables in {} or BQ_BRONZE_TABLES",
            loader.list_path().display()
        )));
    }

    let client = config.warehouse_client()?;
    let connector = config.connect(&config.connection).await?;
    let sync = TableSync::new(client, connector, config.source.clone(), config.settings.clone());

    let report = SyncOrchestrator::new("batch-sync")
        .run(&sync.batch_step(partition_filter, limit), &tables)
        .await;
    sync.close().await;

    Ok(report_exit_code(&report))
}
