use anyhow::{bail, Result};
use std::path::Path;
use std::process::ExitCode;
use sync_engine::{
    plan_execute_only, warn_file_collisions, ApplyDdlStep, SchemaSyncMode, SchemaSyncStep, SyncOrchestrator,
};
use tracing::info;

use super::report_exit_code;
use crate::config::Config;

pub async fn execute(config: &Config, mode: SchemaSyncMode, schema_dir: &Path) -> Result<ExitCode> {
    let schema_dir = config.resolve_path(schema_dir);

    if !mode.fetches_remote() {
        let files = plan_execute_only(&config.connection, &schema_dir)?;
        let connector = config.connect(&config.connection).await?;
        let step = ApplyDdlStep::new(connector, &schema_dir, config.settings.clone());

        let report = SyncOrchestrator::new("schema-apply").run(&step, &files).await;
        step.close().await;
        return Ok(report_exit_code(&report));
    }

    config.source.validate()?;
    let loader = config.table_loader();
    let tables = loader.load()?;
    if tables.is_empty() {
        bail!(common::Error::ConfigError(format!(
            "No tables found in {} or BQ_BRONZE_TABLES",
            loader.list_path().display()
        )));
    }
    warn_file_collisions(&tables);

    let client = config.warehouse_client()?;
    let connector = match mode {
        SchemaSyncMode::WriteAndExecute if config.connection.has_url() => {
            Some(config.connect(&config.connection).await?)
        }
        SchemaSyncMode::WriteAndExecute => {
            info!("LOCAL_DB_URL not set, writing DDL files only");
            None
        }
        SchemaSyncMode::WriteOnly | SchemaSyncMode::ExecuteOnly => None,
    };

    let step = SchemaSyncStep::new(client, &schema_dir, connector, config.settings.clone());
    let report = SyncOrchestrator::new("schema-sync").run(&step, &tables).await;
    step.close().await;

    Ok(report_exit_code(&report))
}
