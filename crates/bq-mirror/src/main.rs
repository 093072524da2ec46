mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use sync_engine::SchemaSyncMode;
use tracing::error;

use crate::commands::table_sync::TableSyncArgs;
use crate::config::{Config, GlobalArgs};

/// Mirrors BigQuery table schemas and partitions into a local
/// PostgreSQL or SQLite database for development.
#[derive(Parser)]
#[command(name = "bq-mirror", version, about = "Mirror BigQuery tables into a local database")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy one table partition into a local table
    TableSync {
        /// Source table id
        #[arg(long, env = "BQ_TABLE", default_value = "bronze_events")]
        table: String,
        /// WHERE clause applied to the source query
        #[arg(long, env = "BQ_PARTITION_FILTER")]
        partition_filter: Option<String>,
        #[arg(long, env = "BQ_PARTITION_LIMIT", default_value_t = 10_000)]
        limit: u64,
        /// SQLite file to write to; ignores LOCAL_DB_URL
        #[arg(long)]
        local_db: Option<PathBuf>,
        #[arg(long, env = "LOCAL_TABLE", default_value = "bronze_events")]
        target_table: String,
    },
    /// Generate local DDL from BigQuery schemas and optionally apply it
    SchemaSync {
        /// Only write .sql files
        #[arg(long, conflicts_with = "execute_only")]
        write_only: bool,
        /// Only execute existing .sql files (requires LOCAL_DB_URL)
        #[arg(long)]
        execute_only: bool,
        #[arg(long, env = "BQ_SCHEMA_DIR", default_value = "schema/bronze")]
        schema_dir: PathBuf,
    },
    /// Sync every listed table into a local table of the same name
    BatchSync {
        #[arg(long, env = "BQ_PARTITION_FILTER")]
        partition_filter: Option<String>,
        #[arg(long, env = "BQ_PARTITION_LIMIT", default_value_t = 10_000)]
        limit: u64,
    },
    /// Show the local database in use, password masked
    ConnectionInfo,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    logging::init(&cli.global.log_level, cli.global.log_format);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::from_args(&cli.global)?;

    match cli.command {
        Commands::TableSync {
            table,
            partition_filter,
            limit,
            local_db,
            target_table,
        } => {
            let args = TableSyncArgs {
                table,
                partition_filter,
                limit,
                local_db,
                target_table,
            };
            commands::table_sync::execute(&config, args).await
        }
        Commands::SchemaSync {
            write_only,
            execute_only,
            schema_dir,
        } => {
            let mode = SchemaSyncMode::from_flags(write_only, execute_only)?;
            commands::schema_sync::execute(&config, mode, &schema_dir).await
        }
        Commands::BatchSync { partition_filter, limit } => {
            commands::batch_sync::execute(&config, partition_filter, limit).await
        }
        Commands::ConnectionInfo => commands::connection_info::execute(&config),
    }
}
