use anyhow::Result;
use clap::{Args, ValueEnum};
use common::{ConnectionConfig, SourceConfig, SyncSettings};
use std::path::{Path, PathBuf};
use sync_engine::{Connector, TableListLoader};
use warehouse::{BigQueryClient, ClientConfig, TokenProvider, DEFAULT_API_BASE_URL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Options shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// BigQuery project id
    #[arg(long, env = "BQ_PROJECT", global = true)]
    pub project: Option<String>,

    /// BigQuery dataset id
    #[arg(long, env = "BQ_DATASET", global = true)]
    pub dataset: Option<String>,

    /// PostgreSQL URL; takes precedence over the SQLite path
    #[arg(long, env = "LOCAL_DB_URL", global = true)]
    pub local_db_url: Option<String>,

    /// SQLite database file used when no URL is set
    #[arg(long, env = "LOCAL_DB_PATH", global = true)]
    pub local_db_path: Option<PathBuf>,

    /// Comma-separated table ids, overriding the table list file
    #[arg(long, env = "BQ_BRONZE_TABLES", global = true)]
    pub tables: Option<String>,

    /// File with one table id per line
    #[arg(long, env = "BQ_TABLE_LIST", default_value = "bronze_tables.txt", global = true)]
    pub table_list: PathBuf,

    #[arg(long, env = "BQ_FETCH_TIMEOUT_SECS", default_value_t = 300, global = true)]
    pub fetch_timeout_secs: u64,

    #[arg(long, env = "LOCAL_WRITE_TIMEOUT_SECS", default_value_t = 300, global = true)]
    pub write_timeout_secs: u64,

    #[arg(long, env = "LOCAL_CONNECT_TIMEOUT_SECS", default_value_t = 30, global = true)]
    pub connect_timeout_secs: u64,

    /// Retries for transient BigQuery failures
    #[arg(long, env = "BQ_MAX_RETRIES", default_value_t = 0, global = true)]
    pub max_retries: u32,

    /// Log level (error, warn, info, debug, trace); RUST_LOG wins when set
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub connection: ConnectionConfig,
    pub settings: SyncSettings,
    pub table_list: PathBuf,
    pub tables_override: Option<String>,
    pub access_token: Option<String>,
    pub api_base_url: String,
    /// Relative paths resolve against this directory.
    pub base_dir: PathBuf,
}

impl Config {
    pub fn from_args(args: &GlobalArgs) -> Result<Self> {
        Ok(Config {
            source: SourceConfig::new(
                args.project.clone().unwrap_or_default(),
                args.dataset.clone().unwrap_or_default(),
            ),
            connection: ConnectionConfig::new(args.local_db_url.clone(), args.local_db_path.clone()),
            settings: SyncSettings {
                fetch_timeout_secs: args.fetch_timeout_secs,
                write_timeout_secs: args.write_timeout_secs,
                connect_timeout_secs: args.connect_timeout_secs,
                max_retries: args.max_retries,
            },
            table_list: args.table_list.clone(),
            tables_override: args.tables.clone(),
            access_token: std::env::var("BQ_ACCESS_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            api_base_url: std::env::var("BQ_API_BASE_URL")
                .ok()
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            base_dir: std::env::current_dir()?,
        })
    }

    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn table_loader(&self) -> TableListLoader {
        TableListLoader::new(self.resolve_path(&self.table_list), self.tables_override.clone())
    }

    /// BigQuery client for the configured project and dataset.
    pub fn warehouse_client(&self) -> Result<BigQueryClient> {
        self.source.validate()?;

        let client_config = ClientConfig {
            base_url: self.api_base_url.clone(),
            max_retries: self.settings.max_retries,
            request_timeout: self.settings.fetch_timeout(),
            ..ClientConfig::new(&self.source.project, &self.source.dataset)
        };
        let tokens = TokenProvider::resolve(self.access_token.clone())?;

        Ok(BigQueryClient::new(client_config, tokens)?)
    }

    pub async fn connect(&self, connection: &ConnectionConfig) -> Result<Connector> {
        Ok(Connector::resolve(connection, &self.base_dir, self.settings.connect_timeout()).await?)
    }
}
