//! BigQuery to local store sync engine
//!
//! This crate handles:
//! - Warehouse type translation and DDL generation
//! - Bounded partition queries
//! - Local store connection (PostgreSQL or SQLite)
//! - Replace-mode row replication
//! - Schema sync and batch orchestration with per-table isolation

pub mod connector;
pub mod ddl;
pub mod orchestrator;
pub mod query;
pub mod replication;
pub mod schema_sync;
pub mod source;
pub mod table_list;
pub mod translate;

pub use connector::{Backend, Connector};
pub use ddl::{build_create_table, build_drop_table, ddl_file_name, quote_ident};
pub use orchestrator::{BatchTableSync, SyncOrchestrator, SyncStep, TableSync};
pub use query::{build_job_query, build_query};
pub use replication::ReplicationEngine;
pub use schema_sync::{plan_execute_only, warn_file_collisions, ApplyDdlStep, SchemaSyncMode, SchemaSyncStep};
pub use source::RemoteSource;
pub use table_list::{parse_table_list, TableListLoader};
pub use translate::{translate, TargetType};
