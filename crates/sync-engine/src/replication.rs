use common::{Error, Result, RowBatch, SqlValue, WriteMode};
use sqlx::{PgPool, Postgres, QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::connector::{Backend, Connector};
use crate::ddl::{build_create_table, build_drop_table, quote_ident};
use crate::translate::{translate, TargetType};

/// Stay under SQLite's default host-parameter cap (32766); Postgres allows more.
const MAX_BIND_PARAMS: usize = 32_000;

macro_rules! push_value {
    ($builder:expr, $value:expr) => {
        match $value {
            SqlValue::Null => $builder.push_bind(None::<String>),
            SqlValue::Int(v) => $builder.push_bind(*v),
            SqlValue::Float(v) => $builder.push_bind(*v),
            SqlValue::Bool(v) => $builder.push_bind(*v),
            SqlValue::Text(v) => $builder.push_bind(v.clone()),
            SqlValue::Bytes(v) => $builder.push_bind(v.clone()),
        }
    };
}

/// Statements for one table write, shared by both backends.
struct WritePlan {
    drop_sql: String,
    create_sql: String,
    insert_prefix: String,
    column_types: Vec<TargetType>,
    rows_per_statement: usize,
}

/// Replication engine writes fetched rows into the local store
pub struct ReplicationEngine {
    connector: Connector,
    mode: WriteMode,
}

impl ReplicationEngine {
    pub fn new(connector: Connector, mode: WriteMode) -> Self {
        Self { connector, mode }
    }

    /// Write `batch` into `target_table` in a single transaction. Returns rows written.
    pub async fn write_batch(&self, target_table: &str, batch: &RowBatch) -> Result<usize> {
        if batch.fields.is_empty() {
            return Err(Error::write(target_table, "batch has no columns"));
        }
        if let Some(idx) = batch.rows.iter().position(|row| row.len() != batch.fields.len()) {
            return Err(Error::write(
                target_table,
                format!(
                    "row {} has {} values for {} columns",
                    idx,
                    batch.rows[idx].len(),
                    batch.fields.len()
                ),
            ));
        }

        let plan = match self.mode {
            WriteMode::Replace => plan_replace(target_table, batch),
        };

        debug!(
            "Writing {} rows to {} ({} per statement)",
            batch.len(),
            target_table,
            plan.rows_per_statement
        );

        let result = match self.connector.backend() {
            Backend::Postgres(pool) => write_postgres(pool, &plan, &batch.rows).await,
            Backend::Sqlite(pool) => write_sqlite(pool, &plan, &batch.rows).await,
        };
        result.map_err(|e| Error::write(target_table, e))?;

        Ok(batch.len())
    }

    pub async fn close(self) {
        self.connector.close().await;
    }
}

fn plan_replace(target_table: &str, batch: &RowBatch) -> WritePlan {
    let columns = batch
        .fields
        .iter()
        .map(|f| quote_ident(&f.name))
        .collect::<Vec<_>>()
        .join(", ");

    WritePlan {
        drop_sql: build_drop_table(target_table),
        create_sql: build_create_table(target_table, &batch.fields),
        insert_prefix: format!("INSERT INTO {} ({}) ", quote_ident(target_table), columns),
        column_types: batch
            .fields
            .iter()
            .map(|f| translate(&f.source_type, f.mode.as_deref()))
            .collect(),
        rows_per_statement: (MAX_BIND_PARAMS / batch.fields.len()).max(1),
    }
}

async fn write_postgres(pool: &PgPool, plan: &WritePlan, rows: &[Vec<SqlValue>]) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(&plan.drop_sql).execute(&mut *tx).await?;
    sqlx::query(&plan.create_sql).execute(&mut *tx).await?;

    for chunk in rows.chunks(plan.rows_per_statement) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(&plan.insert_prefix);
        builder.push_values(chunk, |mut values, row| {
            for (value, column_type) in row.iter().zip(&plan.column_types) {
                // Text-encoded cells (timestamps, numerics, json) need an explicit cast.
                push_value!(values, value);
                values.push_unseparated(format!("::{}", column_type));
            }
        });
        builder.build().execute(&mut *tx).await?;
    }

    tx.commit().await
}

async fn write_sqlite(pool: &SqlitePool, plan: &WritePlan, rows: &[Vec<SqlValue>]) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(&plan.drop_sql).execute(&mut *tx).await?;
    sqlx::query(&plan.create_sql).execute(&mut *tx).await?;

    for chunk in rows.chunks(plan.rows_per_statement) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(&plan.insert_prefix);
        builder.push_values(chunk, |mut values, row| {
            for value in row {
                push_value!(values, value);
            }
        });
        builder.build().execute(&mut *tx).await?;
    }

    tx.commit().await
}
