use async_trait::async_trait;
use common::{Error, Result, RowBatch, TableSpec};
use tracing::debug;
use warehouse::{decode_batch, decode_schema, BigQueryClient};

/// Read side of a sync: table schemas and query results from the warehouse.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_schema(&self, table_id: &str) -> Result<TableSpec>;

    async fn fetch_rows(&self, table_id: &str, query: &str) -> Result<RowBatch>;
}

#[async_trait]
impl RemoteSource for BigQueryClient {
    async fn fetch_schema(&self, table_id: &str) -> Result<TableSpec> {
        let table = self.get_table(table_id).await?;
        let schema = table
            .schema
            .ok_or_else(|| Error::remote_fetch(table_id, "table has no schema"))?;
        let fields = decode_schema(table_id, &schema)?;
        debug!(
            "Fetched {} fields for {} ({} rows upstream)",
            fields.len(),
            table_id,
            table.num_rows.as_deref().unwrap_or("unknown")
        );
        Ok(TableSpec::new(table_id, fields))
    }

    async fn fetch_rows(&self, table_id: &str, query: &str) -> Result<RowBatch> {
        debug!("Querying {}: {}", table_id, query);
        let (schema, rows) = self.run_query(table_id, query).await?;
        decode_batch(table_id, &schema, &rows)
    }
}
