use common::{Error, Result, SourceConfig, SyncJob};

/// Bounded `SELECT *` against `project.dataset.table`.
///
/// The filter is inserted verbatim; it comes from operator configuration.
pub fn build_query(
    project: &str,
    dataset: &str,
    table: &str,
    filter: Option<&str>,
    limit: u64,
) -> Result<String> {
    let project = project.trim();
    let dataset = dataset.trim();
    if project.is_empty() || dataset.is_empty() {
        return Err(Error::ConfigError(
            "Set BQ_PROJECT and BQ_DATASET (e.g. in .env)".to_string(),
        ));
    }
    if table.trim().is_empty() {
        return Err(Error::ValidationError("source table must not be empty".to_string()));
    }
    if limit == 0 {
        return Err(Error::ValidationError("row limit must be greater than zero".to_string()));
    }

    let mut query = format!("SELECT * FROM `{}`.`{}`.`{}`", project, dataset, table.trim());
    if let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) {
        query.push_str(" WHERE ");
        query.push_str(filter);
    }
    query.push_str(&format!(" LIMIT {}", limit));

    Ok(query)
}

/// Query for a job against the configured source.
pub fn build_job_query(source: &SourceConfig, job: &SyncJob) -> Result<String> {
    build_query(
        &source.project,
        &source.dataset,
        &job.table_id,
        job.partition_filter.as_deref(),
        job.limit,
    )
}
