use common::utils::calculate_backoff_duration;
use common::{Error, Result};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::messages::{ErrorResponse, QueryRequest, QueryResponse, Table, TableRow, TableSchema};

pub const DEFAULT_API_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

const PAGE_SIZE: u32 = 10_000;
const POLL_TIMEOUT_MS: u64 = 10_000;
const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_MAX_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub project: String,
    pub dataset: String,
    pub base_url: String,
    pub max_retries: u32,
    /// Per-request bound; whole fetches are bounded by the caller.
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(project: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            base_url: DEFAULT_API_BASE_URL.to_string(),
            max_retries: 0,
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// Thin BigQuery REST client: table metadata and query results.
#[derive(Debug)]
pub struct BigQueryClient {
    http: reqwest::Client,
    config: ClientConfig,
    tokens: TokenProvider,
}

impl BigQueryClient {
    pub fn new(config: ClientConfig, tokens: TokenProvider) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("bq-mirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        // Fail on a malformed base url now rather than on the first table.
        Url::parse(&config.base_url)
            .map_err(|e| Error::ConfigError(format!("invalid BigQuery base url {}: {}", config.base_url, e)))?;

        Ok(Self { http, config, tokens })
    }

    /// `GET projects/{p}/datasets/{d}/tables/{t}`
    pub async fn get_table(&self, table_id: &str) -> Result<Table> {
        let url = self.endpoint(&[
            "projects",
            &self.config.project,
            "datasets",
            &self.config.dataset,
            "tables",
            table_id,
        ])?;

        self.send_json(table_id, || self.http.get(url.clone())).await
    }

    /// Run a query to completion and return its schema with every result row.
    pub async fn run_query(&self, table_id: &str, query: &str) -> Result<(TableSchema, Vec<TableRow>)> {
        let url = self.endpoint(&["projects", &self.config.project, "queries"])?;
        let request = QueryRequest {
            max_results: Some(PAGE_SIZE),
            timeout_ms: Some(POLL_TIMEOUT_MS),
            ..QueryRequest::new(query)
        };

        let mut response: QueryResponse = self
            .send_json(table_id, || self.http.post(url.clone()).json(&request))
            .await?;

        let mut schema = response.schema.take();
        let mut rows = std::mem::take(&mut response.rows);

        while !response.job_complete || response.page_token.is_some() {
            let job = response.job_reference.clone().ok_or_else(|| {
                Error::remote_fetch(table_id, "query response is missing its job reference")
            })?;
            debug!(
                "Polling job {} for {} (complete: {}, rows so far: {})",
                job.job_id,
                table_id,
                response.job_complete,
                rows.len()
            );

            let mut url = self.endpoint(&["projects", &job.project_id, "queries", &job.job_id])?;
            {
                let mut params = url.query_pairs_mut();
                params
                    .append_pair("maxResults", &PAGE_SIZE.to_string())
                    .append_pair("timeoutMs", &POLL_TIMEOUT_MS.to_string())
                    .append_pair("formatOptions.useInt64Timestamp", "true");
                if let Some(location) = job.location.as_deref() {
                    params.append_pair("location", location);
                }
                if let Some(token) = response.page_token.as_deref() {
                    params.append_pair("pageToken", token);
                }
            }

            response = self.send_json(table_id, || self.http.get(url.clone())).await?;
            if schema.is_none() {
                schema = response.schema.take();
            }
            rows.append(&mut response.rows);
        }

        let schema = schema.ok_or_else(|| Error::remote_fetch(table_id, "query returned no schema"))?;
        Ok((schema, rows))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| Error::ConfigError(format!("invalid BigQuery base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::ConfigError("BigQuery base url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send with bearer auth, retrying transport errors and 429/5xx up to `max_retries`.
    async fn send_json<T, F>(&self, table_id: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            let token = self.tokens.token().await?;
            let message = match build().bearer_auth(&token).send().await {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<T>()
                        .await
                        .map_err(|e| Error::remote_fetch(table_id, format!("invalid response body: {}", e)));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let message = describe_error(status, &body);
                    if !is_retryable(status) {
                        return Err(Error::remote_fetch(table_id, message));
                    }
                    message
                }
                Err(e) => {
                    if !(e.is_timeout() || e.is_connect() || e.is_request()) {
                        return Err(Error::remote_fetch(table_id, e));
                    }
                    e.to_string()
                }
            };

            if attempt >= self.config.max_retries {
                return Err(Error::remote_fetch(table_id, message));
            }

            let delay = calculate_backoff_duration(attempt, BACKOFF_BASE_MS, BACKOFF_MAX_MS);
            attempt += 1;
            warn!(
                "BigQuery request for {} failed ({}), retry {}/{} in {:?}",
                table_id, message, attempt, self.config.max_retries, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn describe_error(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => format!("{} {}", status, parsed.error.message),
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => format!("{} {}", status, body.trim()),
    }
}
