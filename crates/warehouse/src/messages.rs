//! BigQuery REST v2 resources, limited to the fields the mirror reads or sends.

use serde::{Deserialize, Serialize};

/// `tables.get` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub schema: Option<TableSchema>,
    pub num_rows: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableFieldSchema {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: Option<String>,
    pub mode: Option<String>,
    /// Sub-fields of a RECORD column.
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

impl TableFieldSchema {
    pub fn is_repeated(&self) -> bool {
        self.mode
            .as_deref()
            .map_or(false, |m| m.eq_ignore_ascii_case("REPEATED"))
    }

    pub fn is_record(&self) -> bool {
        self.field_type
            .as_deref()
            .map_or(false, |t| t.eq_ignore_ascii_case("RECORD") || t.eq_ignore_ascii_case("STRUCT"))
    }
}

/// `jobs.query` request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    pub use_legacy_sql: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub format_options: DataFormatOptions,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            use_legacy_sql: false,
            max_results: None,
            timeout_ms: None,
            format_options: DataFormatOptions {
                use_int64_timestamp: true,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFormatOptions {
    pub use_int64_timestamp: bool,
}

/// Shared shape of `jobs.query` and `jobs.getQueryResults` responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub job_reference: Option<JobReference>,
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
    pub page_token: Option<String>,
    pub total_rows: Option<String>,
    #[serde(default)]
    pub job_complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub f: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub v: serde_json::Value,
}

/// Error envelope returned with non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}
