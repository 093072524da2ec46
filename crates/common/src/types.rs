use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One column of a source table, as declared by the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub source_type: String,
    pub mode: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, source_type: impl Into<String>, mode: Option<&str>) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            mode: mode.map(str::to_string),
        }
    }
}

/// Source table identifier plus its ordered fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub table_id: String,
    pub fields: Vec<FieldSpec>,
}

impl TableSpec {
    pub fn new(table_id: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            table_id: table_id.into(),
            fields,
        }
    }
}

/// A single data-sync request, built per table and consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub table_id: String,
    pub partition_filter: Option<String>,
    pub limit: u64,
    pub target_table: String,
}

impl SyncJob {
    pub fn new(
        table_id: impl Into<String>,
        partition_filter: Option<String>,
        limit: u64,
        target_table: impl Into<String>,
    ) -> Result<Self> {
        let table_id = table_id.into();
        if limit == 0 {
            return Err(Error::ValidationError(format!(
                "row limit for {} must be greater than zero",
                table_id
            )));
        }

        let target_table = target_table.into();
        if target_table.trim().is_empty() {
            return Err(Error::ValidationError(format!(
                "target table for {} must not be empty",
                table_id
            )));
        }

        Ok(Self {
            table_id,
            partition_filter: partition_filter
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty()),
            limit,
            target_table,
        })
    }
}

/// How rows land in an existing target table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Drop and recreate the target, then insert.
    #[default]
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Succeeded => write!(f, "succeeded"),
            SyncStatus::Failed => write!(f, "failed"),
            SyncStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Where a table currently is in its sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Pending,
    Fetching,
    Building,
    Writing,
    Succeeded,
    Failed,
    Skipped,
}

impl SyncPhase {
    pub fn can_advance_to(self, next: SyncPhase) -> bool {
        use SyncPhase::*;
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Fetching, Building)
                | (Fetching, Skipped)
                | (Fetching, Failed)
                | (Building, Writing)
                | (Building, Succeeded)
                | (Building, Failed)
                | (Writing, Succeeded)
                | (Writing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SyncPhase::Succeeded | SyncPhase::Failed | SyncPhase::Skipped)
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::Pending => "pending",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Building => "building",
            SyncPhase::Writing => "writing",
            SyncPhase::Succeeded => "succeeded",
            SyncPhase::Failed => "failed",
            SyncPhase::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Outcome of one table's sync step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub table_id: String,
    pub status: SyncStatus,
    pub detail: Option<String>,
}

impl SyncResult {
    pub fn new(table_id: impl Into<String>, status: SyncStatus, detail: Option<String>) -> Self {
        Self {
            table_id: table_id.into(),
            status,
            detail,
        }
    }

    pub fn succeeded(table_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(table_id, SyncStatus::Succeeded, Some(detail.into()))
    }

    pub fn failed(table_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(table_id, SyncStatus::Failed, Some(detail.into()))
    }

    pub fn skipped(table_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(table_id, SyncStatus::Skipped, Some(detail.into()))
    }
}

/// Aggregate of every table attempted in one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub results: Vec<SyncResult>,
}

impl Default for BatchReport {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: SyncResult) {
        self.results.push(result);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn count(&self, status: SyncStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn statuses(&self) -> Vec<SyncStatus> {
        self.results.iter().map(|r| r.status).collect()
    }

    /// True only when every attempted table succeeded.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.status == SyncStatus::Succeeded)
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} tables: {} succeeded, {} failed, {} skipped",
            self.results.len(),
            self.count(SyncStatus::Succeeded),
            self.count(SyncStatus::Failed),
            self.count(SyncStatus::Skipped),
        )
    }
}

/// A single cell ready to be bound into an INSERT.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
}

/// Rows pulled from the warehouse along with the schema that produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    pub fields: Vec<FieldSpec>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowBatch {
    pub fn new(fields: Vec<FieldSpec>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { fields, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
