use common::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resolves which tables a run processes.
///
/// A non-empty comma-separated override wins over the list file. A missing list file
/// yields no tables.
#[derive(Debug, Clone)]
pub struct TableListLoader {
    list_path: PathBuf,
    override_list: Option<String>,
}

impl TableListLoader {
    pub fn new(list_path: impl Into<PathBuf>, override_list: Option<String>) -> Self {
        Self {
            list_path: list_path.into(),
            override_list,
        }
    }

    pub fn list_path(&self) -> &Path {
        &self.list_path
    }

    pub fn load(&self) -> Result<Vec<String>> {
        if let Some(list) = self.override_list.as_deref().filter(|l| !l.trim().is_empty()) {
            debug!("Using table override list");
            return Ok(dedupe(list.split(',').map(str::trim)));
        }

        if !self.list_path.exists() {
            debug!("Table list {} not found", self.list_path.display());
            return Ok(Vec::new());
        }

        let contents = std::fs::read_to_string(&self.list_path)?;
        Ok(parse_table_list(&contents))
    }
}

/// One id per line; `#` comments and blank lines are ignored.
pub fn parse_table_list(contents: &str) -> Vec<String> {
    dedupe(
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#')),
    )
}

fn dedupe<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tables = Vec::new();
    for id in ids.filter(|id| !id.is_empty()) {
        if seen.insert(id) {
            tables.push(id.to_string());
        } else {
            warn!("Duplicate table {} in list, keeping the first entry", id);
        }
    }
    tables
}
