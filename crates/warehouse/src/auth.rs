use common::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::debug;

pub const INSTALL_HINT: &str =
    "install the Google Cloud SDK (https://cloud.google.com/sdk/docs/install) and run `gcloud auth login`, or set BQ_ACCESS_TOKEN";

/// Source of OAuth bearer tokens for the BigQuery API.
pub enum TokenProvider {
    /// Token supplied directly through configuration.
    Static(String),
    /// `gcloud auth print-access-token`, fetched once per process.
    Gcloud {
        binary: PathBuf,
        cached: OnceCell<String>,
    },
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenProvider::Static(_) => f.write_str("Static(****)"),
            TokenProvider::Gcloud { binary, .. } => f.debug_struct("Gcloud").field("binary", binary).finish(),
        }
    }
}

impl TokenProvider {
    /// Prefer an explicit token; otherwise require `gcloud` on PATH.
    pub fn resolve(access_token: Option<String>) -> Result<Self> {
        if let Some(token) = access_token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
            return Ok(TokenProvider::Static(token));
        }

        let binary = which::which("gcloud").map_err(|_| {
            Error::DependencyMissing(format!("no BigQuery credentials found: {}", INSTALL_HINT))
        })?;
        debug!("Using gcloud at {} for BigQuery credentials", binary.display());

        Ok(TokenProvider::Gcloud {
            binary,
            cached: OnceCell::new(),
        })
    }

    pub async fn token(&self) -> Result<String> {
        match self {
            TokenProvider::Static(token) => Ok(token.clone()),
            TokenProvider::Gcloud { binary, cached } => cached
                .get_or_try_init(|| print_access_token(binary))
                .await
                .cloned(),
        }
    }
}

async fn print_access_token(binary: &Path) -> Result<String> {
    let output = Command::new(binary)
        .args(["auth", "print-access-token"])
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::ConfigError(format!(
            "gcloud could not produce an access token: {}",
            stderr.trim()
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(Error::ConfigError(
            "gcloud returned an empty access token".to_string(),
        ));
    }
    Ok(token)
}
