use anyhow::Result;
use std::process::ExitCode;

use crate::config::Config;

/// Print the resolved local store without connecting to it.
pub fn execute(config: &Config) -> Result<ExitCode> {
    let target = config.connection.resolve_target(&config.base_dir);
    let backend = if target.is_network() { "postgresql" } else { "sqlite" };
    println!("{}: {}", backend, target.display_location());
    Ok(ExitCode::SUCCESS)
}
