//! Command handlers -- one module per subcommand

pub mod config;
pub mod replay;
pub mod rules;
pub mod scan;

use std::path::Path;

use tokio::io::AsyncReadExt;
use tracing::info;

use watchpost_core::config::WatchpostConfig;

use crate::error::CliError;

/// Load the config file, or fall back to defaults (plus env overrides) when it does not exist.
pub async fn load_or_default(path: &Path) -> Result<WatchpostConfig, CliError> {
    if tokio::fs::try_exists(path).await? {
        return Ok(WatchpostConfig::load(path).await?);
    }

    info!(path = %path.display(), "config file not found, using defaults");
    let mut config = WatchpostConfig::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Read a whole file, or stdin when `source` is `-`.
pub async fn read_source(source: &Path) -> Result<String, CliError> {
    if source.as_os_str() == "-" {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        return Ok(buf);
    }
    Ok(tokio::fs::read_to_string(source).await?)
}
