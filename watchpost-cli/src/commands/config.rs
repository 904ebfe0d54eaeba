//! `watchpost config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use watchpost_core::config::WatchpostConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Sections accepted by `config show <section>`.
pub const SECTIONS: [&str; 7] = [
    "general",
    "detection",
    "behavior",
    "alerting",
    "audit",
    "ingest",
    "metrics",
];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Load (file + env overrides) and validate; the report is printed either way.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = match WatchpostConfig::load(config_path).await {
        Ok(_) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: true,
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: false,
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let config = WatchpostConfig::load(config_path).await?;
    let report = build_config_report(
        config_path.display().to_string(),
        &config,
        section.as_deref(),
    )?;
    writer.render(&report)
}

/// Render the effective configuration (or one section of it) as TOML.
pub fn build_config_report(
    source: String,
    config: &WatchpostConfig,
    section: Option<&str>,
) -> Result<ConfigReport, CliError> {
    let Some(name) = section else {
        return Ok(ConfigReport {
            source,
            section: None,
            config_toml: to_toml(config)?,
            config: serde_json::to_value(config)?,
        });
    };

    let (config_toml, value) = match name {
        "general" => (to_toml(&config.general)?, serde_json::to_value(&config.general)?),
        "detection" => (
            to_toml(&config.detection)?,
            serde_json::to_value(&config.detection)?,
        ),
        "behavior" => (
            to_toml(&config.behavior)?,
            serde_json::to_value(&config.behavior)?,
        ),
        "alerting" => (
            to_toml(&config.alerting)?,
            serde_json::to_value(&config.alerting)?,
        ),
        "audit" => (to_toml(&config.audit)?, serde_json::to_value(&config.audit)?),
        "ingest" => (to_toml(&config.ingest)?, serde_json::to_value(&config.ingest)?),
        "metrics" => (to_toml(&config.metrics)?, serde_json::to_value(&config.metrics)?),
        other => {
            return Err(CliError::Command(format!(
                "unknown section: {} (expected: {})",
                other,
                SECTIONS.join(", ")
            )));
        }
    };

    Ok(ConfigReport {
        source,
        section: Some(name.to_owned()),
        config_toml,
        config: value,
    })
}

fn to_toml<T: Serialize>(value: &T) -> Result<String, CliError> {
    toml::to_string_pretty(value)
        .map_err(|e| CliError::Command(format!("failed to serialize config: {}", e)))
}

/// Effective configuration display.
///
/// Text output prints TOML; JSON output nests the same values under `config`.
#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip)]
    pub config_toml: String,
    pub config: serde_json::Value,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match &self.section {
            Some(section) => writeln!(
                w,
                "Configuration {} (source: {})",
                format!("[{}]", section).bold(),
                self.source
            )?,
            None => writeln!(w, "Configuration (source: {})", self.source.bold())?,
        }
        writeln!(w)?;
        write!(w, "{}", self.config_toml)
    }
}

/// Configuration validation result.
#[derive(Debug, Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    /// Empty when valid.
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;
        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}
