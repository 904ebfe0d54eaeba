//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no I/O happens here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use watchpost_core::event::EventKind;

/// Watchpost -- security event detection and alerting toolkit.
///
/// Use `watchpost <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "watchpost", version, about, long_about = None)]
pub struct Cli {
    /// Path to the watchpost.toml configuration file.
    ///
    /// `scan`, `replay` and `rules` fall back to built-in defaults when the
    /// file does not exist; `config` requires it.
    #[arg(short, long, global = true, default_value = "watchpost.toml")]
    pub config: PathBuf,

    /// Log level for diagnostics on stderr (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the threat detector over a single payload.
    Scan(ScanArgs),

    /// Feed a file of newline-delimited JSON events through the full engine.
    Replay(ReplayArgs),

    /// Inspect the built-in detection rules.
    Rules(RulesArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- scan ----

/// Scan one payload and report findings and the risk score.
///
/// Exits with code 4 when anything is detected.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Payload text to scan (`-` reads stdin).
    pub input: String,

    /// Event kind the payload is attributed to.
    #[arg(long, default_value = "input-submission", value_parser = parse_event_kind)]
    pub kind: EventKind,

    /// Context tag as `key=value` (repeatable), e.g. `--context user_agent=sqlmap/1.7`.
    #[arg(long = "context", value_parser = parse_context_pair)]
    pub context: Vec<(String, String)>,
}

// ---- replay ----

/// Replay recorded events in file order.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// File with one JSON `SecurityEvent` per line (`-` reads stdin).
    pub file: PathBuf,

    /// Include every per-event verdict in the output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Fail (exit code 1) if any line cannot be parsed.
    #[arg(long)]
    pub strict: bool,
}

// ---- rules ----

/// Inspect detection rules.
#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// List the built-in signature rules.
    List {
        /// Filter by category (xss, sql-injection, path-traversal, command-injection).
        #[arg(long)]
        category: Option<String>,
    },
}

// ---- config ----

/// Manage watchpost configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only one section (general, detection, behavior, alerting, audit, ingest, metrics).
        section: Option<String>,
    },
}

fn parse_event_kind(s: &str) -> Result<EventKind, String> {
    match s {
        "input-submission" => Ok(EventKind::InputSubmission),
        "auth-attempt" => Ok(EventKind::AuthAttempt),
        "network-request" => Ok(EventKind::NetworkRequest),
        "storage-access" => Ok(EventKind::StorageAccess),
        "runtime-error" => Ok(EventKind::RuntimeError),
        other => Err(format!(
            "unknown event kind '{other}' (expected: input-submission, auth-attempt, \
             network-request, storage-access, runtime-error)"
        )),
    }
}

fn parse_context_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), value.to_owned()))
        }
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_scan_defaults() {
        let cli = Cli::try_parse_from(["watchpost", "scan", "<script>"]).expect("should parse");
        assert_eq!(cli.output, OutputFormat::Text);
        assert_eq!(cli.config, PathBuf::from("watchpost.toml"));
        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.input, "<script>");
                assert_eq!(args.kind, EventKind::InputSubmission);
                assert!(args.context.is_empty());
            }
            _ => panic!("expected Scan command"),
        }
    }

    #[test]
    fn test_cli_parse_scan_with_kind_and_context() {
        let cli = Cli::try_parse_from([
            "watchpost",
            "scan",
            "GET /",
            "--kind",
            "network-request",
            "--context",
            "user_agent=sqlmap/1.7",
            "--context",
            "endpoint=/api",
            "--output",
            "json",
        ])
        .expect("should parse");

        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.kind, EventKind::NetworkRequest);
                assert_eq!(
                    args.context,
                    vec![
                        ("user_agent".to_owned(), "sqlmap/1.7".to_owned()),
                        ("endpoint".to_owned(), "/api".to_owned()),
                    ]
                );
            }
            _ => panic!("expected Scan command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_kind_and_bad_context() {
        assert!(Cli::try_parse_from(["watchpost", "scan", "x", "--kind", "teleport"]).is_err());
        assert!(Cli::try_parse_from(["watchpost", "scan", "x", "--context", "novalue"]).is_err());
        assert!(Cli::try_parse_from(["watchpost", "scan", "x", "--context", "=v"]).is_err());
    }

    #[test]
    fn test_cli_parse_replay_flags() {
        let cli = Cli::try_parse_from(["watchpost", "replay", "events.jsonl", "-v", "--strict"])
            .expect("should parse");
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.file, PathBuf::from("events.jsonl"));
                assert!(args.verbose);
                assert!(args.strict);
            }
            _ => panic!("expected Replay command"),
        }
    }

    #[test]
    fn test_cli_parse_rules_list_with_category() {
        let cli = Cli::try_parse_from(["watchpost", "rules", "list", "--category", "xss"])
            .expect("should parse");
        match cli.command {
            Commands::Rules(RulesArgs {
                action: RulesAction::List { category },
            }) => assert_eq!(category.as_deref(), Some("xss")),
            _ => panic!("expected Rules List command"),
        }
    }

    #[test]
    fn test_cli_parse_config_show_section() {
        let cli = Cli::try_parse_from(["watchpost", "-c", "/etc/w.toml", "config", "show", "audit"])
            .expect("should parse");
        assert_eq!(cli.config, PathBuf::from("/etc/w.toml"));
        match cli.command {
            Commands::Config(ConfigArgs {
                action: ConfigAction::Show { section },
            }) => assert_eq!(section.as_deref(), Some("audit")),
            _ => panic!("expected Config Show command"),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["watchpost"]).is_err());
    }
}
