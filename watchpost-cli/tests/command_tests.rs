//! Integration tests for `watchpost` command handlers.
//!
//! Exercise config loading, `config show`, and `replay` with real files.

use std::fs;

use tempfile::TempDir;

use watchpost_cli::commands::config::build_config_report;
use watchpost_cli::commands::replay::replay_events;
use watchpost_cli::commands::{load_or_default, read_source};

#[tokio::test]
async fn test_load_or_default_falls_back_when_file_missing() {
    // Given: A path that does not exist
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("absent.toml");

    // When: Loading
    let config = load_or_default(&config_path)
        .await
        .expect("missing file should fall back to defaults");

    // Then: Documented defaults apply
    assert_eq!(config.behavior.thresholds.login_failure.limit, 5);
    assert_eq!(config.behavior.block_duration_secs, 1800);
}

#[tokio::test]
async fn test_load_or_default_reports_invalid_file() {
    // Given: A file with an invalid value
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("watchpost.toml");
    fs::write(&config_path, "[audit]\nstore = \"postgres\"\n").expect("should write config");

    // When: Loading
    let err = load_or_default(&config_path)
        .await
        .expect_err("invalid store should be rejected");

    // Then: The error is a configuration error (exit code 2)
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("audit.store"), "unexpected error: {err}");
}

#[tokio::test]
async fn test_load_or_default_reports_malformed_toml() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("bad.toml");
    fs::write(&config_path, "[general\nlog_level = \"info\"\n").expect("should write config");

    let err = load_or_default(&config_path)
        .await
        .expect_err("malformed TOML should fail");

    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_config_show_reflects_file_values() {
    // Given: A config file overriding thresholds
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("watchpost.toml");
    fs::write(
        &config_path,
        r#"
[behavior.thresholds]
login_failure = { limit = 10, window_secs = 600 }

[audit]
store = "memory"
"#,
    )
    .expect("should write config");

    // When: Building the `config show behavior` report
    let config = load_or_default(&config_path).await.expect("config should load");
    let report = build_config_report(
        config_path.display().to_string(),
        &config,
        Some("behavior"),
    )
    .expect("report should build");

    // Then: File values and untouched defaults both appear
    assert!(report.config_toml.contains("limit = 10"));
    assert_eq!(report.config["thresholds"]["login_failure"]["window_secs"], 600);
    assert_eq!(report.config["thresholds"]["auth_request"]["limit"], 5);
}

#[tokio::test]
async fn test_replay_file_with_custom_threshold() {
    // Given: A lowered login-failure threshold and a recorded burst of failures
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("watchpost.toml");
    fs::write(
        &config_path,
        "[behavior.thresholds]\nlogin_failure = { limit = 2, window_secs = 60 }\n",
    )
    .expect("should write config");

    let events_path = temp_dir.path().join("events.jsonl");
    let lines: Vec<String> = (0..4)
        .map(|i| {
            format!(
                r#"{{"kind":"auth-attempt","identity":"svc-backup","payload":"login","timestamp":"2026-03-01T08:00:0{i}Z","context":{{"outcome":"denied"}}}}"#
            )
        })
        .collect();
    fs::write(&events_path, lines.join("\n")).expect("should write events");

    // When: Replaying
    let config = load_or_default(&config_path).await.expect("config should load");
    let content = read_source(&events_path).await.expect("events should be readable");
    let report = replay_events(&config, &content, true)
        .await
        .expect("replay should run");

    // Then: The third attempt trips the lowered threshold and blocks the identity
    assert_eq!(report.events, 4);
    assert_eq!(report.verdicts.len(), 4);
    assert!(report.verdicts[..2].iter().all(|v| v.findings.is_empty()));
    assert!(!report.verdicts[2].findings.is_empty());
    assert!(report.verdicts[2].blocked_until.is_some());
    assert_eq!(report.blocked_identities, vec!["svc-backup".to_owned()]);
    assert!(report.rejected.is_empty());
}

#[tokio::test]
async fn test_read_source_missing_file_is_io_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let err = read_source(&temp_dir.path().join("nope.jsonl"))
        .await
        .expect_err("missing file should fail");

    assert_eq!(err.exit_code(), 10);
}
