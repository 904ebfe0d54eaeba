//! `watchpost scan` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use watchpost_core::config::WatchpostConfig;
use watchpost_core::error::WatchpostError;
use watchpost_core::event::{EventKind, Payload, SecurityEvent};
use watchpost_core::types::{Finding, Severity};
use watchpost_detection::{DetectorConfig, ThreatDetector, score};

use crate::cli::ScanArgs;
use crate::commands::{load_or_default, read_source};
use crate::error::CliError;
use crate::output::{OutputWriter, Render, severity_label};

/// Identity attributed to payloads scanned from the command line.
const CLI_IDENTITY: &str = "cli";

/// Execute the `scan` command.
pub async fn execute(
    args: ScanArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_or_default(config_path).await?;
    let input = if args.input == "-" {
        read_source(Path::new("-")).await?
    } else {
        args.input
    };

    info!(kind = %args.kind, bytes = input.len(), "scanning payload");
    let report = scan_payload(&config, args.kind, &input, &args.context)?;
    writer.render(&report)?;

    if !report.findings.is_empty() {
        return Err(CliError::Detected(report.findings.len()));
    }
    Ok(())
}

/// Run the detector over one payload.
///
/// Input that parses as a JSON object is scanned as a structured payload.
pub fn scan_payload(
    config: &WatchpostConfig,
    kind: EventKind,
    input: &str,
    context: &[(String, String)],
) -> Result<ScanReport, CliError> {
    let detector = ThreatDetector::new(DetectorConfig::from_core(&config.detection))
        .map_err(WatchpostError::from)?;

    let payload = match serde_json::from_str::<serde_json::Value>(input) {
        Ok(serde_json::Value::Object(map)) => Payload::Structured(map),
        _ => Payload::Text(input.to_owned()),
    };
    let event = context.iter().fold(
        SecurityEvent::new(kind, CLI_IDENTITY, payload),
        |event, (key, value)| event.with_context(key.as_str(), value.as_str()),
    );

    let findings = detector.detect(&event);
    let risk = score(&findings);
    Ok(ScanReport {
        kind: kind.as_str().to_owned(),
        risk_score: risk.score,
        severity: risk.severity,
        findings,
    })
}

/// Result of scanning one payload.
#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub kind: String,
    pub risk_score: u8,
    pub severity: Option<Severity>,
    pub findings: Vec<Finding>,
}

impl Render for ScanReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.findings.is_empty() {
            writeln!(w, "Scan ({}): {}", self.kind, "no threats detected".green())?;
            return Ok(());
        }

        let severity = self.severity.map(|s| s.as_str()).unwrap_or("none");
        writeln!(
            w,
            "Scan ({}): {} finding(s), risk score {} ({})",
            self.kind,
            self.findings.len().to_string().bold(),
            self.risk_score.to_string().bold(),
            severity_label(severity)
        )?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<28} {:<20} {:<10} Description",
            "Rule", "Category", "Severity"
        )?;
        writeln!(w, "{}", "-".repeat(90))?;
        for f in &self.findings {
            writeln!(
                w,
                "{:<28} {:<20} {:<10} {}",
                f.matched_rule,
                f.category.as_str(),
                severity_label(f.severity.as_str()),
                f.description
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchpost_core::types::FindingCategory;

    #[test]
    fn test_scan_payload_detects_script_tag() {
        let report = scan_payload(
            &WatchpostConfig::default(),
            EventKind::InputSubmission,
            "<script>alert(1)</script>",
            &[],
        )
        .expect("scan should run");

        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].category, FindingCategory::Xss);
        assert_eq!(report.severity, Some(Severity::High));
        assert!(report.risk_score >= 60);
    }

    #[test]
    fn test_scan_payload_benign_text() {
        let report = scan_payload(
            &WatchpostConfig::default(),
            EventKind::InputSubmission,
            "Hello, I'd like to update my shipping address.",
            &[],
        )
        .expect("scan should run");

        assert!(report.findings.is_empty());
        assert_eq!(report.risk_score, 0);
        assert_eq!(report.severity, None);
    }

    #[test]
    fn test_scan_payload_structured_json() {
        let report = scan_payload(
            &WatchpostConfig::default(),
            EventKind::InputSubmission,
            r#"{"form":{"comment":"1 UNION ALL SELECT password FROM users"}}"#,
            &[],
        )
        .expect("scan should run");

        assert!(
            report
                .findings
                .iter()
                .any(|f| f.category == FindingCategory::SqlInjection),
            "nested field should be scanned: {:?}",
            report.findings
        );
    }

    #[test]
    fn test_scan_payload_uses_context_user_agent() {
        let context = vec![("user_agent".to_owned(), "sqlmap/1.7.2".to_owned())];
        let report = scan_payload(
            &WatchpostConfig::default(),
            EventKind::NetworkRequest,
            "GET /",
            &context,
        )
        .expect("scan should run");

        assert!(
            report
                .findings
                .iter()
                .any(|f| f.category == FindingCategory::SuspiciousAgent)
        );
    }

    #[test]
    fn test_scan_report_render_text() {
        colored::control::set_override(false);
        let report = scan_payload(
            &WatchpostConfig::default(),
            EventKind::InputSubmission,
            "<script>alert(1)</script>",
            &[],
        )
        .expect("scan should run");

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let output = String::from_utf8(buffer).expect("valid UTF-8");

        assert!(output.contains("1 finding(s)"));
        assert!(output.contains("xss-script-tag"));
    }
}
