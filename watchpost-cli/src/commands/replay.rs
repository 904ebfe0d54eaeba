//! `watchpost replay` command handler
//!
//! Feeds recorded events through a fresh `SecurityEngine` in file order.
//! Behavior windows follow the events' own timestamps, so a replay
//! reproduces brute-force detection and escalation as they happened.
//! Audit records go to an in-memory store and are summarized by action.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use watchpost_alerting::{Alert, AlertFilter};
use watchpost_audit::{AuditSink, MemoryAuditStore, SinkConfig};
use watchpost_core::config::WatchpostConfig;
use watchpost_core::error::WatchpostError;
use watchpost_core::event::{SecurityEvent, rfc3339};
use watchpost_core::types::Severity;
use watchpost_engine::{SecurityEngine, Verdict};

use crate::cli::ReplayArgs;
use crate::commands::{load_or_default, read_source};
use crate::error::CliError;
use crate::output::{OutputWriter, Render, severity_label};

/// Execute the `replay` command.
pub async fn execute(
    args: ReplayArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_or_default(config_path).await?;
    let content = read_source(&args.file).await?;

    info!(file = %args.file.display(), "replaying events");
    let mut report = replay_events(&config, &content, args.verbose).await?;
    report.source = args.file.display().to_string();
    writer.render(&report)?;

    if args.strict && !report.rejected.is_empty() {
        return Err(CliError::Command(format!(
            "{} line(s) could not be parsed",
            report.rejected.len()
        )));
    }
    Ok(())
}

/// Assess every event line of `content` and summarize the outcome.
pub async fn replay_events(
    config: &WatchpostConfig,
    content: &str,
    verbose: bool,
) -> Result<ReplayReport, CliError> {
    let sink = AuditSink::new(SinkConfig::from_core(&config.audit), MemoryAuditStore::new());
    let audit = sink.handle();
    let engine = SecurityEngine::new(config, sink.handle())?;

    let mut report = ReplayReport::default();
    let mut blocked = BTreeSet::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let event: SecurityEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                debug!(line = index + 1, error = %e, "skipping unparseable line");
                report.rejected.push(RejectedLine {
                    line: index + 1,
                    error: e.to_string(),
                });
                continue;
            }
        };

        let assessment = engine.assess(&event);
        report.events += 1;
        if !assessment.findings.is_empty() {
            report.flagged += 1;
        }
        report.max_risk_score = report.max_risk_score.max(assessment.risk.score);
        if assessment.is_blocked() {
            blocked.insert(assessment.identity.clone());
        }
        if verbose {
            report.verdicts.push(assessment.verdict());
        }

        // keep the bounded audit buffer from overflowing on long files
        if audit.len() >= config.audit.batch_size {
            sink.flush_all().await.map_err(WatchpostError::from)?;
        }
    }
    sink.flush_all().await.map_err(WatchpostError::from)?;

    report.blocked_identities = blocked.into_iter().collect();
    report.alerts = engine
        .alerts()
        .list_alerts(&AlertFilter::new())
        .iter()
        .map(AlertEntry::from)
        .collect();
    for record in sink.store().records() {
        *report.audit_actions.entry(record.action).or_default() += 1;
    }

    Ok(report)
}

/// Summary of a replay run.
#[derive(Debug, Default, Serialize)]
pub struct ReplayReport {
    pub source: String,
    /// Events assessed (rejected lines excluded).
    pub events: usize,
    /// Events with at least one finding.
    pub flagged: usize,
    pub max_risk_score: u8,
    pub blocked_identities: Vec<String>,
    pub alerts: Vec<AlertEntry>,
    /// Audit record count per action name.
    pub audit_actions: BTreeMap<String, usize>,
    pub rejected: Vec<RejectedLine>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub verdicts: Vec<Verdict>,
}

#[derive(Debug, Serialize)]
pub struct AlertEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub severity: Severity,
    pub identity: String,
    pub created_at: String,
    pub escalated_from: Option<String>,
}

impl From<&Alert> for AlertEntry {
    fn from(alert: &Alert) -> Self {
        Self {
            id: alert.id.clone(),
            alert_type: alert.alert_type.clone(),
            severity: alert.severity,
            identity: alert.identity.clone(),
            created_at: rfc3339::format(alert.created_at),
            escalated_from: alert.escalated_from.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RejectedLine {
    /// 1-based line number.
    pub line: usize,
    pub error: String,
}

impl Render for ReplayReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Replay: {}", self.source.bold())?;
        writeln!(
            w,
            "  Events: {} assessed, {} flagged, {} rejected",
            self.events,
            self.flagged.to_string().yellow(),
            if self.rejected.is_empty() {
                "0".normal()
            } else {
                self.rejected.len().to_string().red()
            }
        )?;
        writeln!(w, "  Max risk score: {}", self.max_risk_score)?;
        if !self.blocked_identities.is_empty() {
            writeln!(
                w,
                "  Blocked: {}",
                self.blocked_identities.join(", ").red()
            )?;
        }

        if !self.alerts.is_empty() {
            writeln!(w)?;
            writeln!(w, "Alerts ({} total)", self.alerts.len().to_string().bold())?;
            writeln!(
                w,
                "{:<38} {:<28} {:<10} {:<20} Escalated from",
                "ID", "Type", "Severity", "Identity"
            )?;
            writeln!(w, "{}", "-".repeat(110))?;
            for a in &self.alerts {
                writeln!(
                    w,
                    "{:<38} {:<28} {:<10} {:<20} {}",
                    a.id,
                    a.alert_type,
                    severity_label(a.severity.as_str()),
                    a.identity,
                    a.escalated_from.as_deref().unwrap_or("-")
                )?;
            }
        }

        if !self.audit_actions.is_empty() {
            writeln!(w)?;
            writeln!(w, "Audit records:")?;
            for (action, count) in &self.audit_actions {
                writeln!(w, "  {:<22} {}", action, count)?;
            }
        }

        if !self.rejected.is_empty() {
            writeln!(w)?;
            writeln!(w, "Rejected lines:")?;
            for r in &self.rejected {
                writeln!(w, "  line {}: {}", r.line, r.error.red())?;
            }
        }

        for v in &self.verdicts {
            writeln!(
                w,
                "  {} risk={} alerts={}",
                v.event_id,
                v.risk_score,
                v.alert_ids.len()
            )?;
        }

        Ok(())
    }
}
