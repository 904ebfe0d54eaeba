//! `watchpost rules` command handler

use std::io::Write;

use serde::Serialize;

use watchpost_core::types::FindingCategory;
use watchpost_detection::{BUILTIN_RULES, SignatureRule};

use crate::cli::{RulesAction, RulesArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render, severity_label};

/// Categories that signature rules can carry.
const SIGNATURE_CATEGORIES: [FindingCategory; 4] = [
    FindingCategory::Xss,
    FindingCategory::SqlInjection,
    FindingCategory::PathTraversal,
    FindingCategory::CommandInjection,
];

/// Execute the `rules` command.
pub fn execute(args: RulesArgs, writer: &OutputWriter) -> Result<(), CliError> {
    match args.action {
        RulesAction::List { category } => {
            let report = list_rules(category.as_deref())?;
            writer.render(&report)
        }
    }
}

/// Build the rule listing, optionally filtered by category name.
pub fn list_rules(category: Option<&str>) -> Result<RuleListReport, CliError> {
    let filter = category.map(parse_category).transpose()?;

    let rules: Vec<RuleEntry> = BUILTIN_RULES
        .iter()
        .filter(|r| filter.is_none_or(|c| r.category == c))
        .map(RuleEntry::from)
        .collect();

    Ok(RuleListReport {
        total: rules.len(),
        rules,
    })
}

fn parse_category(name: &str) -> Result<FindingCategory, CliError> {
    SIGNATURE_CATEGORIES
        .into_iter()
        .find(|c| c.as_str() == name || c.alert_type() == name)
        .ok_or_else(|| {
            CliError::Command(format!(
                "unknown category: {} (expected: {})",
                name,
                SIGNATURE_CATEGORIES.map(|c| c.as_str()).join(", ")
            ))
        })
}

#[derive(Debug, Serialize)]
pub struct RuleListReport {
    pub total: usize,
    pub rules: Vec<RuleEntry>,
}

#[derive(Debug, Serialize)]
pub struct RuleEntry {
    pub id: String,
    pub category: String,
    pub severity: String,
    pub description: String,
    pub pattern: String,
}

impl From<&SignatureRule> for RuleEntry {
    fn from(rule: &SignatureRule) -> Self {
        Self {
            id: rule.id.to_owned(),
            category: rule.category.as_str().to_owned(),
            severity: rule.severity.as_str().to_owned(),
            description: rule.description.to_owned(),
            pattern: rule.pattern.to_owned(),
        }
    }
}

impl Render for RuleListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Detection Rules ({} total)",
            self.total.to_string().bold()
        )?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<28} {:<20} {:<10} Description",
            "ID", "Category", "Severity"
        )?;
        writeln!(w, "{}", "-".repeat(90))?;

        for r in &self.rules {
            writeln!(
                w,
                "{:<28} {:<20} {:<10} {}",
                r.id,
                r.category,
                severity_label(&r.severity),
                r.description
            )?;
        }

        Ok(())
    }
}
