//! Output formatting for CLI results
//!
//! JSON output is the wire shape the API returns; human output is a compact
//! tree meant for terminals.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};

use crate::deploy::{DeploymentRecord, DeploymentStatus};
use crate::provision::CallerIdentity;

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

/// Log lines shown under a failed deployment in human output
const FAILURE_LOG_TAIL: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed JSON (machine-readable)
    Json,
    /// Human-readable formatted text
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

fn branch(is_last: bool) -> &'static str {
    if is_last {
        "\u{2514}\u{2500}"
    } else {
        "\u{251C}\u{2500}"
    }
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_record(&self, record: &DeploymentRecord) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(record)
                .context("Failed to serialize deployment record to JSON"),
            OutputFormat::Human => Ok(Self::record_human(record)),
        }
    }

    pub fn format_stacks(
        &self,
        available: &BTreeSet<String>,
        failures: &BTreeMap<String, String>,
    ) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "available": available,
                    "failures": failures,
                });
                serde_json::to_string_pretty(&output).context("Failed to serialize stacks to JSON")
            }
            OutputFormat::Human => {
                let mut output = String::from("Stack Handlers\n");
                output.push_str(RULE);
                output.push('\n');
                for (i, stack) in available.iter().enumerate() {
                    output.push_str(&format!("{} {}\n", branch(i + 1 == available.len()), stack));
                }
                if !failures.is_empty() {
                    output.push_str("\n\u{26A0} Unavailable:\n");
                    for (stack, reason) in failures {
                        output.push_str(&format!("  - {}: {}\n", stack, reason));
                    }
                }
                Ok(output)
            }
        }
    }

    pub fn format_identity(&self, identity: &CallerIdentity) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(identity)
                .context("Failed to serialize caller identity to JSON"),
            OutputFormat::Human => {
                let unknown = "(unknown)";
                Ok(format!(
                    "\u{2713} Credentials valid\n\
                     {} Account: {}\n\
                     {} ARN:     {}\n\
                     {} User:    {}\n",
                    branch(false),
                    identity.account.as_deref().unwrap_or(unknown),
                    branch(false),
                    identity.arn.as_deref().unwrap_or(unknown),
                    branch(true),
                    identity.user_id.as_deref().unwrap_or(unknown),
                ))
            }
        }
    }

    fn record_human(record: &DeploymentRecord) -> String {
        let mut output = String::new();

        match record.status {
            DeploymentStatus::Ready => output.push_str("\u{2713} Deployment Ready\n"),
            DeploymentStatus::Failed => output.push_str("\u{2717} Deployment Failed\n"),
            other => output.push_str(&format!("\u{2026} Deployment {}\n", other)),
        }
        output.push_str(RULE);
        output.push_str("\n\n");

        output.push_str(&format!("Deployment:  {}\n", record.id));
        output.push_str(&format!("Repository:  {}\n", record.repository));
        output.push_str(&format!("Project:     {}\n", record.project_name));
        if let Some(analysis) = &record.analysis {
            output.push_str(&format!(
                "Stack:       {} ({:.0}% confidence)\n",
                analysis.stack_type,
                analysis.confidence * 100.0
            ));
        }
        if let Some(handler) = &record.handler {
            let note = if record.fallback { " (fallback)" } else { "" };
            output.push_str(&format!("Handler:     {}{}\n", handler, note));
        }
        output.push('\n');

        output.push_str("Build:\n");
        output.push_str(&format!(
            "{} Install: {}\n",
            branch(false),
            record.build.install_command.as_deref().unwrap_or("(none)")
        ));
        output.push_str(&format!(
            "{} Build:   {}\n",
            branch(false),
            record.build.build_command.as_deref().unwrap_or("(none)")
        ));
        output.push_str(&format!("{} State:   {}\n\n", branch(true), record.build.state));

        if !record.resources.is_empty() {
            output.push_str("Resources:\n");
            for (i, resource) in record.resources.iter().enumerate() {
                output.push_str(&format!(
                    "{} {} {} [{}]",
                    branch(i + 1 == record.resources.len()),
                    resource.kind,
                    resource.name,
                    resource.status
                ));
                if let Some(detail) = &resource.detail {
                    output.push_str(&format!(" - {}", detail));
                }
                output.push('\n');
            }
            output.push('\n');
        } else if !record.resource_names.is_empty() {
            output.push_str("Resource Names:\n");
            for (i, (kind, name)) in record.resource_names.iter().enumerate() {
                output.push_str(&format!(
                    "{} {} {}\n",
                    branch(i + 1 == record.resource_names.len()),
                    kind,
                    name
                ));
            }
            output.push('\n');
        }

        if let Some(url) = &record.url {
            output.push_str(&format!("URL: {}\n", url));
        }

        if let Some(error) = &record.error {
            output.push_str(&format!("\n\u{26A0} {}: {}\n", error.error, error.message));
            let lines: Vec<&str> = record.log_text().collect();
            if !lines.is_empty() {
                output.push_str("\nLast log lines:\n");
                let start = lines.len().saturating_sub(FAILURE_LOG_TAIL);
                for line in &lines[start..] {
                    output.push_str(&format!("  {}\n", line));
                }
            }
        }

        output
    }
}
