//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use std::collections::BTreeMap;
use std::fmt::Write;

use colored::Colorize;
use tabled::{Table, Tabled};

use crate::diag::{Diagnostics, Severity};
use crate::planner::{ChangeKind, ChangeSet, ExecutionResult, PlannedResource};
use crate::reconciler::RefreshReport;
use crate::schema::{Cardinality, ResourceTypeDump};
use crate::state::StateDocument;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Attribute row for schema display.
#[derive(Tabled)]
struct AttributeRow {
    #[tabled(rename = "Attribute")]
    name: String,
    #[tabled(rename = "Type")]
    ty: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Description")]
    description: String,
}

/// Managed instance row for state display.
#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Version")]
    version: u64,
    #[tabled(rename = "ID")]
    id: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats resource type schemas.
    #[must_use]
    pub fn format_schema(&self, schemas: &BTreeMap<String, ResourceTypeDump>) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(schemas).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                for (name, dump) in schemas {
                    let _ = write!(
                        output,
                        "\n{} (schema v{})\n",
                        name.bold(),
                        dump.schema.version
                    );
                    if !dump.schema.description.is_empty() {
                        let _ = writeln!(output, "   {}", dump.schema.description);
                    }
                    let _ = writeln!(output, "   Import ID: {}", dump.import_format);
                    if let Some(parent) = &dump.parent {
                        let _ = writeln!(output, "   Parent: {} via {}", parent.resource_type, parent.attribute);
                    }
                    let rows: Vec<AttributeRow> = dump
                        .schema
                        .attributes
                        .iter()
                        .map(|(attr, a)| AttributeRow {
                            name: attr.clone(),
                            ty: a.nesting.map_or_else(|| a.ty.clone(), |n| format!("{n:?} block").to_lowercase()),
                            mode: Self::format_cardinality(a.cardinality, a.sensitive),
                            description: Self::truncate(&a.description, 50),
                        })
                        .collect();
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }
                output
            }
        }
    }

    /// Formats diagnostics.
    #[must_use]
    pub fn format_diagnostics(&self, diagnostics: &Diagnostics) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(diagnostics).unwrap_or_default(),
            OutputFormat::Text => {
                if diagnostics.is_empty() {
                    return format!("{} Configuration is valid.\n", "✓".green());
                }
                let mut output = String::new();
                for diagnostic in diagnostics.iter() {
                    let glyph = match diagnostic.severity {
                        Severity::Error => "✗".red(),
                        Severity::Warning => "⚠".yellow(),
                    };
                    let _ = writeln!(output, "{glyph} {diagnostic}");
                }
                output
            }
        }
    }

    /// Formats a change set, optionally with attribute-level changes.
    #[must_use]
    pub fn format_plan(&self, change_set: &ChangeSet, planned: &[PlannedResource], detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&PlanJson::new(change_set, planned)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(change_set, planned, detailed),
        }
    }

    fn format_plan_text(change_set: &ChangeSet, planned: &[PlannedResource], detailed: bool) -> String {
        let mut output = String::new();
        for resource in planned {
            for diagnostic in resource.plan.diagnostics.warnings() {
                let _ = writeln!(output, "{} {}: {diagnostic}", "⚠".yellow(), resource.address);
            }
        }

        if change_set.is_empty() {
            let _ = writeln!(output, "{} No changes. Managed resources match the configuration.", "✓".green());
            return output;
        }

        output.push_str("\nExecution plan\n\n");

        let rows: Vec<PlanActionRow> = change_set
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_change_kind(a.kind),
                address: a.address.clone(),
                reason: Self::truncate(&a.reason, 50),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            for resource in planned.iter().filter(|r| !r.plan.changes.is_empty()) {
                let _ = write!(output, "\n  {} ({})\n", resource.address.bold(), resource.plan.action);
                for change in &resource.plan.changes {
                    let marker = if change.requires_replace {
                        " # forces replacement".red().to_string()
                    } else {
                        String::new()
                    };
                    let _ = writeln!(
                        output,
                        "    {}: {} -> {}{marker}",
                        change.path, change.before, change.after
                    );
                }
            }
        }

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to destroy\n",
            change_set.count(ChangeKind::Create).to_string().green(),
            change_set.count(ChangeKind::Update).to_string().yellow(),
            change_set.count(ChangeKind::Delete).to_string().red()
        );

        output
    }

    /// Formats the outcome of an apply.
    #[must_use]
    pub fn format_execution(&self, result: &ExecutionResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&ExecutionJson::from(result)).unwrap_or_default(),
            OutputFormat::Text => {
                let status = if result.all_successful() {
                    format!("{} Apply complete", "✓".green())
                } else {
                    format!("{} Apply failed", "✗".red())
                };

                let mut output = format!("{status}\n\n");
                for action in &result.results {
                    let glyph = if action.success {
                        "✓".green()
                    } else if action.skipped {
                        "-".dimmed()
                    } else {
                        "✗".red()
                    };
                    let _ = write!(
                        output,
                        "   {glyph} {} {}",
                        Self::format_change_kind(action.action.kind),
                        action.action.address
                    );
                    if let Some(id) = &action.resource_id {
                        let _ = write!(output, " [{id}]");
                    }
                    output.push('\n');
                    if let Some(error) = &action.error {
                        let _ = writeln!(output, "       {error}");
                    }
                    for diagnostic in action.diagnostics.warnings() {
                        let _ = writeln!(output, "       {} {diagnostic}", "⚠".yellow());
                    }
                }
                let _ = write!(output, "\n{result}\n");
                output
            }
        }
    }

    /// Formats the outcome of a refresh.
    #[must_use]
    pub fn format_refresh(&self, report: &RefreshReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "refreshed": report.refreshed,
                "removed": report.removed,
                "diagnostics": report.diagnostics,
                "errors": report
                    .errors
                    .iter()
                    .map(|(address, error)| serde_json::json!({ "address": address, "error": error }))
                    .collect::<Vec<_>>(),
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = writeln!(output, "   Refreshed: {}", report.refreshed.len());
                for address in &report.removed {
                    let _ = writeln!(output, "   {} {address} no longer exists; removed from state", "-".red());
                }
                for diagnostic in report.diagnostics.iter() {
                    let _ = writeln!(output, "   {} {diagnostic}", "⚠".yellow());
                }
                if !report.errors.is_empty() {
                    let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
                    for (address, error) in &report.errors {
                        let _ = writeln!(output, "   - {address}: {error}");
                    }
                }
                output
            }
        }
    }

    /// Formats the state document.
    #[must_use]
    pub fn format_state(&self, state: &StateDocument) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = writeln!(output, "\nState (serial {})\n", state.serial);
                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(output, "   Resources: {}", state.resources.len());

                if !state.resources.is_empty() {
                    let rows: Vec<InstanceRow> = state
                        .resources
                        .iter()
                        .map(|(address, instance)| InstanceRow {
                            address: address.clone(),
                            resource_type: instance.resource_type.clone(),
                            version: instance.schema_version,
                            id: instance.resource_id.clone().unwrap_or_default(),
                        })
                        .collect();
                    output.push('\n');
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success { "✓" } else { "✗" };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} ({})",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.resources.join(", ")
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats a change kind with color.
    fn format_change_kind(kind: ChangeKind) -> String {
        match kind {
            ChangeKind::Create => "+create".green().to_string(),
            ChangeKind::Update => "~update".yellow().to_string(),
            ChangeKind::Delete => "-delete".red().to_string(),
        }
    }

    fn format_cardinality(cardinality: Cardinality, sensitive: bool) -> String {
        let mode = match cardinality {
            Cardinality::Required => "required",
            Cardinality::Optional => "optional",
            Cardinality::Computed => "computed",
            Cardinality::OptionalComputed => "optional, computed",
        };
        if sensitive {
            format!("{mode}, sensitive")
        } else {
            mode.to_string()
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct PlanJson<'a> {
    creates: usize,
    updates: usize,
    deletes: usize,
    change_set: &'a ChangeSet,
    resources: Vec<ResourcePlanJson<'a>>,
}

#[derive(serde::Serialize)]
struct ResourcePlanJson<'a> {
    address: &'a str,
    resource_type: &'a str,
    action: String,
    changes: Vec<ChangeJson>,
    diagnostics: &'a Diagnostics,
}

#[derive(serde::Serialize)]
struct ChangeJson {
    path: String,
    before: String,
    after: String,
    requires_replace: bool,
}

impl<'a> PlanJson<'a> {
    fn new(change_set: &'a ChangeSet, planned: &'a [PlannedResource]) -> Self {
        Self {
            creates: change_set.count(ChangeKind::Create),
            updates: change_set.count(ChangeKind::Update),
            deletes: change_set.count(ChangeKind::Delete),
            change_set,
            resources: planned
                .iter()
                .map(|r| ResourcePlanJson {
                    address: &r.address,
                    resource_type: &r.resource_type,
                    action: r.plan.action.to_string(),
                    changes: r
                        .plan
                        .changes
                        .iter()
                        .map(|c| ChangeJson {
                            path: c.path.to_string(),
                            before: c.before.clone(),
                            after: c.after.clone(),
                            requires_replace: c.requires_replace,
                        })
                        .collect(),
                    diagnostics: &r.plan.diagnostics,
                })
                .collect(),
        }
    }
}

#[derive(serde::Serialize)]
struct ExecutionJson<'a> {
    success: bool,
    total_executed: usize,
    successful: usize,
    failed: usize,
    skipped: usize,
    results: Vec<ActionJson<'a>>,
}

#[derive(serde::Serialize)]
struct ActionJson<'a> {
    kind: ChangeKind,
    address: &'a str,
    success: bool,
    skipped: bool,
    resource_id: Option<&'a str>,
    error: Option<&'a str>,
    diagnostics: &'a Diagnostics,
}

impl<'a> From<&'a ExecutionResult> for ExecutionJson<'a> {
    fn from(result: &'a ExecutionResult) -> Self {
        Self {
            success: result.all_successful(),
            total_executed: result.total_executed,
            successful: result.successful,
            failed: result.failed,
            skipped: result.skipped,
            results: result
                .results
                .iter()
                .map(|r| ActionJson {
                    kind: r.action.kind,
                    address: &r.action.address,
                    success: r.success,
                    skipped: r.skipped,
                    resource_id: r.resource_id.as_deref(),
                    error: r.error.as_deref(),
                    diagnostics: &r.diagnostics,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::ChangeAction;

    fn change_set() -> ChangeSet {
        ChangeSet {
            created_at: chrono::Utc::now(),
            actions: vec![ChangeAction {
                kind: ChangeKind::Create,
                address: String::from("pingone_population.staff"),
                resource_type: String::from("pingone_population"),
                reason: String::from("Resource defined in configuration"),
                dependencies: vec![],
            }],
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("a much longer string", 10), "a much ...");
    }

    #[test]
    fn test_plan_json() {
        let output = OutputFormatter::new(OutputFormat::Json).format_plan(&change_set(), &[], false);
        let parsed: serde_json::Value = serde_json::from_str(&output).expect("json");
        assert_eq!(parsed["creates"], 1);
        assert_eq!(parsed["change_set"]["actions"][0]["kind"], "create");
    }

    #[test]
    fn test_plan_text_lists_addresses() {
        let output = OutputFormatter::new(OutputFormat::Text).format_plan(&change_set(), &[], false);
        assert!(output.contains("pingone_population.staff"));
        assert!(output.contains("to create"));
    }

    #[test]
    fn test_empty_diagnostics() {
        let output = OutputFormatter::new(OutputFormat::Text).format_diagnostics(&Diagnostics::new());
        assert!(output.contains("valid"));
    }

    #[test]
    fn test_state_text_lists_instances() {
        let mut state = StateDocument::new();
        let value = crate::value::Value::object([("id", crate::value::Value::string("abc"))]);
        state.set(
            "pingone_environment.dev",
            crate::state::InstanceState::new("pingone_environment", 0, &value),
        );
        let output = OutputFormatter::new(OutputFormat::Text).format_state(&state);
        assert!(output.contains("pingone_environment.dev"));
    }
}
