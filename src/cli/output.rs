//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde_json::Value;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::planner::{DiffType, ResourceDiff};
use crate::provider::{Diagnostic, Response, Severity};
use crate::schema::{Attribute, ResourceSchema};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Attribute row for schema tables.
#[derive(Tabled)]
struct AttributeRow {
    #[tabled(rename = "Attribute")]
    name: String,
    #[tabled(rename = "Type")]
    attr_type: String,
    #[tabled(rename = "Flags")]
    flags: String,
    #[tabled(rename = "Description")]
    description: String,
}

/// Diff row for plan tables.
#[derive(Tabled)]
struct DiffRow {
    #[tabled(rename = "Attribute")]
    field: String,
    #[tabled(rename = "Old")]
    old_value: String,
    #[tabled(rename = "New")]
    new_value: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats one or more schemas.
    #[must_use]
    pub fn format_schemas(&self, schemas: &[ResourceSchema]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(schemas).unwrap_or_default(),
            OutputFormat::Text => schemas.iter().map(Self::format_schema_text).collect(),
        }
    }

    fn format_schema_text(schema: &ResourceSchema) -> String {
        let mut output = String::new();
        let _ = writeln!(
            output,
            "\n{} (version {})",
            schema.type_name.bold(),
            schema.version
        );
        if !schema.description.is_empty() {
            let _ = writeln!(output, "   {}", schema.description);
        }
        output.push('\n');

        let mut rows = Vec::new();
        Self::collect_rows("", &schema.block.attributes, &mut rows);
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');
        output
    }

    fn collect_rows(prefix: &str, attributes: &[Attribute], rows: &mut Vec<AttributeRow>) {
        for attribute in attributes {
            let name = if prefix.is_empty() {
                attribute.name.to_string()
            } else {
                format!("{prefix}.{}", attribute.name)
            };
            rows.push(AttributeRow {
                name: name.clone(),
                attr_type: attribute.attr_type.describe().to_string(),
                flags: Self::flags(attribute),
                description: Self::truncate(attribute.description, 60),
            });
            if let crate::schema::AttributeType::Block { block, .. } = &attribute.attr_type {
                Self::collect_rows(&name, &block.attributes, rows);
            }
        }
    }

    fn flags(attribute: &Attribute) -> String {
        let mut flags = Vec::new();
        if attribute.required {
            flags.push("required".yellow().to_string());
        }
        if attribute.computed {
            flags.push("computed".dimmed().to_string());
        }
        if attribute.force_new {
            flags.push("force-new".red().to_string());
        }
        if attribute.sensitive {
            flags.push("sensitive".magenta().to_string());
        }
        flags.join(" ")
    }

    /// Formats diagnostics.
    #[must_use]
    pub fn format_diagnostics(&self, diagnostics: &[Diagnostic]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(diagnostics).unwrap_or_default(),
            OutputFormat::Text => {
                if diagnostics.is_empty() {
                    return format!("{} Configuration is valid.\n", "✓".green());
                }
                let mut output = String::new();
                for diagnostic in diagnostics {
                    let _ = writeln!(output, "{}", Self::diagnostic_line(diagnostic));
                }
                output
            }
        }
    }

    fn diagnostic_line(diagnostic: &Diagnostic) -> String {
        let marker = match diagnostic.severity {
            Severity::Error => "✗".red(),
            Severity::Warning => "⚠".yellow(),
        };
        format!("{marker} {diagnostic}")
    }

    /// Formats a planned change.
    #[must_use]
    pub fn format_diff(&self, diff: &ResourceDiff, diagnostics: &[Diagnostic]) -> String {
        match self.format {
            OutputFormat::Json => {
                let value = serde_json::json!({
                    "resource": diff.name,
                    "action": diff.diff_type.to_string(),
                    "requires_replace": diff.requires_replace,
                    "changes": diff.details.iter().map(|d| serde_json::json!({
                        "attribute": d.field,
                        "old": d.old_value,
                        "new": d.new_value,
                    })).collect::<Vec<_>>(),
                    "diagnostics": diagnostics,
                });
                serde_json::to_string_pretty(&value).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_diff_text(diff, diagnostics),
        }
    }

    fn format_diff_text(diff: &ResourceDiff, diagnostics: &[Diagnostic]) -> String {
        let mut output = String::new();
        if !diff.has_changes() {
            let _ = writeln!(
                output,
                "{} No changes required for {}.",
                "✓".green(),
                diff.name
            );
        } else {
            let _ = write!(
                output,
                "\n{} {}\n\n",
                Self::format_diff_type(diff.diff_type),
                diff.name.bold()
            );
            let rows: Vec<DiffRow> = diff
                .details
                .iter()
                .map(|d| {
                    let forces = diff.requires_replace.iter().any(|p| *p == d.field);
                    DiffRow {
                        field: if forces {
                            format!("{} {}", d.field, "(forces replacement)".red())
                        } else {
                            d.field.clone()
                        },
                        old_value: Self::truncate(d.old_value.as_deref().unwrap_or("-"), 40),
                        new_value: Self::truncate(d.new_value.as_deref().unwrap_or("(known after apply)"), 40),
                    }
                })
                .collect();
            if !rows.is_empty() {
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
            }
        }
        for diagnostic in diagnostics {
            let _ = writeln!(output, "{}", Self::diagnostic_line(diagnostic));
        }
        output
    }

    fn format_diff_type(diff_type: DiffType) -> String {
        match diff_type {
            DiffType::Create => "+create".green().to_string(),
            DiffType::Update => "~update".yellow().to_string(),
            DiffType::Replace => "-/+replace".red().to_string(),
            DiffType::Delete => "-delete".red().to_string(),
            DiffType::NoChange => "noop".dimmed().to_string(),
        }
    }

    /// Formats a serialized API filter.
    #[must_use]
    pub fn format_filter(&self, filter: &Value) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(filter).unwrap_or_default(),
            OutputFormat::Text => format!("X-Filter: {filter}\n"),
        }
    }

    /// Formats RPC responses.
    #[must_use]
    pub fn format_responses(&self, responses: &[Response]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(responses).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                for response in responses {
                    let status = if response.has_errors() {
                        "✗".red()
                    } else {
                        "✓".green()
                    };
                    let _ = writeln!(output, "{status} request {}", response.id);
                    for diagnostic in &response.diagnostics {
                        let _ = writeln!(output, "   {}", Self::diagnostic_line(diagnostic));
                    }
                    if let Some(state) = &response.state {
                        let pretty = serde_json::to_string_pretty(state).unwrap_or_default();
                        for line in pretty.lines() {
                            let _ = writeln!(output, "   {line}");
                        }
                    }
                }
                output
            }
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
