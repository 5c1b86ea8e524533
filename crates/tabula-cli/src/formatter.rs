//! Output formatters for component listings.

use clap::ValueEnum;
use comfy_table::Table;
use tabula_core::model::{Component, Payload};

/// Output format for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Format a listing of components.
pub fn format_components(format: OutputFormat, components: &[&Component]) -> String {
    match format {
        OutputFormat::Table => format_table(components),
        OutputFormat::Json => format_json(components),
    }
}

fn format_table(components: &[&Component]) -> String {
    if components.is_empty() {
        return "No components".to_string();
    }

    let mut table = Table::new();
    table.set_header(vec!["Id", "Kind", "Name", "Rank", "Owner", "Detail"]);
    for component in components {
        table.add_row(vec![
            component.id().0.to_string(),
            component.kind().to_string(),
            component.name().to_string(),
            component.rank().to_string(),
            owner(component),
            detail(component),
        ]);
    }
    table.to_string()
}

fn format_json(components: &[&Component]) -> String {
    let rows: Vec<serde_json::Value> = components
        .iter()
        .map(|component| {
            let mut row = serde_json::to_value(component.attributes())
                .unwrap_or(serde_json::Value::Null);
            if let serde_json::Value::Object(map) = &mut row {
                map.insert("id".to_string(), component.id().0.into());
            }
            row
        })
        .collect();
    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
}

/// The component this one belongs to, if any.
fn owner(component: &Component) -> String {
    match component.payload() {
        Payload::Class(_) => String::new(),
        Payload::FieldGroup(def) => def.class.to_string(),
        Payload::Field(def) => def.group.to_string(),
        Payload::Type(def) => def.class.to_string(),
    }
}

fn detail(component: &Component) -> String {
    match component.payload() {
        Payload::Class(def) => def.classtype.to_string(),
        Payload::FieldGroup(def) => {
            if def.selectable {
                "selectable".to_string()
            } else {
                String::new()
            }
        }
        Payload::Field(def) => {
            let mut flags = vec![def.fieldtype.tag().to_string()];
            if def.optional {
                flags.push("optional".to_string());
            }
            if def.internal {
                flags.push("internal".to_string());
            }
            flags.join(", ")
        }
        Payload::Type(def) => {
            let mut parts = Vec::new();
            if !def.selected_fields.is_empty() {
                parts.push(format!("{} selected", def.selected_fields.len()));
            }
            for (nature, superiors) in &def.superiors {
                let ids: Vec<String> = superiors.iter().map(ToString::to_string).collect();
                parts.push(format!("{nature}: {}", ids.join(" ")));
            }
            parts.join("; ")
        }
    }
}
