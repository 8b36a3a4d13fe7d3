use std::collections::BTreeSet;
use tracing::{info, warn};

use super::matcher::MatcherChain;
use super::{map_columns, rows_preview, MESSAGE_ROW_PREVIEW, MESSAGE_VALUE_PREVIEW};
use crate::models::{ListValidationResult, ReferenceLists, SchemaTable, SpreadsheetData, ValidationFinding};
use crate::reference::resolve_lists;

/// Every non-blank cell of a list-constrained column must be one of the list's values.
pub fn validate_lists(data: &SpreadsheetData, schema: &SchemaTable, lists: &ReferenceLists) -> ListValidationResult {
    validate_lists_with(data, schema, lists, &MatcherChain::list_columns())
}

pub fn validate_lists_with(
    data: &SpreadsheetData,
    schema: &SchemaTable,
    lists: &ReferenceLists,
    matchers: &MatcherChain,
) -> ListValidationResult {
    let fields = resolve_lists(schema);

    if fields.is_empty() {
        return ListValidationResult {
            valid: true,
            mappings: Vec::new(),
            unmapped_fields: Vec::new(),
            findings: Vec::new(),
            message: "No list-constrained fields in this format.".to_string(),
        };
    }

    let (mappings, unmapped_fields) = map_columns(
        fields
            .iter()
            .map(|f| (f.field_path.as_str(), Some(f.list_type.as_str()))),
        &data.headers,
        matchers,
    );

    for field in &unmapped_fields {
        warn!(field = %field, "list field has no matching spreadsheet column");
    }

    let mut findings = Vec::new();
    let mut lines = Vec::new();
    let mut skipped = Vec::new();

    for mapping in &mappings {
        let list_type = mapping.list_type.as_deref().unwrap_or_default();
        let Some(allowed) = lists.get(list_type) else {
            warn!(list_type, field = %mapping.field_path, "no reference values for list type; column not checked");
            skipped.push(format!("{} ({})", mapping.field_path, list_type));
            continue;
        };

        let invalid: Vec<(usize, String)> = data
            .rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| {
                let value = row.get(mapping.column_index)?.trim();
                if value.is_empty() || allowed.contains(value) {
                    None
                } else {
                    Some((SpreadsheetData::sheet_row_number(index), value.to_string()))
                }
            })
            .collect();

        if invalid.is_empty() {
            continue;
        }

        let rows: Vec<usize> = invalid.iter().map(|(row, _)| *row).collect();
        let distinct: BTreeSet<&str> = invalid.iter().map(|(_, v)| v.as_str()).collect();
        lines.push(format!(
            "'{}' (column '{}') has {} value(s) outside list '{}': {} on row(s) {}. Allowed: {}",
            mapping.field_path,
            mapping.header,
            invalid.len(),
            list_type,
            distinct.into_iter().collect::<Vec<_>>().join(", "),
            rows_preview(&rows, MESSAGE_ROW_PREVIEW),
            values_preview(allowed, MESSAGE_VALUE_PREVIEW),
        ));

        findings.extend(invalid.into_iter().map(|(row, value)| ValidationFinding {
            row,
            column: mapping.field_path.clone(),
            value: Some(value),
        }));
    }

    let valid = findings.is_empty();
    let mut message = if valid {
        format!("All {} mapped list column(s) hold allowed values.", mappings.len() - skipped.len())
    } else {
        format!("Values not found in reference lists:\n{}", lines.join("\n"))
    };
    if !skipped.is_empty() {
        message.push_str(&format!("\nNot checked, list unavailable: {}", skipped.join(", ")));
    }
    if !unmapped_fields.is_empty() {
        message.push_str(&format!("\nList fields without a column: {}", unmapped_fields.join(", ")));
    }

    info!(
        mapped = mappings.len(),
        unmapped = unmapped_fields.len(),
        findings = findings.len(),
        "list validation finished"
    );

    ListValidationResult {
        valid,
        mappings,
        unmapped_fields,
        findings,
        message,
    }
}

fn values_preview(values: &BTreeSet<String>, cap: usize) -> String {
    let shown: Vec<&str> = values.iter().take(cap).map(String::as_str).collect();
    match values.len().saturating_sub(cap) {
        0 => shown.join(", "),
        more => format!("{} (+{} more)", shown.join(", "), more),
    }
}
