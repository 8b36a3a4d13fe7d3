use tracing::{info, warn};

use super::matcher::MatcherChain;
use super::{map_columns, rows_preview, MESSAGE_ROW_PREVIEW};
use crate::error::{EngineError, EngineResult};
use crate::models::{KeyValidationResult, SchemaTable, SpreadsheetData, ValidationFinding};

/// Every key field mapped to a column must be filled in on every data row.
pub fn validate_keys(data: &SpreadsheetData, schema: &SchemaTable) -> EngineResult<KeyValidationResult> {
    validate_keys_with(data, schema, &MatcherChain::key_columns())
}

pub fn validate_keys_with(
    data: &SpreadsheetData,
    schema: &SchemaTable,
    matchers: &MatcherChain,
) -> EngineResult<KeyValidationResult> {
    let key_fields = schema.key_field_paths();

    if key_fields.is_empty() {
        info!("schema declares no key fields");
        return Ok(KeyValidationResult {
            valid: true,
            key_fields,
            mappings: Vec::new(),
            unmapped_fields: Vec::new(),
            findings: Vec::new(),
            message: "No key fields declared by the format; nothing to check.".to_string(),
        });
    }

    let (mappings, unmapped_fields) = map_columns(
        key_fields.iter().map(|f| (f.as_str(), None)),
        &data.headers,
        matchers,
    );

    for field in &unmapped_fields {
        warn!(field = %field, "key field has no matching spreadsheet column");
    }

    if mappings.is_empty() {
        return Err(EngineError::NoKeyColumnsMapped { key_fields });
    }

    let mut findings = Vec::new();
    let mut lines = Vec::new();

    for mapping in &mappings {
        let missing: Vec<usize> = data
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                row.get(mapping.column_index)
                    .map_or(true, |value| value.trim().is_empty())
            })
            .map(|(index, _)| SpreadsheetData::sheet_row_number(index))
            .collect();

        if missing.is_empty() {
            continue;
        }

        lines.push(format!(
            "'{}' (column '{}') is empty on {} row(s): {}",
            mapping.field_path,
            mapping.header,
            missing.len(),
            rows_preview(&missing, MESSAGE_ROW_PREVIEW)
        ));

        findings.extend(missing.into_iter().map(|row| ValidationFinding {
            row,
            column: mapping.field_path.clone(),
            value: None,
        }));
    }

    let valid = findings.is_empty();
    let mut message = if valid {
        format!("All {} mapped key column(s) are filled in.", mappings.len())
    } else {
        format!("Missing key values:\n{}", lines.join("\n"))
    };
    if !unmapped_fields.is_empty() {
        message.push_str(&format!("\nKey fields without a column: {}", unmapped_fields.join(", ")));
    }

    info!(
        mapped = mappings.len(),
        unmapped = unmapped_fields.len(),
        findings = findings.len(),
        "key validation finished"
    );

    Ok(KeyValidationResult {
        valid,
        key_fields,
        mappings,
        unmapped_fields,
        findings,
        message,
    })
}
