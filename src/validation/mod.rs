//! Spreadsheet validation against a format's schema and its reference lists.
//!
//! Everything here is a pure function of its inputs: no browser, no network.

pub mod keys;
pub mod lists;
pub mod matcher;
pub mod reader;

use chrono::Local;
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::models::{ColumnMapping, ReferenceLists, SchemaTable, SpreadsheetData, ValidationReport};
pub use keys::{validate_keys, validate_keys_with};
pub use lists::{validate_lists, validate_lists_with};
pub use matcher::{ColumnMatch, ColumnMatcher, KeywordPairs, MatcherChain};
pub use reader::read_spreadsheet;

/// Rows listed per column in user-facing messages.
pub const MESSAGE_ROW_PREVIEW: usize = 5;
/// Allowed values listed per column in user-facing messages.
pub const MESSAGE_VALUE_PREVIEW: usize = 10;

/// Maps each `(field_path, list_type)` to a header. Returns the mappings and the field
/// paths no matcher could place.
pub(crate) fn map_columns<'a>(
    fields: impl IntoIterator<Item = (&'a str, Option<&'a str>)>,
    headers: &[String],
    matchers: &MatcherChain,
) -> (Vec<ColumnMapping>, Vec<String>) {
    let mut mappings = Vec::new();
    let mut unmapped = Vec::new();

    for (field_path, list_type) in fields {
        match matchers.locate(field_path, headers) {
            Some(found) => mappings.push(ColumnMapping {
                field_path: field_path.to_string(),
                header: headers[found.index].clone(),
                column_index: found.index,
                matched_by: found.matched_by.to_string(),
                list_type: list_type.map(str::to_string),
            }),
            None => unmapped.push(field_path.to_string()),
        }
    }
    (mappings, unmapped)
}

pub(crate) fn rows_preview(rows: &[usize], cap: usize) -> String {
    let shown: Vec<String> = rows.iter().take(cap).map(usize::to_string).collect();
    match rows.len().saturating_sub(cap) {
        0 => shown.join(", "),
        more => format!("{} (+{} more)", shown.join(", "), more),
    }
}

/// Runs both passes. Fails only when no key column can be mapped at all; rejected rows
/// are reported through the returned report.
pub fn validate_spreadsheet(
    file_name: &str,
    data: &SpreadsheetData,
    schema: &SchemaTable,
    lists: &ReferenceLists,
) -> EngineResult<ValidationReport> {
    let keys = validate_keys(data, schema)?;
    let lists = validate_lists(data, schema, lists);

    let report = ValidationReport {
        file_name: file_name.to_string(),
        data_rows: data.rows.len(),
        keys,
        lists,
        generated_at: Local::now(),
    };

    if report.is_valid() {
        info!(file = file_name, rows = report.data_rows, "✅ Spreadsheet passed validation");
    } else {
        info!(
            file = file_name,
            findings = report.all_findings().len(),
            "❌ Spreadsheet rejected"
        );
    }
    Ok(report)
}

/// Turns a rejected report into [`EngineError::ValidationFailure`].
pub fn ensure_valid(report: &ValidationReport) -> EngineResult<()> {
    if report.is_valid() {
        Ok(())
    } else {
        Err(EngineError::ValidationFailure {
            findings: report.all_findings(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rows_preview() {
        assert_eq!(rows_preview(&[2, 3], 5), "2, 3");
        assert_eq!(rows_preview(&[2, 3, 4, 5, 6, 7], 5), "2, 3, 4, 5, 6 (+1 more)");
    }

    #[test]
    fn test_report_combines_both_passes() {
        let schema = SchemaTable::from_raw(
            strings(&["Field", "Key", "Filter"]),
            vec![
                strings(&["person.name", "Oui", ""]),
                strings(&["person.civility", "Non", "type.name='Civility'"]),
            ],
        );
        let mut lists = ReferenceLists::new();
        lists.insert("Civility", strings(&["M.", "Mme"]));
        let data = SpreadsheetData::new(
            strings(&["person.name", "Civilité"]),
            vec![strings(&["", "Mme"]), strings(&["Durand", "Dr"])],
        );

        let report = validate_spreadsheet("people.xlsx", &data, &schema, &lists).unwrap();

        assert!(!report.is_valid());
        assert_eq!(report.data_rows, 2);
        assert_eq!(report.all_findings().len(), 2);

        match ensure_valid(&report) {
            Err(EngineError::ValidationFailure { findings }) => {
                assert_eq!(findings[0].row, 2);
                assert_eq!(findings[1].value.as_deref(), Some("Dr"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }
}
