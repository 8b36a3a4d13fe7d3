pub mod excel;
pub mod csv;
pub mod json;

use anyhow::{anyhow, Result};
use std::path::Path;

use crate::models::{ValidationFinding, ValidationReport};

pub use excel::{export_schema_template, ExcelExporter};
pub use self::csv::CsvExporter;
pub use json::JsonExporter;

pub trait Exporter {
    fn export(&self, report: &ValidationReport, path: &Path) -> Result<()>;
}

/// Which validation pass produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Key,
    List,
}

impl Check {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Key => "missing key value",
            Self::List => "value not in list",
        }
    }
}

/// Key findings first, then list findings, each tagged with its pass.
pub fn tagged_findings(report: &ValidationReport) -> Vec<(Check, &ValidationFinding)> {
    report
        .keys
        .findings
        .iter()
        .map(|f| (Check::Key, f))
        .chain(report.lists.findings.iter().map(|f| (Check::List, f)))
        .collect()
}

/// Picks the exporter matching the file extension of `path`.
pub fn exporter_for(path: &Path) -> Result<Box<dyn Exporter>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "xlsx" => Ok(Box::new(ExcelExporter)),
        "csv" => Ok(Box::new(CsvExporter::new())),
        "json" => Ok(Box::new(JsonExporter::new())),
        other => Err(anyhow!("No exporter for '.{}' files (use .xlsx, .csv or .json)", other)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{KeyValidationResult, ListValidationResult};
    use chrono::Local;

    pub fn sample_report() -> ValidationReport {
        ValidationReport {
            file_name: "people.xlsx".to_string(),
            data_rows: 3,
            keys: KeyValidationResult {
                valid: false,
                key_fields: vec!["person.name".to_string()],
                mappings: Vec::new(),
                unmapped_fields: Vec::new(),
                findings: vec![ValidationFinding {
                    row: 4,
                    column: "person.name".to_string(),
                    value: None,
                }],
                message: "Missing key values".to_string(),
            },
            lists: ListValidationResult {
                valid: false,
                mappings: Vec::new(),
                unmapped_fields: Vec::new(),
                findings: vec![ValidationFinding {
                    row: 2,
                    column: "person.civility".to_string(),
                    value: Some("Mlle".to_string()),
                }],
                message: "Values not found in reference lists".to_string(),
            },
            generated_at: Local::now(),
        }
    }

    #[test]
    fn test_findings_tagged_keys_first() {
        let report = sample_report();
        let tagged = tagged_findings(&report);
        assert_eq!(tagged.len(), 2);
        assert_eq!(tagged[0].0, Check::Key);
        assert_eq!(tagged[1].1.value.as_deref(), Some("Mlle"));
    }

    #[test]
    fn test_exporter_for_extension() {
        assert!(exporter_for(Path::new("report.XLSX")).is_ok());
        assert!(exporter_for(Path::new("report.json")).is_ok());
        assert!(exporter_for(Path::new("report.txt")).is_err());
    }
}
