use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One violated constraint. `row` is the spreadsheet row number (header = 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub row: usize,
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Schema field path reconciled to a spreadsheet column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub field_path: String,
    pub header: String,
    pub column_index: usize,
    /// Name of the matcher that produced the mapping.
    pub matched_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValidationResult {
    pub valid: bool,
    pub key_fields: Vec<String>,
    pub mappings: Vec<ColumnMapping>,
    pub unmapped_fields: Vec<String>,
    pub findings: Vec<ValidationFinding>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListValidationResult {
    pub valid: bool,
    pub mappings: Vec<ColumnMapping>,
    pub unmapped_fields: Vec<String>,
    pub findings: Vec<ValidationFinding>,
    pub message: String,
}

/// Both validation passes over one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub file_name: String,
    pub data_rows: usize,
    pub keys: KeyValidationResult,
    pub lists: ListValidationResult,
    pub generated_at: DateTime<Local>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.keys.valid && self.lists.valid
    }

    pub fn all_findings(&self) -> Vec<ValidationFinding> {
        self.keys
            .findings
            .iter()
            .chain(self.lists.findings.iter())
            .cloned()
            .collect()
    }
}
