pub mod credentials;
pub mod format;
pub mod import;
pub mod schema;
pub mod spreadsheet;
pub mod validation;

pub use credentials::Credentials;
pub use format::{AdminPage, ImportFormat};
pub use import::{ArtifactHandle, ImportResult};
pub use schema::{ListFieldInfo, ReferenceLists, SchemaRow, SchemaTable, KEY_FLAG_NO, KEY_FLAG_YES};
pub use spreadsheet::SpreadsheetData;
pub use validation::{
    ColumnMapping, KeyValidationResult, ListValidationResult, ValidationFinding, ValidationReport,
};
