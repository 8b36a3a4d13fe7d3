use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::models::ValidationFinding;

/// Longest slice of remote text (page messages, HTTP bodies) carried in an error.
pub const DISPLAY_TEXT_LIMIT: usize = 300;

/// UI controls the engine probes for. Used to name what could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    LoginButton,
    LoginForm,
    PostLoginMarker,
    AdminMenu,
    AdminEntry,
    ImportSection,
    FormatGrid,
    ConfigurationTable,
    FormatCombobox,
    FileInput,
    RollbackMode,
    SubmitButton,
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoginButton => "login button",
            Self::LoginForm => "login form",
            Self::PostLoginMarker => "post-login marker",
            Self::AdminMenu => "administration menu",
            Self::AdminEntry => "administration entry",
            Self::ImportSection => "import section",
            Self::FormatGrid => "import format grid",
            Self::ConfigurationTable => "format configuration table",
            Self::FormatCombobox => "format combobox",
            Self::FileInput => "file input",
            Self::RollbackMode => "rollback execution mode",
            Self::SubmitButton => "submit button",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{control} not found (tried {tried} selector candidates)")]
    ControlNotFound { control: Control, tried: usize },

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("system authentication failed (HTTP {status}): {body}")]
    SystemAuth { status: u16, body: String },

    #[error("timed out after {waited:?} while {step}")]
    NavigationTimeout { step: String, waited: Duration },

    #[error("import format '{0}' not found")]
    FormatNotFound(String),

    #[error("none of the key fields {key_fields:?} could be mapped to a spreadsheet column")]
    NoKeyColumnsMapped { key_fields: Vec<String> },

    #[error("spreadsheet validation failed with {} finding(s)", findings.len())]
    ValidationFailure { findings: Vec<ValidationFinding> },

    #[error("import did not complete within {waited:?}")]
    ImportTimeout { waited: Duration },

    #[error("target system reported an import failure: {0}")]
    RemoteImportFailure(String),

    #[error("result artifact could not be retrieved: {0}")]
    Artifact(String),

    #[error("pagination stopped after {limit} pages while a next page was still offered")]
    PageLimitExceeded { limit: usize },

    #[error("reference API request failed (HTTP {status}) for {url}")]
    ReferenceApi { status: u16, url: String },

    #[error("reference list fetch exceeded {waited:?}")]
    ReferenceTimeout { waited: Duration },

    #[error("list item {index} is no longer on the current page")]
    ItemVanished { index: usize },

    #[error("background task failed: {0}")]
    TaskFailed(String),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("schema table is empty")]
    EmptySchema,

    #[error("browser error: {0}")]
    Browser(#[from] thirtyfour::error::WebDriverError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("browser startup failed: {0}")]
    Startup(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn not_found(control: Control, tried: usize) -> Self {
        Self::ControlNotFound { control, tried }
    }

    pub fn timeout(step: impl Into<String>, waited: Duration) -> Self {
        Self::NavigationTimeout {
            step: step.into(),
            waited,
        }
    }
}

/// Cuts remote text down to [`DISPLAY_TEXT_LIMIT`] characters on a char boundary.
pub fn truncate_for_display(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(DISPLAY_TEXT_LIMIT) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
