use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Downloaded result file, addressable by its generated name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactHandle {
    pub file_name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success: bool,
    pub rows_imported: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_artifact_ref: Option<ArtifactHandle>,
}
