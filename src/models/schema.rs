use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const KEY_FLAG_YES: &str = "Oui";
pub const KEY_FLAG_NO: &str = "Non";

const FIELD_PATH_CELL: usize = 0;
const KEY_FLAG_CELL: usize = 1;
const FILTER_CELL: usize = 2;

/// One row of a format's configuration table.
///
/// Cell 0 is the field path, cell 1 the key flag (`"Oui"`/`"Non"`), cell 2 the filter
/// expression; anything after that is auxiliary metadata such as the declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaRow(pub Vec<String>);

impl SchemaRow {
    pub fn cells(&self) -> &[String] {
        &self.0
    }

    fn cell(&self, index: usize) -> &str {
        self.0.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn field_path(&self) -> &str {
        self.cell(FIELD_PATH_CELL)
    }

    pub fn is_key(&self) -> bool {
        self.cell(KEY_FLAG_CELL) == KEY_FLAG_YES
    }

    pub fn filter_expression(&self) -> &str {
        self.cell(FILTER_CELL)
    }

    pub fn auxiliary(&self) -> &[String] {
        self.0.get(FILTER_CELL + 1..).unwrap_or(&[])
    }
}

/// Field configuration of one import format. Never mutated after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaTable {
    pub headers: Vec<String>,
    pub rows: Vec<SchemaRow>,
    pub total_rows: usize,
}

impl SchemaTable {
    /// Builds a table from raw extracted rows: rows without cells are dropped and the
    /// rest are padded to a uniform width.
    pub fn from_raw(headers: Vec<String>, raw_rows: Vec<Vec<String>>) -> Self {
        let mut rows: Vec<Vec<String>> = raw_rows.into_iter().filter(|r| !r.is_empty()).collect();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);

        for row in &mut rows {
            row.resize(width, String::new());
        }

        let total_rows = rows.len();
        Self {
            headers,
            rows: rows.into_iter().map(SchemaRow).collect(),
            total_rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn key_field_paths(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter(|row| row.is_key())
            .map(|row| row.field_path().trim().to_string())
            .filter(|path| !path.is_empty())
            .collect()
    }
}

/// A field constrained to a named reference list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFieldInfo {
    pub field_path: String,
    pub list_type: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Allowed display values per list type. Values are de-duplicated; order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceLists(BTreeMap<String, BTreeSet<String>>);

impl ReferenceLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I>(&mut self, list_type: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.0.entry(list_type.into()).or_default().extend(values);
    }

    pub fn get(&self, list_type: &str) -> Option<&BTreeSet<String>> {
        self.0.get(list_type)
    }

    pub fn contains_type(&self, list_type: &str) -> bool {
        self.0.contains_key(list_type)
    }

    pub fn list_types(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copies the resolved values into each field's `values`.
    pub fn fill(&self, fields: &mut [ListFieldInfo]) {
        for field in fields {
            field.values = self
                .get(&field.list_type)
                .map(|values| values.iter().cloned().collect())
                .unwrap_or_default();
        }
    }
}
