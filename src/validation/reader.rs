use calamine::{open_workbook_auto, Data, ExcelDateTime, Reader};
use chrono::Timelike;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::models::SpreadsheetData;

const UTF8_BOM: char = '\u{feff}';

/// Reads the first sheet of a workbook (`.xlsx`, `.xlsm`, `.xls`, `.ods`) or a `.csv`.
pub fn read_spreadsheet(path: &Path) -> EngineResult<SpreadsheetData> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let grid = match extension.as_str() {
        "csv" => read_csv_grid(path)?,
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => read_workbook_grid(path)?,
        other => {
            return Err(EngineError::Spreadsheet(format!(
                "unsupported file type '{}' (expected a spreadsheet or CSV)",
                other
            )))
        }
    };

    let data = from_grid(grid)?;
    debug!(
        columns = data.headers.len(),
        rows = data.rows.len(),
        "spreadsheet read"
    );
    Ok(data)
}

/// Row 0 becomes the headers; data rows with no non-blank cell are dropped and the rest
/// are padded to the header width.
pub fn from_grid(grid: Vec<Vec<String>>) -> EngineResult<SpreadsheetData> {
    let mut rows = grid.into_iter();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| EngineError::Spreadsheet("file has no header row".to_string()))?
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(EngineError::Spreadsheet("header row is empty".to_string()));
    }

    let width = headers.len();
    let data_rows = rows
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|mut row| {
            if row.len() < width {
                row.resize(width, String::new());
            }
            row
        })
        .collect();

    Ok(SpreadsheetData::new(headers, data_rows))
}

pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#{:?}", e),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::DateTime(dt) => datetime_to_string(dt),
    }
}

/// Dates as `YYYY-MM-DD`, with the time only when it is not midnight.
fn datetime_to_string(dt: &ExcelDateTime) -> String {
    if dt.is_duration() {
        return format!("{}", dt.as_f64());
    }
    match dt.as_datetime() {
        Some(value) if value.num_seconds_from_midnight() == 0 => value.format("%Y-%m-%d").to_string(),
        Some(value) => value.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("{}", dt.as_f64()),
    }
}

fn read_workbook_grid(path: &Path) -> EngineResult<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| EngineError::Spreadsheet("workbook has no worksheet".to_string()))?;

    let range = workbook.worksheet_range(&sheet_name)?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

fn detect_delimiter(first_line: &str) -> u8 {
    if first_line.matches(';').count() > first_line.matches(',').count() {
        b';'
    } else {
        b','
    }
}

fn read_csv_grid(path: &Path) -> EngineResult<Vec<Vec<String>>> {
    let content = fs::read_to_string(path)?;
    let content = content.trim_start_matches(UTF8_BOM);
    let delimiter = detect_delimiter(content.lines().next().unwrap_or(""));

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(content.as_bytes());

    let mut grid = Vec::new();
    for record in reader.records() {
        grid.push(record?.iter().map(str::to_string).collect());
    }
    Ok(grid)
}
