use anyhow::Result;
use csv::WriterBuilder;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::models::ValidationReport;
use super::{tagged_findings, Exporter};

/// Findings as one CSV row each.
pub struct CsvExporter {
    delimiter: u8,
    with_bom: bool,
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self {
            delimiter: b';', // Excel in French locales splits on ';'
            with_bom: true,
        }
    }
}

impl CsvExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_bom(mut self, with_bom: bool) -> Self {
        self.with_bom = with_bom;
        self
    }
}

impl Exporter for CsvExporter {
    fn export(&self, report: &ValidationReport, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;

        if self.with_bom {
            file.write_all(&[0xEF, 0xBB, 0xBF])?;
        }

        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(file);
        writer.write_record(["Row", "Column", "Value", "Check"])?;

        for (check, finding) in tagged_findings(report) {
            writer.write_record([
                finding.row.to_string().as_str(),
                finding.column.as_str(),
                finding.value.as_deref().unwrap_or(""),
                check.label(),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }
}
