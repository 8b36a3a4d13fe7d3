use anyhow::Result;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::Path;

use crate::models::{SchemaTable, ValidationReport};
use super::{tagged_findings, Exporter};

pub struct ExcelExporter;

impl Exporter for ExcelExporter {
    fn export(&self, report: &ValidationReport, path: &Path) -> Result<()> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();

        let summary = workbook.add_worksheet();
        summary.set_name("Summary")?;
        summary.set_column_width(0, 20)?;
        summary.set_column_width(1, 80)?;

        let result = if report.is_valid() { "Valid" } else { "Rejected" };
        let rows: [(&str, String); 6] = [
            ("File", report.file_name.clone()),
            ("Generated", report.generated_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            ("Data rows", report.data_rows.to_string()),
            ("Result", result.to_string()),
            ("Key check", report.keys.message.clone()),
            ("List check", report.lists.message.clone()),
        ];
        for (row, (label, value)) in rows.iter().enumerate() {
            summary.write_with_format(row as u32, 0, *label, &bold)?;
            summary.write(row as u32, 1, value)?;
        }

        let findings_sheet = workbook.add_worksheet();
        findings_sheet.set_name("Findings")?;
        write_header(findings_sheet, &["Row", "Column", "Value", "Check"], &bold)?;
        findings_sheet.set_column_width(1, 30)?;
        findings_sheet.set_column_width(2, 30)?;
        findings_sheet.set_column_width(3, 20)?;

        let findings = tagged_findings(report);
        for (index, (check, finding)) in findings.iter().enumerate() {
            let row = (index + 1) as u32;
            findings_sheet.write(row, 0, finding.row as f64)?;
            findings_sheet.write(row, 1, &finding.column)?;
            findings_sheet.write(row, 2, finding.value.as_deref().unwrap_or(""))?;
            findings_sheet.write(row, 3, check.label())?;
        }
        findings_sheet.set_freeze_panes(1, 0)?;
        findings_sheet.autofilter(0, 0, findings.len() as u32, 3)?;

        let mappings = workbook.add_worksheet();
        mappings.set_name("Mappings")?;
        write_header(mappings, &["Field", "Header", "Matched by", "List type"], &bold)?;
        let all_mappings = report.keys.mappings.iter().chain(report.lists.mappings.iter());
        for (index, mapping) in all_mappings.enumerate() {
            let row = (index + 1) as u32;
            mappings.write(row, 0, &mapping.field_path)?;
            mappings.write(row, 1, &mapping.header)?;
            mappings.write(row, 2, &mapping.matched_by)?;
            mappings.write(row, 3, mapping.list_type.as_deref().unwrap_or(""))?;
        }

        workbook.save(path)?;
        Ok(())
    }
}

fn write_header(sheet: &mut Worksheet, labels: &[&str], bold: &Format) -> Result<()> {
    for (col, label) in labels.iter().enumerate() {
        sheet.write_with_format(0, col as u16, *label, bold)?;
    }
    Ok(())
}

/// Blank import workbook for a format: one column per field path, key columns in bold,
/// and a `Fields` sheet describing every column.
pub fn export_schema_template(schema: &SchemaTable, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let plain = Format::new();

    let import = workbook.add_worksheet();
    import.set_name("Import")?;
    for (col, row) in schema.rows.iter().enumerate() {
        let field = row.field_path().trim();
        let format = if row.is_key() { &bold } else { &plain };
        import.write_with_format(0, col as u16, field, format)?;
        import.set_column_width(col as u16, (field.chars().count() + 4).max(12) as f64)?;
    }
    import.set_freeze_panes(1, 0)?;

    let fields = workbook.add_worksheet();
    fields.set_name("Fields")?;
    write_header(fields, &["Field", "Key", "Filter"], &bold)?;
    for (index, row) in schema.rows.iter().enumerate() {
        let line = (index + 1) as u32;
        fields.write(line, 0, row.field_path().trim())?;
        fields.write(line, 1, if row.is_key() { "Oui" } else { "Non" })?;
        fields.write(line, 2, row.filter_expression())?;
    }
    fields.set_column_width(0, 30)?;
    fields.set_column_width(2, 40)?;

    workbook.save(path)?;
    Ok(())
}
