//! Excel workbook renderer (SpreadsheetML).
//!
//! One summary sheet plus one sheet per dataset result carrying the
//! pathway table; fold changes get their own sheet when present. The
//! XML dialect opens in Excel and LibreOffice without further tooling.

use gsa_common::models::AnalysisResult;
use gsa_common::Result;

/// Sheet names are limited by Excel
const MAX_SHEET_NAME: usize = 31;

/// Render the workbook for a completed analysis
pub fn render(job_id: &str, result: &AnalysisResult) -> Result<Vec<u8>> {
    let mut xml = String::from(
        "<?xml version=\"1.0\"?>\n\
         <?mso-application progid=\"Excel.Sheet\"?>\n\
         <Workbook xmlns=\"urn:schemas-microsoft-com:office:spreadsheet\"\n \
         xmlns:ss=\"urn:schemas-microsoft-com:office:spreadsheet\">\n",
    );

    write_summary_sheet(&mut xml, job_id, result);
    for dataset in &result.results {
        write_table_sheet(&mut xml, &dataset.name, &dataset.pathways);
        if let Some(fold_changes) = &dataset.fold_changes {
            write_table_sheet(&mut xml, &format!("{} fold changes", dataset.name), fold_changes);
        }
    }

    xml.push_str("</Workbook>\n");
    Ok(xml.into_bytes())
}

fn write_summary_sheet(xml: &mut String, job_id: &str, result: &AnalysisResult) {
    open_sheet(xml, "Summary");
    write_row(xml, &["Analysis", job_id]);
    write_row(xml, &["Method", &result.method_name]);
    write_row(xml, &["Pathway database release", &result.release]);
    write_row(xml, &["Datasets", &result.results.len().to_string()]);
    write_row(xml, &["Mapped identifiers", &result.mappings.len().to_string()]);
    close_sheet(xml);
}

fn write_table_sheet(xml: &mut String, name: &str, table: &str) {
    open_sheet(xml, name);
    for line in table.lines() {
        let cells: Vec<&str> = line.split('\t').collect();
        write_row(xml, &cells);
    }
    close_sheet(xml);
}

fn open_sheet(xml: &mut String, name: &str) {
    xml.push_str(&format!(
        " <Worksheet ss:Name=\"{}\">\n  <Table>\n",
        escape(&sheet_name(name))
    ));
}

fn close_sheet(xml: &mut String) {
    xml.push_str("  </Table>\n </Worksheet>\n");
}

fn write_row(xml: &mut String, cells: &[&str]) {
    xml.push_str("   <Row>\n");
    for cell in cells {
        let (cell_type, value) = match cell.parse::<f64>() {
            Ok(_) if !cell.is_empty() => ("Number", cell.to_string()),
            _ => ("String", cell.to_string()),
        };
        xml.push_str(&format!(
            "    <Cell><Data ss:Type=\"{}\">{}</Data></Cell>\n",
            cell_type,
            escape(&value)
        ));
    }
    xml.push_str("   </Row>\n");
}

/// Excel forbids some characters in sheet names and caps their length
fn sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => ' ',
            other => other,
        })
        .collect();
    cleaned.chars().take(MAX_SHEET_NAME).collect()
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
