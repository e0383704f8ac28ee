//! PDF summary renderer.
//!
//! A single-page document: analysis metadata followed by the top
//! pathways of every dataset. The file is assembled object by object
//! with a correct cross-reference table; output is deterministic so
//! re-renders are byte-identical.

use gsa_common::models::AnalysisResult;
use gsa_common::{GsaError, Result};

/// Top pathways listed per dataset
const TOP_PATHWAYS: usize = 10;

/// Lines that fit one A4 page at the chosen leading
const MAX_LINES: usize = 48;

/// Render the summary PDF for a completed analysis
pub fn render(job_id: &str, result: &AnalysisResult) -> Result<Vec<u8>> {
    let lines = summary_lines(job_id, result)?;
    Ok(build_document(&lines))
}

fn summary_lines(job_id: &str, result: &AnalysisResult) -> Result<Vec<String>> {
    let mut lines = vec![
        "Gene Set Analysis Report".to_string(),
        String::new(),
        format!("Analysis: {}", job_id),
        format!("Method: {}", result.method_name),
        format!("Pathway database release: {}", result.release),
        String::new(),
    ];

    let mut any_rows = false;
    for dataset in &result.results {
        lines.push(format!("Dataset: {}", dataset.name));

        for line in dataset.pathways.lines().skip(1).take(TOP_PATHWAYS) {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 5 {
                continue;
            }
            any_rows = true;
            lines.push(format!(
                "  {} {} ({}, FDR {})",
                fields[0], fields[1], fields[2], fields[3]
            ));
        }
        lines.push(String::new());
    }

    if !any_rows {
        return Err(GsaError::PartialReport(
            "the analysis result contains no pathway rows to lay out".to_string(),
        ));
    }

    lines.truncate(MAX_LINES);
    Ok(lines)
}

/// Characters with special meaning inside PDF string literals
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

fn build_document(lines: &[String]) -> Vec<u8> {
    let mut content = String::from("BT\n/F1 11 Tf\n14 TL\n50 780 Td\n");
    for line in lines {
        content.push_str(&format!("({}) Tj\nT*\n", escape(line)));
    }
    content.push_str("ET\n");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}endstream",
            content.len(),
            content
        ),
    ];

    let mut document = Vec::new();
    document.extend_from_slice(b"%PDF-1.4\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (index, object) in objects.iter().enumerate() {
        offsets.push(document.len());
        document.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", index + 1, object).as_bytes());
    }

    let xref_offset = document.len();
    document.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    document.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        document.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    document.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );

    document
}
