//! Report artifact renderers.
//!
//! Renderers are pure functions from an analysis result to bytes; the
//! generator writes the bytes under the artifact key, so re-rendering the
//! same result is idempotent by construction.

pub mod pdf;
pub mod spreadsheet;

use gsa_common::models::{AnalysisResult, ArtifactKind};
use gsa_common::Result;

/// Render one artifact kind for a completed analysis
pub fn render(kind: ArtifactKind, job_id: &str, result: &AnalysisResult) -> Result<Vec<u8>> {
    match kind {
        ArtifactKind::Spreadsheet => spreadsheet::render(job_id, result),
        ArtifactKind::Pdf => pdf::render(job_id, result),
    }
}
