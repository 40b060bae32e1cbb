//! Decide which files a cryo run produced.
//!
//! The run report is precise: it names exactly what this run wrote. The
//! directory scan is a heuristic kept for cryo versions and failure modes that
//! write no report. The report is always consulted first, and the tier that
//! answered travels with the result.
use super::report::completed_paths_from_report;
use super::scan::scan_output_dir;
use super::spec::OutputFormat;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    Report,
    Glob,
}

impl ResolutionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionTier::Report => "report",
            ResolutionTier::Glob => "glob",
        }
    }
}

/// Files produced by one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSet {
    pub files: Vec<String>,
    pub count: usize,
    pub format: OutputFormat,
    pub source: ResolutionTier,
}

impl ArtifactSet {
    fn new(files: Vec<String>, format: OutputFormat, source: ResolutionTier) -> Self {
        Self {
            count: files.len(),
            files,
            format,
            source,
        }
    }
}

/// Report tier first, directory scan second. `None` means neither tier
/// found anything, which callers must treat as a failure.
pub fn resolve_artifacts(
    output_dir: &Path,
    dataset: &str,
    format: OutputFormat,
) -> Option<ArtifactSet> {
    if let Some(files) = completed_paths_from_report(output_dir) {
        tracing::info!(
            tier = ResolutionTier::Report.as_str(),
            count = files.len(),
            "resolved artifacts"
        );
        return Some(ArtifactSet::new(files, format, ResolutionTier::Report));
    }

    let files = scan_output_dir(output_dir, dataset, format).unwrap_or_else(|err| {
        tracing::warn!(error = %format!("{err:#}"), "directory scan failed");
        Vec::new()
    });
    if files.is_empty() {
        tracing::warn!(
            output_dir = %output_dir.display(),
            dataset,
            "no artifacts found by report or scan"
        );
        return None;
    }
    tracing::info!(
        tier = ResolutionTier::Glob.as_str(),
        count = files.len(),
        "resolved artifacts"
    );
    Some(ArtifactSet::new(files, format, ResolutionTier::Glob))
}
