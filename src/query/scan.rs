//! Filesystem fallback: match `*{dataset}*.{format}` in the output directory.
use super::spec::OutputFormat;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// True when `file_name` matches the glob `*{dataset}*.{extension}`.
pub fn matches_artifact_name(file_name: &str, dataset: &str, format: OutputFormat) -> bool {
    let suffix = format!(".{}", format.extension());
    file_name
        .strip_suffix(&suffix)
        .is_some_and(|stem| stem.contains(dataset))
}

/// Regular files directly inside `output_dir` that look like artifacts for
/// `dataset`, sorted by name. This is a heuristic: it cannot tell files from
/// this run apart from leftovers of an earlier run in the same directory.
pub fn scan_output_dir(
    output_dir: &Path,
    dataset: &str,
    format: OutputFormat,
) -> Result<Vec<String>> {
    if !output_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut matches = Vec::new();
    let entries =
        fs::read_dir(output_dir).with_context(|| format!("read {}", output_dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", output_dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if matches_artifact_name(name, dataset, format) {
            matches.push(path.display().to_string());
        }
    }
    matches.sort();
    tracing::info!(
        output_dir = %output_dir.display(),
        count = matches.len(),
        "output files found via directory scan"
    );
    Ok(matches)
}
