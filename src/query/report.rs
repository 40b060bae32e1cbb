//! Reader for the run reports cryo leaves under `.cryo/reports/`.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Report directory relative to an output directory, per cryo's convention.
pub const REPORTS_REL: [&str; 2] = [".cryo", "reports"];

#[derive(Debug, Default, Deserialize)]
pub struct ReportRecord {
    #[serde(default)]
    pub results: Option<ReportResults>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportResults {
    #[serde(default)]
    pub completed_paths: Vec<String>,
}

impl ReportRecord {
    pub fn completed_paths(&self) -> &[String] {
        self.results
            .as_ref()
            .map(|results| results.completed_paths.as_slice())
            .unwrap_or_default()
    }
}

pub fn reports_dir(output_dir: &Path) -> PathBuf {
    REPORTS_REL
        .iter()
        .fold(output_dir.to_path_buf(), |path, part| path.join(part))
}

/// Newest `*.json` report by modification time; ties go to the greater name.
pub fn latest_report_path(output_dir: &Path) -> Result<Option<PathBuf>> {
    let dir = reports_dir(output_dir);
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") || !path.is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .with_context(|| format!("stat {}", path.display()))?;
        let candidate = (modified, path);
        match &newest {
            Some(current) if *current >= candidate => {}
            _ => newest = Some(candidate),
        }
    }
    Ok(newest.map(|(_, path)| path))
}

pub fn load_report(path: &Path) -> Result<ReportRecord> {
    let bytes = fs::read(path).with_context(|| format!("read report {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse report {}", path.display()))
}

/// Completed paths from the authoritative report, if it lists any.
///
/// A missing, unreadable or malformed report yields `None` so the caller can
/// fall back to scanning the directory.
pub fn completed_paths_from_report(output_dir: &Path) -> Option<Vec<String>> {
    let path = match latest_report_path(output_dir) {
        Ok(Some(path)) => path,
        Ok(None) => {
            tracing::debug!(output_dir = %output_dir.display(), "no cryo report found");
            return None;
        }
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "failed to list cryo reports");
            return None;
        }
    };
    let record = match load_report(&path) {
        Ok(record) => record,
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "ignoring unreadable cryo report");
            return None;
        }
    };
    let completed = record.completed_paths();
    if completed.is_empty() {
        tracing::info!(report = %path.display(), "cryo report lists no completed paths");
        return None;
    }
    tracing::info!(
        report = %path.display(),
        count = completed.len(),
        "found files in cryo report"
    );
    Some(completed.to_vec())
}
