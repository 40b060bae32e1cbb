//! Query orchestration: build a cryo command, run it, resolve its artifacts.
//!
//! Every call is synchronous and self-contained. A failed run is reported as a
//! [`QueryFailure`] value carrying the exact command line, and artifact
//! resolution is only attempted after a clean exit.
pub mod command;
pub mod exec;
pub mod layout;
pub mod report;
pub mod resolve;
pub mod scan;
pub mod spec;

use crate::config::Settings;
use anyhow::Result;
use command::build_download_command;
use exec::{execute, ExecutionResult};
use layout::{prepare_run_dir, RunDir};
use resolve::{resolve_artifacts, ArtifactSet};
use serde::Serialize;
use spec::QuerySpec;

pub const NO_OUTPUT_ERROR: &str = "No output files generated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// cryo could not be started at all.
    SpawnFailed,
    /// cryo exited non-zero or was killed by a signal.
    ProcessFailed,
    TimedOut,
    /// cryo succeeded but neither the report nor the scan found files.
    NoOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryFailure {
    pub kind: FailureKind,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    pub command: String,
}

impl QueryFailure {
    fn from_execution(
        kind: FailureKind,
        error: String,
        result: ExecutionResult,
        command: String,
    ) -> Self {
        Self {
            kind,
            error,
            stdout: Some(result.stdout),
            stderr: Some(result.stderr),
            command,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryOutcome {
    Completed(ArtifactSet),
    Failed(QueryFailure),
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryOutcome::Completed(_))
    }
}

/// Run one dataset query end to end.
///
/// `Err` is reserved for local plumbing problems (the output directory cannot
/// be created or is locked by another run); everything cryo does is reported
/// through [`QueryOutcome`]. A failed run that left its per-run directory
/// empty removes it.
pub fn run_query(settings: &Settings, spec: &QuerySpec) -> Result<QueryOutcome> {
    let run_dir = prepare_run_dir(&settings.data_dir, settings.output_layout)?;
    let outcome = run_in_dir(settings, spec, &run_dir);
    if !outcome.is_success() {
        run_dir.discard_if_empty();
    }
    Ok(outcome)
}

fn run_in_dir(settings: &Settings, spec: &QuerySpec, run_dir: &RunDir) -> QueryOutcome {
    let invocation =
        build_download_command(&settings.cryo, &settings.rpc_url, spec, run_dir.path());
    let command_line = invocation.command_line();
    tracing::info!(
        command = %command_line,
        output_dir = %run_dir.path().display(),
        "running query command"
    );

    let result = match execute(&invocation, settings.timeout) {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "failed to start cryo");
            return QueryOutcome::Failed(QueryFailure {
                kind: FailureKind::SpawnFailed,
                error: format!("{err:#}"),
                stdout: None,
                stderr: None,
                command: command_line,
            });
        }
    };

    if result.timed_out {
        let secs = settings.timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
        let error = format!("cryo timed out after {secs}s");
        tracing::warn!(command = %command_line, "{error}");
        return QueryOutcome::Failed(QueryFailure::from_execution(
            FailureKind::TimedOut,
            error,
            result,
            command_line,
        ));
    }

    if !result.success() {
        tracing::warn!(
            command = %command_line,
            exit_code = result.exit_code,
            stderr = %crate::util::truncate_string(result.stderr.trim(), 2048),
            "cryo failed"
        );
        let error = result.stderr.clone();
        return QueryOutcome::Failed(QueryFailure::from_execution(
            FailureKind::ProcessFailed,
            error,
            result,
            command_line,
        ));
    }

    tracing::info!(duration_ms = result.duration_ms, "cryo finished");
    let output_dir = invocation.output_dir.as_deref().unwrap_or(run_dir.path());
    match resolve_artifacts(output_dir, &spec.dataset, spec.output_format) {
        Some(artifacts) => QueryOutcome::Completed(artifacts),
        None => QueryOutcome::Failed(QueryFailure {
            kind: FailureKind::NoOutput,
            error: NO_OUTPUT_ERROR.to_string(),
            stdout: None,
            stderr: None,
            command: command_line,
        }),
    }
}

#[cfg(all(test, unix))]
#[path = "query_tests.rs"]
mod tests;
