//! Translate queries into cryo's command-line contract.
use super::spec::{BlockRange, QuerySpec};
use crate::config::ToolCommand;
use crate::util::format_command_line;
use std::path::{Path, PathBuf};

/// Datasets whose address filter is spelled `--address` rather than `--contract`.
const ADDRESS_FLAG_DATASETS: &[&str] = &["balances"];

/// A fully built cryo invocation. Built once, executed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// Directory cryo writes artifacts into, if this invocation produces any.
    pub output_dir: Option<PathBuf>,
}

impl CommandInvocation {
    fn new(tool: &ToolCommand, args: Vec<String>, output_dir: Option<PathBuf>) -> Self {
        let mut full = tool.prefix_args.clone();
        full.extend(args);
        Self {
            program: tool.program.clone(),
            args: full,
            output_dir,
        }
    }

    pub fn command_line(&self) -> String {
        format_command_line(&self.program, &self.args)
    }
}

/// Flag used to filter a dataset by address.
pub fn address_flag(dataset: &str) -> &'static str {
    if ADDRESS_FLAG_DATASETS.contains(&dataset) {
        "--address"
    } else {
        "--contract"
    }
}

/// `<dataset> -r <rpc> -b <range> [filter] [format] [--sql-query q] -o <dir>`
pub fn build_download_command(
    tool: &ToolCommand,
    rpc_url: &str,
    spec: &QuerySpec,
    output_dir: &Path,
) -> CommandInvocation {
    let range = BlockRange::resolve(spec);
    tracing::debug!(dataset = %spec.dataset, range = %range, "resolved block range");

    let mut args = vec![
        spec.dataset.clone(),
        "-r".to_string(),
        rpc_url.to_string(),
        "-b".to_string(),
        range.as_str().to_string(),
    ];
    if let Some(contract) = spec.contract_filter() {
        args.push(address_flag(&spec.dataset).to_string());
        args.push(contract.to_string());
    }
    if let Some(flag) = spec.output_format.cryo_flag() {
        args.push(flag.to_string());
    }
    if let Some(sql) = spec.sql_filter() {
        args.push("--sql-query".to_string());
        args.push(sql.to_string());
    }
    args.push("-o".to_string());
    args.push(output_dir.display().to_string());

    CommandInvocation::new(tool, args, Some(output_dir.to_path_buf()))
}

/// `help datasets -r <rpc>`
pub fn build_datasets_help_command(tool: &ToolCommand, rpc_url: &str) -> CommandInvocation {
    let args = vec![
        "help".to_string(),
        "datasets".to_string(),
        "-r".to_string(),
        rpc_url.to_string(),
    ];
    CommandInvocation::new(tool, args, None)
}

/// `help <dataset>`
pub fn build_schema_help_command(tool: &ToolCommand, dataset: &str) -> CommandInvocation {
    let args = vec!["help".to_string(), dataset.to_string()];
    CommandInvocation::new(tool, args, None)
}
