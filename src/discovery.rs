//! Dataset and schema discovery from cryo's help output.
//!
//! cryo's help text is meant for humans and is not a stable contract. Both
//! listings are read with a small line-oriented state machine keyed to fixed
//! marker lines; anything unexpected is skipped. When a marker moves or
//! disappears the parsers return an empty or partial list and log a drift
//! warning rather than guessing.
use crate::config::Settings;
use crate::query::command::{
    build_datasets_help_command, build_schema_help_command, CommandInvocation,
};
use crate::query::exec::execute;
use anyhow::{anyhow, Result};

const ITEM_PREFIX: &str = "- ";
const COMBINED_GROUP_PREFIX: &str = "- blocks_and_transactions:";
const DATASETS_END: &str = "dataset group names";
const ALIAS_MARKER: &str = " (alias";
const SCHEMA_START: &str = "schema for";
const SCHEMA_END_PREFIXES: [&str; 2] = ["sorting", "other"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Before the entry marker of a section.
    SeekingSection,
    /// Inside a section; item lines contribute names.
    Collecting,
    /// Past the terminal marker; nothing further is read.
    Done,
}

/// Names collected from help text plus the state the scan ended in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub names: Vec<String>,
    pub final_state: ScanState,
    /// Whether the collecting section was ever entered.
    pub saw_section: bool,
}

impl Listing {
    /// A listing that never found its section, or found nothing in it,
    /// usually means the upstream help format changed.
    pub fn looks_drifted(&self) -> bool {
        !self.saw_section || self.names.is_empty()
    }
}

/// Dataset names from `cryo help datasets`.
///
/// Entry: start of text. Item: `- name (alias: ...)` except the combined
/// `blocks_and_transactions` group. Exit: the line `dataset group names`.
pub fn parse_datasets(help_text: &str) -> Listing {
    let mut state = ScanState::Collecting;
    let mut names = Vec::new();
    for line in help_text.lines() {
        if state == ScanState::Done {
            break;
        }
        if line == DATASETS_END {
            state = ScanState::Done;
            continue;
        }
        if line.starts_with(COMBINED_GROUP_PREFIX) {
            continue;
        }
        if let Some(rest) = line.strip_prefix(ITEM_PREFIX) {
            push_name(&mut names, rest.split(ALIAS_MARKER).next());
        }
    }
    Listing {
        names,
        final_state: state,
        saw_section: true,
    }
}

/// Field names from `cryo help <dataset>`.
///
/// Entry: a line starting with `schema for`. Item: `- name: type`. Exit: a
/// line starting with `sorting` or `other`, which returns to seeking so a
/// later `schema for` section is collected too.
pub fn parse_schema(help_text: &str) -> Listing {
    let mut state = ScanState::SeekingSection;
    let mut saw_section = false;
    let mut names = Vec::new();
    for line in help_text.lines() {
        if line.starts_with(SCHEMA_START) {
            state = ScanState::Collecting;
            saw_section = true;
            continue;
        }
        if SCHEMA_END_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
            state = ScanState::SeekingSection;
            continue;
        }
        if state != ScanState::Collecting {
            continue;
        }
        if let Some(rest) = line.strip_prefix(ITEM_PREFIX) {
            push_name(&mut names, rest.split(':').next());
        }
    }
    Listing {
        names,
        final_state: state,
        saw_section,
    }
}

fn push_name(names: &mut Vec<String>, raw: Option<&str>) {
    if let Some(name) = raw.map(str::trim).filter(|name| !name.is_empty()) {
        names.push(name.to_string());
    }
}

/// Run `cryo help datasets` and list the dataset names.
pub fn list_datasets(settings: &Settings) -> Result<Vec<String>> {
    let invocation = build_datasets_help_command(&settings.cryo, &settings.rpc_url);
    let stdout = run_help(&invocation, settings)?;
    let listing = parse_datasets(&stdout);
    warn_on_drift("datasets", &listing);
    Ok(listing.names)
}

/// Run `cryo help <dataset>` and list the schema field names.
pub fn list_dataset_schema(settings: &Settings, dataset: &str) -> Result<Vec<String>> {
    let invocation = build_schema_help_command(&settings.cryo, dataset);
    let stdout = run_help(&invocation, settings)?;
    let listing = parse_schema(&stdout);
    warn_on_drift(dataset, &listing);
    Ok(listing.names)
}

fn run_help(invocation: &CommandInvocation, settings: &Settings) -> Result<String> {
    let command_line = invocation.command_line();
    tracing::info!(command = %command_line, "running help command");
    let result = execute(invocation, settings.timeout)?;
    if result.timed_out {
        return Err(anyhow!("{command_line} timed out"));
    }
    if !result.success() {
        tracing::warn!(
            command = %command_line,
            exit_code = result.exit_code,
            stderr = %result.stderr.trim(),
            "help command failed; parsing stdout anyway"
        );
    }
    Ok(result.stdout)
}

fn warn_on_drift(subject: &str, listing: &Listing) {
    if listing.looks_drifted() {
        tracing::warn!(
            subject,
            saw_section = listing.saw_section,
            state = ?listing.final_state,
            items = listing.names.len(),
            "help output did not match the expected layout"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATASETS_HELP: &str = "\
cryo datasets
─────────────
- address_appearances
- balance_diffs
- balances
- blocks
- blocks_and_transactions: blocks, transactions
- logs (alias: events)
- transactions (alias = txs)

dataset group names
───────────────────
- blocks_and_transactions: blocks, transactions
- state_diffs: balance_diffs, code_diffs
";

    const LOGS_HELP: &str = "\
cryo help logs

schema for logs
───────────────
- block_number: uint32
- transaction_index: uint32
- address: binary
- topic0: binary

sorting logs:
- block_number
- log_index

other available columns:
- chain_id: uint64
";

    #[test]
    fn strips_alias_annotations() {
        let listing = parse_datasets("- logs (alias: log)\n");
        assert_eq!(listing.names, vec!["logs"]);
    }

    #[test]
    fn datasets_stop_at_group_names() {
        let listing = parse_datasets(DATASETS_HELP);
        assert_eq!(
            listing.names,
            vec![
                "address_appearances",
                "balance_diffs",
                "balances",
                "blocks",
                "logs",
                "transactions"
            ]
        );
        assert_eq!(listing.final_state, ScanState::Done);
        assert!(!listing.names.iter().any(|name| name == "state_diffs"));
    }

    #[test]
    fn datasets_tolerate_noise() {
        let listing = parse_datasets("garbage\n-not-an-item\n- \n  - indented\n- traces\n");
        assert_eq!(listing.names, vec!["traces"]);
        assert_eq!(listing.final_state, ScanState::Collecting);
    }

    #[test]
    fn schema_minimal_section() {
        let listing = parse_schema("schema for blocks\n- number: int\nsorting\n");
        assert_eq!(listing.names, vec!["number"]);
        assert_eq!(listing.final_state, ScanState::SeekingSection);
    }

    #[test]
    fn schema_ignores_sorting_and_other_columns() {
        let listing = parse_schema(LOGS_HELP);
        assert_eq!(
            listing.names,
            vec!["block_number", "transaction_index", "address", "topic0"]
        );
        assert!(!listing.looks_drifted());
    }

    #[test]
    fn schema_without_marker_is_empty_and_drifted() {
        let listing = parse_schema("- number: int\n- hash: binary\n");
        assert!(listing.names.is_empty());
        assert!(!listing.saw_section);
        assert!(listing.looks_drifted());
    }

    #[test]
    fn schema_collects_every_section() {
        let text = "schema for blocks\n- number: u32\nsorting blocks:\n- number\nschema for transactions\n- hash: binary\nother available columns:\n- x: u8\n";
        assert_eq!(parse_schema(text).names, vec!["number", "hash"]);
    }
}
