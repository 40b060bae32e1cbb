//! CLI argument parsing for cryo-query.
//!
//! The CLI is a thin shell over the query and discovery operations; every
//! subcommand prints its structured result as JSON on stdout.
use crate::query::spec::{OutputFormat, QuerySpec};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "cryo-query",
    version,
    about = "Agent-callable blockchain dataset queries backed by cryo",
    after_help = "Examples:\n  cryo-query latest-block\n  cryo-query datasets\n  cryo-query schema logs\n  cryo-query download --dataset transactions --start-block 100 --end-block 105\n  cryo-query download --dataset balances --contract 0xabc... --format json\n  cryo-query serve < requests.jsonl",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings shared by every subcommand. Unset flags fall back to the
/// environment, then to built-in defaults.
#[derive(Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Ethereum JSON-RPC URL (env: ETH_RPC_URL)
    #[arg(long, value_name = "URL", global = true)]
    pub rpc_url: Option<String>,

    /// Directory that receives cryo output (env: CRYO_DATA_DIR)
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// cryo executable, optionally with wrapper arguments (env: CRYO_PATH)
    #[arg(long, value_name = "CMD", global = true)]
    pub cryo_path: Option<String>,

    /// Kill cryo after this many seconds; 0 waits forever (env: CRYO_TIMEOUT_SECS)
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout_secs: Option<u64>,

    /// Write directly into the data dir (guarded by a lock) instead of a per-run subdirectory
    #[arg(long, global = true)]
    pub shared_output: bool,

    /// Emit debug logs on stderr
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the latest block number reported by the RPC node
    LatestBlock,
    /// List datasets cryo can extract
    Datasets,
    /// List schema fields of one dataset
    Schema(SchemaArgs),
    /// Run cryo for a dataset and report the files it produced
    Download(DownloadArgs),
    /// Serve tool calls as line-delimited JSON on stdin/stdout
    Serve,
}

#[derive(Parser, Debug)]
pub struct SchemaArgs {
    /// Dataset name, e.g. logs or transactions
    #[arg(value_name = "DATASET")]
    pub dataset: String,
}

#[derive(Parser, Debug)]
pub struct DownloadArgs {
    /// Dataset name, e.g. logs or transactions
    #[arg(long)]
    pub dataset: String,

    /// Raw cryo block range (wins over --start-block/--end-block)
    #[arg(long, value_name = "RANGE")]
    pub blocks: Option<String>,

    /// First block to extract
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub start_block: Option<i64>,

    /// Last block to extract (inclusive)
    #[arg(long, value_name = "N", requires = "start_block", allow_negative_numbers = true)]
    pub end_block: Option<i64>,

    /// Contract (or, for balances, account) address filter
    #[arg(long, value_name = "ADDRESS")]
    pub contract: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// SQL filter passed through to cryo
    #[arg(long, value_name = "SQL")]
    pub sql_query: Option<String>,
}

impl DownloadArgs {
    pub fn into_spec(self) -> QuerySpec {
        QuerySpec {
            blocks: self.blocks,
            start_block: self.start_block,
            end_block: self.end_block,
            contract: self.contract,
            output_format: self.format,
            sql_query: self.sql_query,
            ..QuerySpec::new(self.dataset)
        }
    }
}
