use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod discovery;
mod query;
mod rpc;
mod serve;
mod util;

use cli::{Command, RootArgs};
use config::{Settings, RPC_TIMEOUT};

const LOG_ENV: &str = "CRYO_QUERY_LOG";

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_tracing(args.global.verbose);

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "cryo-query failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

// Logs go to stderr; stdout carries only JSON results.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(args: RootArgs) -> Result<ExitCode> {
    let settings = Settings::resolve(&args.global)?;
    settings.ensure_data_dir()?;

    match args.command {
        Command::LatestBlock => {
            print_json(&rpc::latest_block_number(&settings.rpc_url, RPC_TIMEOUT))?;
        }
        Command::Datasets => {
            print_json(&discovery::list_datasets(&settings)?)?;
        }
        Command::Schema(schema) => {
            print_json(&discovery::list_dataset_schema(&settings, &schema.dataset)?)?;
        }
        Command::Download(download) => {
            let outcome = query::run_query(&settings, &download.into_spec())?;
            print_json(&outcome)?;
            if !outcome.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Serve => {
            let stdin = io::stdin();
            serve::serve(&settings, stdin.lock(), io::stdout().lock())?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize result")?;
    println!("{text}");
    Ok(())
}
