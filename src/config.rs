//! Settings resolution for a single process lifetime.
//!
//! Every knob resolves with the same precedence: command-line flag, then
//! environment variable, then built-in default. The result is an immutable
//! [`Settings`] value that is passed by reference into every operation.
use crate::cli::GlobalArgs;
use crate::query::layout::OutputLayout;
use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_RPC_URL: &str = "https://mainnet.base.org";
pub const DEFAULT_CRYO_COMMAND: &str = "cryo";
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;
pub const RPC_TIMEOUT: Duration = Duration::from_secs(30);

pub const RPC_URL_ENV: &str = "ETH_RPC_URL";
pub const DATA_DIR_ENV: &str = "CRYO_DATA_DIR";
pub const CRYO_PATH_ENV: &str = "CRYO_PATH";
pub const TIMEOUT_ENV: &str = "CRYO_TIMEOUT_SECS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSource {
    Cli,
    Env,
    Default,
}

impl fmt::Display for SettingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SettingSource::Cli => "cli",
            SettingSource::Env => "env",
            SettingSource::Default => "default",
        };
        f.write_str(label)
    }
}

/// The external extraction tool, possibly behind a wrapper command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    /// Arguments that precede every invocation (wrapper arguments).
    pub prefix_args: Vec<String>,
}

impl ToolCommand {
    /// Split a configured command such as `nix run nixpkgs#cryo --`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut words =
            shell_words::split(raw).with_context(|| format!("parse cryo command: {raw}"))?;
        if words.is_empty() {
            return Err(anyhow!("cryo command is empty"));
        }
        let program = words.remove(0);
        Ok(Self {
            program,
            prefix_args: words,
        })
    }

    /// Resolve a bare program name on PATH so spawn errors name a real file.
    fn resolve_on_path(mut self) -> Self {
        if self.program.contains('/') {
            return self;
        }
        match which::which(&self.program) {
            Ok(path) => {
                tracing::debug!(
                    program = %self.program,
                    resolved = %path.display(),
                    "resolved cryo on PATH"
                );
                self.program = path.display().to_string();
            }
            Err(err) => {
                tracing::warn!(
                    program = %self.program,
                    %err,
                    "cryo not found on PATH; invocations will likely fail"
                );
            }
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub rpc_url: String,
    pub data_dir: PathBuf,
    pub cryo: ToolCommand,
    /// Upper bound on a single cryo invocation; `None` waits forever.
    pub timeout: Option<Duration>,
    pub output_layout: OutputLayout,
}

impl Settings {
    /// Resolve settings from CLI arguments and the process environment.
    pub fn resolve(args: &GlobalArgs) -> Result<Self> {
        let (rpc_url, source) = resolve_setting(
            args.rpc_url.clone(),
            env_value(RPC_URL_ENV),
            || DEFAULT_RPC_URL.to_string(),
        );
        tracing::info!(%source, rpc_url = %rpc_url, "using RPC URL");

        let (data_dir, source) = resolve_setting(
            args.data_dir.as_ref().map(|path| path.display().to_string()),
            env_value(DATA_DIR_ENV),
            || default_data_dir().display().to_string(),
        );
        tracing::info!(%source, data_dir = %data_dir, "using data directory");

        let (cryo_raw, source) = resolve_setting(
            args.cryo_path.clone(),
            env_value(CRYO_PATH_ENV),
            || DEFAULT_CRYO_COMMAND.to_string(),
        );
        tracing::info!(%source, cryo = %cryo_raw, "using cryo command");
        let cryo = ToolCommand::parse(&cryo_raw)?.resolve_on_path();

        let (timeout_raw, source) = resolve_setting(
            args.timeout_secs.map(|secs| secs.to_string()),
            env_value(TIMEOUT_ENV),
            || DEFAULT_TIMEOUT_SECS.to_string(),
        );
        let timeout = parse_timeout(&timeout_raw)
            .with_context(|| format!("invalid timeout from {source}: {timeout_raw}"))?;
        tracing::info!(
            %source,
            timeout_secs = timeout.map(|t| t.as_secs()),
            "using cryo timeout"
        );

        let output_layout = if args.shared_output {
            OutputLayout::Shared
        } else {
            OutputLayout::Isolated
        };

        Ok(Self {
            rpc_url,
            data_dir: PathBuf::from(data_dir),
            cryo,
            timeout,
            output_layout,
        })
    }

    pub fn ensure_data_dir(&self) -> Result<&Path> {
        fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("create data dir {}", self.data_dir.display()))?;
        Ok(&self.data_dir)
    }
}

/// Pick the first present value: explicit, environment, default.
pub fn resolve_setting(
    explicit: Option<String>,
    env: Option<String>,
    default: impl FnOnce() -> String,
) -> (String, SettingSource) {
    if let Some(value) = explicit.filter(|value| !value.trim().is_empty()) {
        return (value, SettingSource::Cli);
    }
    if let Some(value) = env.filter(|value| !value.trim().is_empty()) {
        return (value, SettingSource::Env);
    }
    (default(), SettingSource::Default)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cryo-mcp")
        .join("data")
}

fn parse_timeout(raw: &str) -> Result<Option<Duration>> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("parse timeout seconds {raw:?}"))?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}
