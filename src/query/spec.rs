//! Query parameters and block-range normalization.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Window used when only a start block is given.
pub const DEFAULT_BLOCK_WINDOW: i64 = 10;
/// Range used when the caller names no blocks at all.
pub const DEFAULT_BLOCK_RANGE: &str = "1000:1010";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
    Parquet,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Parquet => "parquet",
        }
    }

    /// File extension cryo uses for this format.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// Flag selecting this format; parquet is cryo's default and has none.
    pub fn cryo_flag(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Csv => Some("--csv"),
            OutputFormat::Json => Some("--json"),
            OutputFormat::Parquet => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dataset request as an agent phrases it.
///
/// `end_block` is inclusive. `blocks`, when present, is passed to cryo
/// verbatim and overrides `start_block`/`end_block`. Block numbers are signed
/// so that out-of-range requests reach cryo and fail there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub dataset: String,
    #[serde(default)]
    pub blocks: Option<String>,
    #[serde(default)]
    pub start_block: Option<i64>,
    #[serde(default)]
    pub end_block: Option<i64>,
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default, alias = "format")]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub sql_query: Option<String>,
}

impl QuerySpec {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            ..Self::default()
        }
    }

    /// Contract filter, ignoring blank strings.
    pub fn contract_filter(&self) -> Option<&str> {
        non_blank(self.contract.as_deref())
    }

    pub fn sql_filter(&self) -> Option<&str> {
        non_blank(self.sql_query.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

/// A block range in cryo's half-open `start:end` notation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRange(String);

impl BlockRange {
    /// Resolve the range for a query; first matching rule wins:
    /// explicit string, start+end, start only, fixed default.
    ///
    /// Nothing is validated here; cryo rejects malformed ranges itself.
    pub fn resolve(spec: &QuerySpec) -> Self {
        if let Some(blocks) = non_blank(spec.blocks.as_deref()) {
            return Self(blocks.to_string());
        }
        match (spec.start_block, spec.end_block) {
            (Some(start), Some(end)) => Self::half_open(start, end.saturating_add(1)),
            (Some(start), None) => {
                Self::half_open(start, start.saturating_add(DEFAULT_BLOCK_WINDOW))
            }
            (None, _) => Self(DEFAULT_BLOCK_RANGE.to_string()),
        }
    }

    fn half_open(start: i64, end_exclusive: i64) -> Self {
        Self(format!("{start}:{end_exclusive}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
