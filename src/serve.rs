//! Line-delimited JSON tool server.
//!
//! Each stdin line is one request:
//! `{"id": 7, "tool": "download_dataset", "arguments": {"dataset": "logs"}}`.
//! Each request gets exactly one stdout line, `{"id": 7, "result": ...}` or
//! `{"id": 7, "error": "..."}`. Requests run one at a time, in order.
use crate::config::{Settings, RPC_TIMEOUT};
use crate::discovery::{list_dataset_schema, list_datasets};
use crate::query::run_query;
use crate::query::spec::QuerySpec;
use crate::rpc::latest_block_number;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{BufRead, Write};

#[derive(Debug, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    GetLatestBlockNumber,
    ListDatasets,
    ListDatasetSchema { dataset: String },
    DownloadDataset(QuerySpec),
}

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    tool: String,
    #[serde(default)]
    arguments: Value,
}

impl Request {
    fn into_call(self) -> Result<(Value, ToolCall)> {
        let mut tagged = json!({ "tool": self.tool });
        // Clients send `{}` for tools without parameters; treat it as absent.
        let no_arguments = match &self.arguments {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if !no_arguments {
            tagged["arguments"] = self.arguments;
        }
        let call = serde_json::from_value(tagged)
            .with_context(|| format!("known tools: {}", TOOL_NAMES.join(", ")))?;
        Ok((self.id, call))
    }
}

pub const TOOL_NAMES: [&str; 4] = [
    "get_latest_block_number",
    "list_datasets",
    "list_dataset_schema",
    "download_dataset",
];

/// Dispatch one call. The result value has the same shape the matching CLI
/// subcommand prints.
pub fn dispatch(settings: &Settings, call: ToolCall) -> Result<Value> {
    tracing::debug!(?call, "dispatching tool call");
    let value = match call {
        ToolCall::GetLatestBlockNumber => {
            json!(latest_block_number(&settings.rpc_url, RPC_TIMEOUT))
        }
        ToolCall::ListDatasets => json!(list_datasets(settings)?),
        ToolCall::ListDatasetSchema { dataset } => json!(list_dataset_schema(settings, &dataset)?),
        ToolCall::DownloadDataset(spec) => {
            serde_json::to_value(run_query(settings, &spec)?).context("serialize query outcome")?
        }
    };
    Ok(value)
}

/// Handle one request line; `None` for blank lines.
pub fn handle_line(settings: &Settings, line: &str) -> Option<Value> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let parsed = serde_json::from_str::<Request>(line)
        .context("parse request JSON")
        .and_then(Request::into_call);
    let (id, call) = match parsed {
        Ok(parsed) => parsed,
        Err(err) => {
            let id = serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|value| value.get("id").cloned())
                .unwrap_or(Value::Null);
            tracing::warn!(error = %format!("{err:#}"), "rejecting malformed request");
            return Some(json!({ "id": id, "error": format!("invalid request: {err:#}") }));
        }
    };
    let response = match dispatch(settings, call) {
        Ok(result) => json!({ "id": id, "result": result }),
        Err(err) => json!({ "id": id, "error": format!("{err:#}") }),
    };
    Some(response)
}

pub fn serve<R: BufRead, W: Write>(settings: &Settings, input: R, mut output: W) -> Result<()> {
    tracing::info!(tools = %TOOL_NAMES.join(","), "serving tool calls on stdin");
    for line in input.lines() {
        let line = line.context("read request line")?;
        let Some(response) = handle_line(settings, &line) else {
            continue;
        };
        serde_json::to_writer(&mut output, &response).context("write response")?;
        output.write_all(b"\n").context("write response")?;
        output.flush().context("flush response")?;
    }
    tracing::info!("stdin closed; stopping");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolCommand;
    use crate::query::layout::OutputLayout;
    use crate::query::spec::OutputFormat;
    use std::time::Duration;

    fn settings(root: &std::path::Path) -> Settings {
        Settings {
            rpc_url: "http://127.0.0.1:9".to_string(),
            data_dir: root.to_path_buf(),
            cryo: ToolCommand {
                program: "sh".to_string(),
                prefix_args: vec!["-c".to_string(), "exit 0".to_string()],
            },
            timeout: Some(Duration::from_secs(10)),
            output_layout: OutputLayout::Isolated,
        }
    }

    fn call(line: &str) -> (Value, ToolCall) {
        serde_json::from_str::<Request>(line)
            .unwrap()
            .into_call()
            .unwrap()
    }

    #[test]
    fn parses_tool_calls() {
        let (id, parsed) = call(
            r#"{"id":3,"tool":"download_dataset","arguments":{"dataset":"logs","start_block":10,"output_format":"json"}}"#,
        );
        assert_eq!(id, json!(3));
        let ToolCall::DownloadDataset(spec) = parsed else {
            panic!("expected download_dataset");
        };
        assert_eq!(spec.dataset, "logs");
        assert_eq!(spec.start_block, Some(10));
        assert_eq!(spec.output_format, OutputFormat::Json);

        let (id, parsed) =
            call(r#"{"tool":"list_dataset_schema","arguments":{"dataset":"blocks"}}"#);
        assert_eq!(id, Value::Null);
        assert!(
            matches!(parsed, ToolCall::ListDatasetSchema { ref dataset } if dataset == "blocks")
        );

        let (_, parsed) = call(r#"{"tool":"list_datasets"}"#);
        assert!(matches!(parsed, ToolCall::ListDatasets));
    }

    #[test]
    fn empty_arguments_object_calls_parameterless_tools() {
        let (id, parsed) = call(r#"{"id":9,"tool":"list_datasets","arguments":{}}"#);
        assert_eq!(id, json!(9));
        assert!(matches!(parsed, ToolCall::ListDatasets));

        let (_, parsed) = call(r#"{"tool":"get_latest_block_number","arguments":{}}"#);
        assert!(matches!(parsed, ToolCall::GetLatestBlockNumber));
    }

    #[test]
    fn missing_arguments_are_rejected() {
        let request: Request = serde_json::from_str(r#"{"tool":"list_dataset_schema"}"#).unwrap();
        assert!(request.into_call().is_err());

        let request: Request =
            serde_json::from_str(r#"{"tool":"list_dataset_schema","arguments":{}}"#).unwrap();
        assert!(request.into_call().is_err());
    }

    #[test]
    fn negative_blocks_reach_the_query() {
        let (_, parsed) = call(
            r#"{"tool":"download_dataset","arguments":{"dataset":"logs","start_block":-5,"end_block":-1}}"#,
        );
        let ToolCall::DownloadDataset(spec) = parsed else {
            panic!("expected download_dataset");
        };
        assert_eq!(spec.start_block, Some(-5));
        assert_eq!(spec.end_block, Some(-1));
    }

    #[test]
    fn unknown_tool_is_an_error_response() {
        let tmp = tempfile::tempdir().unwrap();
        let response =
            handle_line(&settings(tmp.path()), r#"{"id":"a","tool":"drop_tables"}"#).unwrap();
        assert_eq!(response["id"], json!("a"));
        assert!(response["error"].as_str().unwrap().contains("known tools"));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(handle_line(&settings(tmp.path()), "   ").is_none());
    }

    #[test]
    fn serves_one_response_per_request() {
        let tmp = tempfile::tempdir().unwrap();
        let input = "{\"id\":1,\"tool\":\"download_dataset\",\"arguments\":{\"dataset\":\"logs\"}}\n\n{\"id\":2,\"tool\":\"list_datasets\"}\n";
        let mut out = Vec::new();
        serve(&settings(tmp.path()), input.as_bytes(), &mut out).unwrap();

        let lines: Vec<Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], json!(1));
        assert_eq!(lines[0]["result"]["kind"], json!("no_output"));
        assert_eq!(lines[1]["id"], json!(2));
        assert_eq!(lines[1]["result"], json!([]));
    }
}
