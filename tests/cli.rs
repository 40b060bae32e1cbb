#![cfg(unix)]
//! End-to-end runs of the `cryo-query` binary against a scripted fake cryo.

use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const DATASETS_HELP: &str = "cryo datasets
- balances
- blocks
- blocks_and_transactions: blocks, transactions
- logs (alias: events)
- transactions (alias: txs)
dataset group names
- state_diffs: balance_diffs, code_diffs";

const BLOCKS_HELP: &str = "schema for blocks
- number: int
- hash: binary
sorting
- number";

/// A fake cryo that answers `help` from fixed text, records download argv to
/// `argv.txt`, and otherwise behaves according to `download_body`.
struct FakeCryo {
    root: TempDir,
}

impl FakeCryo {
    fn new(download_body: &str) -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        let script = format!(
            r#"if [ "$1" = "help" ]; then
  if [ "$2" = "datasets" ]; then cat <<'EOF'
{DATASETS_HELP}
EOF
  else cat <<'EOF'
{BLOCKS_HELP}
EOF
  fi
  exit 0
fi
printf '%s\n' "$@" > '{argv}'
out=''
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
{download_body}
"#,
            argv = root.path().join("argv.txt").display(),
        );
        fs::write(root.path().join("cryo.sh"), script).expect("write fake cryo");
        Self { root }
    }

    fn data_dir(&self) -> PathBuf {
        self.root.path().join("data")
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_cryo-query"));
        cmd.arg("--cryo-path")
            .arg(format!("sh {}", self.root.path().join("cryo.sh").display()))
            .arg("--data-dir")
            .arg(self.data_dir())
            .arg("--rpc-url")
            .arg("http://127.0.0.1:9")
            .args(args)
            .env_remove("ETH_RPC_URL")
            .env_remove("CRYO_DATA_DIR")
            .env_remove("CRYO_PATH")
            .env("CRYO_QUERY_LOG", "warn");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.command(args).output().expect("run cryo-query")
    }

    fn recorded_argv(&self) -> Vec<String> {
        fs::read_to_string(self.root.path().join("argv.txt"))
            .expect("read argv")
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout is not JSON ({err}): {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

fn flag_value<'a>(argv: &'a [String], flag: &str) -> Option<&'a str> {
    argv.iter()
        .position(|arg| arg == flag)
        .and_then(|idx| argv.get(idx + 1))
        .map(String::as_str)
}

#[test]
fn download_resolves_files_from_report() {
    let cryo = FakeCryo::new(
        r#"mkdir -p "$out/.cryo/reports"
touch "$out/stale__transactions.csv"
printf '{"results":{"completed_paths":["tx_100_106.csv"]}}' > "$out/.cryo/reports/run.json""#,
    );
    let output = cryo.run(&[
        "download",
        "--dataset",
        "transactions",
        "--start-block",
        "100",
        "--end-block",
        "105",
        "--format",
        "csv",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        stdout_json(&output),
        json!({"files": ["tx_100_106.csv"], "count": 1, "format": "csv", "source": "report"})
    );

    let argv = cryo.recorded_argv();
    assert_eq!(argv[0], "transactions");
    assert_eq!(flag_value(&argv, "-r"), Some("http://127.0.0.1:9"));
    assert_eq!(flag_value(&argv, "-b"), Some("100:106"));
    assert!(argv.iter().any(|arg| arg == "--csv"));
    assert!(!argv.iter().any(|arg| arg == "--json"));
    let out_dir = Path::new(flag_value(&argv, "-o").expect("output dir"));
    assert!(out_dir.starts_with(cryo.data_dir().join("runs")));
}

#[test]
fn balances_filter_and_sql_reach_cryo() {
    let cryo = FakeCryo::new(r#"touch "$out/ethereum__balances__1.json""#);
    let output = cryo.run(&[
        "download",
        "--dataset",
        "balances",
        "--blocks",
        "18000000:18000005",
        "--contract",
        "0xabc",
        "--format",
        "json",
        "--sql-query",
        "SELECT * FROM balances WHERE balance > 0",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let result = stdout_json(&output);
    assert_eq!(result["count"], json!(1));
    assert_eq!(result["source"], json!("glob"));
    assert_eq!(result["format"], json!("json"));

    let argv = cryo.recorded_argv();
    assert_eq!(flag_value(&argv, "-b"), Some("18000000:18000005"));
    assert_eq!(flag_value(&argv, "--address"), Some("0xabc"));
    assert!(!argv.iter().any(|arg| arg == "--contract"));
    assert_eq!(
        flag_value(&argv, "--sql-query"),
        Some("SELECT * FROM balances WHERE balance > 0")
    );
}

#[test]
fn failed_download_prints_structured_error() {
    let cryo = FakeCryo::new("echo 'invalid block range' >&2\nexit 1");
    let output = cryo.run(&["download", "--dataset", "logs", "--start-block", "7"]);
    assert_eq!(output.status.code(), Some(1));

    let result = stdout_json(&output);
    assert_eq!(result["kind"], json!("process_failed"));
    assert_eq!(result["error"], json!("invalid block range\n"));
    assert_eq!(result["stdout"], json!(""));
    let command = result["command"].as_str().expect("command string");
    assert!(command.contains("logs -r http://127.0.0.1:9 -b 7:17 --csv -o"));
}

#[test]
fn negative_blocks_are_left_for_cryo_to_reject() {
    let cryo = FakeCryo::new("echo 'negative block' >&2\nexit 1");
    let output = cryo.run(&[
        "download",
        "--dataset",
        "blocks",
        "--start-block",
        "-5",
        "--end-block",
        "-1",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout_json(&output)["kind"], json!("process_failed"));
    assert_eq!(flag_value(&cryo.recorded_argv(), "-b"), Some("-5:0"));
}

#[test]
fn empty_run_is_an_error_not_an_empty_success() {
    let cryo = FakeCryo::new("exit 0");
    let output = cryo.run(&["download", "--dataset", "blocks"]);
    assert_eq!(output.status.code(), Some(1));

    let result = stdout_json(&output);
    assert_eq!(result["kind"], json!("no_output"));
    assert_eq!(result["error"], json!("No output files generated"));
    assert!(result.get("files").is_none());
    assert_eq!(flag_value(&cryo.recorded_argv(), "-b"), Some("1000:1010"));
}

#[test]
fn discovery_subcommands_parse_help_text() {
    let cryo = FakeCryo::new("exit 0");

    let output = cryo.run(&["datasets"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        stdout_json(&output),
        json!(["balances", "blocks", "logs", "transactions"])
    );

    let output = cryo.run(&["schema", "blocks"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout_json(&output), json!(["number", "hash"]));
}

#[test]
fn unreachable_rpc_reports_null_block() {
    let cryo = FakeCryo::new("exit 0");
    let output = cryo.run(&["latest-block"]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output), Value::Null);
}

#[test]
fn serve_answers_each_request_line() {
    let cryo = FakeCryo::new(
        r#"mkdir -p "$out/.cryo/reports"
printf '{"results":{"completed_paths":["a.csv","b.csv"]}}' > "$out/.cryo/reports/r.json""#,
    );
    let mut child = cryo
        .command(&["serve"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn serve");
    {
        let mut stdin = child.stdin.take().expect("stdin");
        writeln!(stdin, r#"{{"id":1,"tool":"list_dataset_schema","arguments":{{"dataset":"blocks"}}}}"#).unwrap();
        writeln!(stdin, r#"{{"id":2,"tool":"download_dataset","arguments":{{"dataset":"logs","start_block":1,"end_block":2}}}}"#).unwrap();
        writeln!(stdin, r#"{{"id":3,"tool":"nope"}}"#).unwrap();
    }
    let output = child.wait_with_output().expect("wait for serve");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let responses: Vec<Value> = String::from_utf8(output.stdout)
        .expect("utf8 stdout")
        .lines()
        .map(|line| serde_json::from_str(line).expect("response JSON"))
        .collect();
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0], json!({"id": 1, "result": ["number", "hash"]}));
    assert_eq!(
        responses[1],
        json!({"id": 2, "result": {"files": ["a.csv", "b.csv"], "count": 2, "format": "csv", "source": "report"}})
    );
    assert_eq!(responses[2]["id"], json!(3));
    assert!(responses[2]["error"].is_string());
    assert_eq!(flag_value(&cryo.recorded_argv(), "-b"), Some("1:3"));
}
