//! Child process execution with captured output and an optional deadline.
use super::command::CommandInvocation;
use anyhow::{anyhow, Context, Result};
use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

type OutputReader = JoinHandle<std::io::Result<Vec<u8>>>;

/// What one cryo run left behind on its streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Absent when the process was killed by a signal (including our timeout).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u128,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run an invocation to completion, killing it once `timeout` elapses.
///
/// A non-zero exit is returned as data. Only failures to spawn or wait on
/// the child are errors.
///
/// On unix the child leads its own process group, so a timeout also kills
/// anything a wrapper (`sh script`, `nix run ...`) started. Those processes
/// hold the output pipes and would otherwise keep the readers blocked.
pub fn execute(
    invocation: &CommandInvocation,
    timeout: Option<Duration>,
) -> Result<ExecutionResult> {
    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    command.process_group(0);
    let mut child = command
        .spawn()
        .with_context(|| format!("spawn {}", invocation.program))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let start = Instant::now();
    let (status, timed_out) = wait_with_deadline(&mut child, timeout)?;
    let duration_ms = start.elapsed().as_millis();

    let stdout = join_output(stdout).context("collect stdout")?;
    let stderr = join_output(stderr).context("collect stderr")?;

    tracing::debug!(
        program = %invocation.program,
        exit_code = status.code(),
        timed_out,
        duration_ms,
        stdout_bytes = stdout.len(),
        stderr_bytes = stderr.len(),
        "process finished"
    );

    Ok(ExecutionResult {
        exit_code: status.code(),
        stdout,
        stderr,
        timed_out,
        duration_ms,
    })
}

fn wait_with_deadline(child: &mut Child, timeout: Option<Duration>) -> Result<(ExitStatus, bool)> {
    let Some(timeout) = timeout else {
        let status = child.wait().context("wait for child")?;
        return Ok((status, false));
    };

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().context("check child status")? {
            return Ok((status, false));
        }
        if start.elapsed() >= timeout {
            tracing::warn!(timeout_secs = timeout.as_secs(), "child exceeded timeout; killing");
            kill_process_tree(child);
            let status = child.wait().context("reap timed-out child")?;
            return Ok((status, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn kill_process_tree(child: &mut Child) {
    match libc::pid_t::try_from(child.id()) {
        // SAFETY: killpg takes no pointers; the group id is our own child's pid.
        Ok(pgid) if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 => {}
        _ => {
            tracing::debug!(
                pid = child.id(),
                err = %std::io::Error::last_os_error(),
                "killpg failed; killing child only"
            );
            let _ = child.kill();
        }
    }
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) {
    let _ = child.kill();
}

// Pipes are drained on their own threads so a child that fills one pipe
// cannot block while we poll for exit.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<OutputReader> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn join_output(handle: Option<OutputReader>) -> Result<String> {
    let Some(handle) = handle else {
        return Ok(String::new());
    };
    let bytes = handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
        .context("read child output")?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
