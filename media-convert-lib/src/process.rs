//! External process runner
//!
//! Spawns a conversion tool with stdout and stderr sharing one pipe, so the
//! captured lines keep the order the tool wrote them in. The pipe is drained
//! on a blocking thread while a separate path waits for the exit status.
//!
//! Draining must run concurrently with the wait: a tool that fills the pipe
//! buffer blocks on its next write, and would never exit if nobody reads.
//! The payload is always a file on disk; captured output is diagnostics only.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, PipeReader};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ConversionError, Result};

/// Default number of trailing output lines kept for diagnostics
pub const DEFAULT_TAIL_LINES: usize = 20;

/// How long to keep reading after exit, in case a grandchild still holds the pipe
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// A command line to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    pub command: String,
    pub arguments: Vec<String>,
    pub working_directory: Option<PathBuf>,
}

impl ProcessInvocation {
    pub fn new(command: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            command: command.into(),
            arguments,
            working_directory: None,
        }
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Shell-like rendering for logs
    pub fn display(&self) -> String {
        let mut s = self.command.clone();
        for arg in &self.arguments {
            s.push(' ');
            s.push_str(arg);
        }
        s
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    /// Last lines of the merged stdout/stderr stream, in write order
    pub combined_output: Vec<String>,
}

/// Runs external tools with bounded output capture
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    tail_lines: usize,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_LINES)
    }
}

impl ProcessRunner {
    pub fn new(tail_lines: usize) -> Self {
        Self {
            tail_lines: tail_lines.max(1),
        }
    }

    /// Run `invocation` to completion.
    ///
    /// - spawn failure (missing executable, permissions) → `Resource`
    /// - non-zero exit → `ExternalTool` with the output tail
    /// - `cancel` fired → the tool and everything it forked are killed and
    ///   `Cancelled` is returned
    ///
    /// The child is spawned with `kill_on_drop`, so dropping this future also
    /// terminates it.
    pub async fn run(
        &self,
        invocation: &ProcessInvocation,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput> {
        if cancel.is_cancelled() {
            return Err(ConversionError::Cancelled);
        }

        let (reader, writer) = std::io::pipe()
            .map_err(|e| ConversionError::resource("failed to create output pipe", e))?;
        let stderr_writer = writer
            .try_clone()
            .map_err(|e| ConversionError::resource("failed to create output pipe", e))?;

        let mut cmd = Command::new(&invocation.command);
        cmd.args(&invocation.arguments)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer)
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &invocation.working_directory {
            cmd.current_dir(dir);
        }

        tracing::debug!(command = %invocation.display(), "spawning external tool");
        let started = Instant::now();

        let spawned = cmd.spawn();
        // Our copies of the write end must close or the drain never sees EOF
        drop(cmd);
        let mut child = spawned.map_err(|e| {
            ConversionError::resource(format!("failed to start {}", invocation.command), e)
        })?;

        // Leader of its own group; `id()` goes away once the child is reaped
        let group = child.id();
        let tool = tool_name(&invocation.command);
        let keep = self.tail_lines;
        let drain_tool = tool.clone();
        let mut drain = tokio::task::spawn_blocking(move || drain_tail(reader, keep, &drain_tool));

        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                kill_tree(&mut child, group, &tool).await;
                tracing::info!(tool = %tool, elapsed_ms = started.elapsed().as_millis() as u64, "external tool cancelled");
                return Err(ConversionError::Cancelled);
            }
        };

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                kill_tree(&mut child, group, &tool).await;
                return Err(ConversionError::resource(
                    format!("failed to wait for {}", invocation.command),
                    e,
                ));
            }
        };

        // Rejoin the drain before deciding the outcome
        let tail = rejoin_drain(&mut drain, group, &tool).await;
        let elapsed = started.elapsed();

        // Killed by a signal has no exit code
        let exit_code = status.code().unwrap_or(-1);
        tracing::info!(
            tool = %tool,
            exit_code,
            elapsed_ms = elapsed.as_millis() as u64,
            "external tool finished"
        );

        if exit_code != 0 {
            return Err(ConversionError::ExternalTool {
                tool,
                exit_code,
                last_output_lines: tail.into_iter().collect(),
            });
        }

        Ok(ProcessOutput {
            exit_code,
            combined_output: tail.into_iter().collect(),
        })
    }
}

/// Wait for the drain to hit EOF. A forked helper that outlives the tool
/// keeps the pipe open; after the grace period its group is killed.
async fn rejoin_drain(
    drain: &mut JoinHandle<VecDeque<String>>,
    group: Option<u32>,
    tool: &str,
) -> VecDeque<String> {
    if let Ok(joined) = tokio::time::timeout(DRAIN_GRACE, &mut *drain).await {
        return joined.unwrap_or_default();
    }
    tracing::warn!(tool = %tool, "output pipe still open after exit; killing leftover processes");
    kill_group(group);
    match tokio::time::timeout(DRAIN_GRACE, &mut *drain).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            tracing::warn!(tool = %tool, "abandoning output drain");
            VecDeque::new()
        }
    }
}

/// Kill the tool's process group, then the tool itself
async fn kill_tree(child: &mut Child, group: Option<u32>, tool: &str) {
    kill_group(group);
    if let Err(e) = child.kill().await {
        tracing::warn!(tool = %tool, error = %e, "failed to kill external tool");
    }
}

/// The tool leads its own process group, so helpers it forked
/// (`soffice` re-executing `soffice.bin`) go down with it.
#[cfg(unix)]
fn kill_group(group: Option<u32>) {
    if let Some(pid) = group {
        // SAFETY: killpg takes plain integers and touches no memory of ours
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            tracing::debug!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>) {}

/// Read the merged output line by line until EOF, keeping the last `keep`
/// non-blank lines. Invalid UTF-8 is replaced rather than aborting the drain.
fn drain_tail(reader: PipeReader, keep: usize, tool: &str) -> VecDeque<String> {
    let mut reader = BufReader::new(reader);
    let mut tail = VecDeque::with_capacity(keep);
    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                tracing::debug!(tool = %tool, "{}", line);
                if line.trim().is_empty() {
                    continue;
                }
                if tail.len() == keep {
                    tail.pop_front();
                }
                tail.push_back(line.to_string());
            }
            Err(e) => {
                tracing::debug!(tool = %tool, error = %e, "output pipe read failed");
                break;
            }
        }
    }
    tail
}

/// File name of the program, for logs and error messages
fn tool_name(command: &str) -> String {
    std::path::Path::new(command)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| command.to_string())
}
