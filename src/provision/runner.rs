// src/provision/runner.rs

//! Pluggable runner for the external tools used while provisioning.
//!
//! The provisioner never calls `tokio::process` directly; it goes through a
//! `ToolRunner`. Production code uses [`RealToolRunner`]; tests can swap in a
//! fake that, for example, writes fixture files instead of running `git`.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Number of trailing stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// One external command to run to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How a tool run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Last lines written to stderr, newline-joined.
    pub stderr_tail: String,
}

impl ToolOutput {
    /// Short human description of a failed run.
    pub fn failure_reason(&self, invocation: &ToolInvocation) -> String {
        let status = match self.exit_code {
            Some(code) => format!("exited with status {code}"),
            None => "was terminated by a signal".to_string(),
        };
        if self.stderr_tail.trim().is_empty() {
            format!("`{}` {}", invocation.program, status)
        } else {
            format!(
                "`{}` {}: {}",
                invocation.program,
                status,
                self.stderr_tail.trim()
            )
        }
    }
}

pub trait ToolRunner: Send + Sync {
    /// Run the invocation to completion.
    ///
    /// `Err` means the tool could not be started or awaited at all; a tool
    /// that ran and failed is `Ok` with `success == false`.
    fn run<'a>(
        &'a self,
        invocation: &'a ToolInvocation,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput>> + Send + 'a>>;
}

/// Runs tools as real child processes via `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct RealToolRunner;

impl ToolRunner for RealToolRunner {
    fn run<'a>(
        &'a self,
        invocation: &'a ToolInvocation,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput>> + Send + 'a>> {
        Box::pin(async move {
            debug!(tool = %invocation, cwd = ?invocation.cwd, "running tool");

            let mut cmd = Command::new(&invocation.program);
            cmd.args(&invocation.args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            if let Some(ref dir) = invocation.cwd {
                cmd.current_dir(dir);
            }

            let mut child = cmd
                .spawn()
                .with_context(|| format!("spawning `{}`", invocation.program))?;

            let stdout_pump = child.stdout.take().map(|out| {
                let program = invocation.program.clone();
                tokio::spawn(async move {
                    drain_lines(out, |line| debug!(tool = %program, "stdout: {}", line)).await;
                })
            });

            let stderr_pump = child.stderr.take().map(|err| {
                let program = invocation.program.clone();
                tokio::spawn(async move {
                    let mut tail: Vec<String> = Vec::new();
                    drain_lines(err, |line| {
                        debug!(tool = %program, "stderr: {}", line);
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.remove(0);
                        }
                        tail.push(line.to_string());
                    })
                    .await;
                    tail.join("\n")
                })
            });

            let status = child
                .wait()
                .await
                .with_context(|| format!("waiting for `{}`", invocation.program))?;

            if let Some(pump) = stdout_pump {
                let _ = pump.await;
            }
            let stderr_tail = match stderr_pump {
                Some(pump) => pump.await.unwrap_or_default(),
                None => String::new(),
            };

            debug!(
                tool = %invocation.program,
                exit_code = ?status.code(),
                success = status.success(),
                "tool finished"
            );

            Ok(ToolOutput {
                success: status.success(),
                exit_code: status.code(),
                stderr_tail,
            })
        })
    }
}

/// Feed every line of `reader` to `on_line` until EOF.
///
/// Lines are split on `\n` and decoded lossily, so output that is not valid
/// UTF-8 never stops the read. The pipe must stay drained for as long as the
/// writer lives, otherwise it gets `SIGPIPE` on its next write.
pub(crate) async fn drain_lines<R, F>(reader: R, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = strip_line_ending(&buf);
                on_line(&String::from_utf8_lossy(line));
            }
            Err(e) => {
                debug!(error = %e, "output stream read failed");
                break;
            }
        }
    }
}

fn strip_line_ending(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}
