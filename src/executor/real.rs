//! Real command executor implementation.
//!
//! This module provides [`RealCommandExecutor`], which executes commands
//! using `std::process::Command` with real-time output streaming.

use std::process::{Child, Command, Stdio};
use std::thread;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use which::which;

use super::pipe::{StreamType, panic_message, read_pipe_to_log};
use super::{CommandExecutor, CommandSpec, ExecutionResult};
use crate::error::ProvisionError;

/// Kills a child process and joins its reader threads.
///
/// Called from error paths in [`RealCommandExecutor::execute()`] so a failed
/// spawn or wait never leaks the process or the threads.
fn cleanup_child_process<I>(child: &mut Child, handles: I)
where
    I: IntoIterator<Item = JoinHandle<()>>,
{
    let pid = child.id();
    if let Err(e) = child.kill() {
        tracing::debug!(pid = pid, "kill returned error (process may have already exited): {}", e);
    }
    if let Err(e) = child.wait() {
        tracing::warn!(pid = pid, "failed to wait for child process after kill: {}", e);
    }
    for handle in handles {
        if let Err(e) = handle.join() {
            tracing::warn!("reader thread panicked during cleanup: {}", panic_message(&*e));
        }
    }
}

fn spawn_reader<R>(
    pipe: Option<R>,
    stream: StreamType,
    label: String,
) -> std::io::Result<JoinHandle<()>>
where
    R: std::io::Read + Send + 'static,
{
    thread::Builder::new()
        .name(format!("{}-{}", label, stream))
        .spawn(move || read_pipe_to_log(pipe, stream, &label))
}

/// Command executor that runs actual system commands.
///
/// When `dry_run` is true, commands are logged but not executed,
/// and `execute()` returns `Ok(ExecutionResult { status: None })`.
/// Read-only queries ([`CommandSpec::read_only`]) still run.
pub struct RealCommandExecutor {
    pub dry_run: bool,
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
        if self.dry_run {
            if !spec.read_only {
                tracing::info!("dry run: {}", spec.display());
                return Ok(ExecutionResult { status: None });
            }
            tracing::debug!("dry run: running read-only query: {}", spec.display());
        }

        let (program, args) = spec.argv();
        let cmd = which(&program).map_err(|_| ProvisionError::CommandNotFound {
            command: program.clone(),
        })?;
        tracing::trace!("command found: {}: {}", program, cmd.to_string_lossy());

        let mut command = Command::new(cmd);
        command.args(&args);
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn command: {}", spec.display()))?;

        tracing::debug!("spawned command: {}: pid={}", spec.display(), child.id());

        let label = spec.label();
        let stdout = spawn_reader(child.stdout.take(), StreamType::Stdout, label.clone());
        let stdout_handle = match stdout {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, []);
                return Err(ProvisionError::Execution {
                    command: spec.display(),
                    status: format!("failed to spawn stdout reader thread: {}", e),
                }
                .into());
            }
        };

        let stderr = spawn_reader(child.stderr.take(), StreamType::Stderr, label);
        let stderr_handle = match stderr {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, [stdout_handle]);
                return Err(ProvisionError::Execution {
                    command: spec.display(),
                    status: format!("failed to spawn stderr reader thread: {}", e),
                }
                .into());
            }
        };

        let status = match child.wait() {
            Ok(s) => s,
            Err(e) => {
                cleanup_child_process(&mut child, [stdout_handle, stderr_handle]);
                return Err(ProvisionError::Execution {
                    command: spec.display(),
                    status: format!("failed to wait for command: {}", e),
                }
                .into());
            }
        };

        let mut panicked_streams = Vec::new();
        for (name, handle) in [("stdout", stdout_handle), ("stderr", stderr_handle)] {
            if let Err(e) = handle.join() {
                let msg = panic_message(&*e);
                tracing::error!(stream = name, panic = msg, "reader thread panicked");
                panicked_streams.push(format!("{}: {}", name, msg));
            }
        }

        if !panicked_streams.is_empty() {
            return Err(ProvisionError::Execution {
                command: spec.display(),
                status: format!(
                    "reader thread(s) panicked during command execution: {}",
                    panicked_streams.join(", ")
                ),
            }
            .into());
        }

        tracing::trace!("executed command: {}: success={}", program, status.success());

        Ok(ExecutionResult {
            status: Some(status),
        })
    }
}
