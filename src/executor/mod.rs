//! Command execution abstraction for rslayer.
//!
//! This module provides:
//! - [`CommandSpec`]: a command to run, with optional privilege escalation
//! - [`ExecutionResult`]: the outcome of a run
//! - [`CommandExecutor`]: the trait package-manager backends execute through
//! - [`RealCommandExecutor`]: production implementation using `std::process::Command`

mod pipe;
mod real;

use std::process::ExitStatus;

use anyhow::Result;

use crate::privilege::PrivilegeMethod;

pub use real::RealCommandExecutor;

/// Formats arguments into a space-separated, debug-quoted string.
pub(crate) fn format_command_args(args: &[String]) -> String {
    args.iter()
        .map(|a| format!("{:?}", a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Specification for a command to be executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// The command to execute (e.g., "chroot")
    pub command: String,
    /// Command arguments
    pub args: Vec<String>,
    /// Environment variables to set (in addition to inherited environment)
    pub env: Vec<(String, String)>,
    /// Privilege escalation method to wrap the command
    pub privilege: Option<PrivilegeMethod>,
    /// The command only queries state, so it also runs in dry-run mode
    pub read_only: bool,
}

impl CommandSpec {
    /// Creates a new CommandSpec with command and args
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: Vec::new(),
            privilege: None,
            read_only: false,
        }
    }

    /// Sets the privilege escalation method
    #[must_use]
    pub fn with_privilege(mut self, privilege: Option<PrivilegeMethod>) -> Self {
        self.privilege = privilege;
        self
    }

    /// Marks the command as a read-only query
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Adds an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Returns the program and arguments actually spawned, with the
    /// escalation command prepended when a privilege method is set.
    pub fn argv(&self) -> (String, Vec<String>) {
        match self.privilege {
            Some(method) => method.wrap(&self.command, &self.args),
            None => (self.command.clone(), self.args.clone()),
        }
    }

    /// Returns the name of the program doing the work.
    ///
    /// For `chroot [--option...] <root> <program> ...` this is `<program>`;
    /// otherwise it is the command itself.
    pub fn label(&self) -> String {
        if self.command == "chroot" {
            let program = self
                .args
                .iter()
                .skip_while(|arg| arg.starts_with('-'))
                .nth(1);
            if let Some(program) = program {
                return program.clone();
            }
        }
        self.command.clone()
    }

    /// Returns a human-readable command line for logs and errors.
    pub fn display(&self) -> String {
        let (program, args) = self.argv();
        if args.is_empty() {
            program
        } else {
            format!("{} {}", program, format_command_args(&args))
        }
    }
}

/// Result of command execution
#[derive(Debug)]
pub struct ExecutionResult {
    /// Exit status of the command (None in dry-run mode)
    pub status: Option<ExitStatus>,
}

impl ExecutionResult {
    /// Returns true if the command executed successfully.
    ///
    /// In dry-run mode (status is None), this always returns true.
    pub fn success(&self) -> bool {
        self.status.is_none_or(|s| s.success())
    }

    /// Returns the exit code if available
    pub fn code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    /// Returns the exit status as display text.
    pub fn status_display(&self) -> String {
        self.status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown (no status available)".to_string())
    }
}

/// Trait for command execution.
///
/// Implementations must be `Send + Sync` so a single executor can be shared
/// through `Arc<dyn CommandExecutor>` by every backend of a run.
pub trait CommandExecutor: Send + Sync {
    /// Executes a command with the given specification.
    fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_without_privilege() {
        let spec = CommandSpec::new("apt-get", vec!["update".to_string()]);
        assert_eq!(spec.argv(), ("apt-get".to_string(), vec!["update".to_string()]));
        assert_eq!(spec.display(), "apt-get \"update\"");
    }

    #[test]
    fn argv_with_privilege() {
        let spec = CommandSpec::new("chroot", vec!["/rootfs".to_string()])
            .with_privilege(Some(PrivilegeMethod::Doas));
        let (program, args) = spec.argv();
        assert_eq!(program, "doas");
        assert_eq!(args, vec!["chroot".to_string(), "/rootfs".to_string()]);
    }

    #[test]
    fn label_names_program_inside_chroot() {
        let args = ["--userspec=dev:dev", "/rootfs", "apt-get", "install", "-y"]
            .iter()
            .map(|a| a.to_string())
            .collect();
        let spec = CommandSpec::new("chroot", args).with_privilege(Some(PrivilegeMethod::Sudo));
        assert_eq!(spec.label(), "apt-get");

        let bare = CommandSpec::new("chroot", vec!["/rootfs".to_string()]);
        assert_eq!(bare.label(), "chroot");
        assert_eq!(CommandSpec::new("dpkg", Vec::new()).label(), "dpkg");
    }

    #[test]
    fn dry_run_result_is_success() {
        let result = ExecutionResult { status: None };
        assert!(result.success());
        assert_eq!(result.code(), None);
        assert_eq!(result.status_display(), "unknown (no status available)");
    }
}
