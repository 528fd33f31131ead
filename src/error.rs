//! Domain-specific error types for rslayer.
//!
//! This module defines `ProvisionError`, a `thiserror`-based enum that
//! provides typed error variants for every provisioning failure mode. Public
//! API functions return `Result<T, ProvisionError>` so callers can match on
//! the failure class, while the `CommandExecutor` trait boundary and the
//! application edge continue to use `anyhow::Result`.
//!
//! `ProvisionError` implements `Into<anyhow::Error>`, so the `?` operator
//! converts it automatically where `anyhow::Result` is expected, and
//! `anyhow::Error::downcast_ref` recovers it for exit-code classification.

use std::io;

use crate::identity::Identity;

/// Formats an IO error kind into a human-readable message.
///
/// Gives consistent messages for common kinds (e.g. "I/O error: not found")
/// instead of the OS-level text. Unrecognized kinds fall back to the
/// underlying error message.
pub(crate) fn io_error_kind_message(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "I/O error: not found".to_string(),
        io::ErrorKind::PermissionDenied => "I/O error: permission denied".to_string(),
        io::ErrorKind::IsADirectory => "I/O error: is a directory".to_string(),
        _ => format!("I/O error: {}", err),
    }
}

/// Major error classes reported to the orchestrator through the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorClass {
    /// Configuration, validation, I/O, or any other non-provisioning failure.
    General,
    /// A package could not be resolved or installed.
    Package,
    /// A required identity could not be assumed.
    IdentitySwitch,
    /// The post-condition identity could not be restored.
    IdentityRestore,
}

impl ErrorClass {
    /// Returns the process exit code for this class.
    pub fn exit_code(self) -> u8 {
        match self {
            Self::General => 1,
            Self::Package => 2,
            Self::IdentitySwitch => 3,
            Self::IdentityRestore => 4,
        }
    }
}

/// Domain-specific error type for rslayer.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProvisionError {
    /// A validation constraint was violated.
    #[error("validation error: {0}")]
    Validation(String),

    /// A profile could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O operation failed with contextual information.
    #[error("{context}: {message}")]
    Io {
        /// What was being done when the error occurred, usually including a path.
        context: String,
        /// Human-readable description derived from [`io_error_kind_message`].
        message: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A command ran but did not succeed, or could not be run to completion.
    #[error("command execution failed: {command}: {status}")]
    Execution {
        /// The command line that was executed.
        command: String,
        /// Exit status, signal, or a description of the internal failure.
        status: String,
    },

    /// A command could not be found in `PATH`.
    #[error("command not found in PATH: {command}")]
    CommandNotFound {
        /// The missing command.
        command: String,
    },

    /// The requested identity does not exist or cannot be assumed.
    #[error("cannot switch identity to {identity}: {reason}")]
    IdentitySwitch {
        /// The identity that was requested.
        identity: Identity,
        /// Why the switch was refused.
        reason: String,
    },

    /// One or more package identifiers are unknown to the package manager.
    #[error("unresolved package(s): {}", .packages.join(", "))]
    UnresolvedPackage {
        /// Every identifier that failed to resolve.
        packages: Vec<String>,
    },

    /// The installation mechanism itself failed (network, disk, lock contention).
    #[error("package manager failed: {reason}")]
    PackageManager {
        /// Description of the failure.
        reason: String,
    },

    /// Restoring the post-condition identity failed.
    ///
    /// The environment is left in an indeterminate privilege state and must
    /// not be provisioned further or marked usable.
    #[error(
        "failed to restore identity {identity}: {reason}{}",
        .action_error
            .as_ref()
            .map(|e| format!(" (after action failure: {})", e))
            .unwrap_or_default()
    )]
    IdentityRestore {
        /// The post-condition identity that could not be restored.
        identity: Identity,
        /// Why restoration failed.
        reason: String,
        /// The action failure that preceded the restore attempt, if any.
        action_error: Option<Box<ProvisionError>>,
    },

    /// An action inside a step failed.
    #[error("action {} ({action}) failed: {source}", .index + 1)]
    Action {
        /// Zero-based position of the action in the step.
        index: usize,
        /// Short description of the action (e.g. `install: dbus, gtk`).
        action: String,
        /// The underlying failure.
        #[source]
        source: Box<ProvisionError>,
    },

    /// A step in a sequence failed; later steps were not attempted.
    #[error("step {} ({name}) failed: {source}", .index + 1)]
    Step {
        /// Zero-based position of the step in the sequence.
        index: usize,
        /// Display name of the step.
        name: String,
        /// The underlying failure.
        #[source]
        source: Box<ProvisionError>,
    },
}

impl ProvisionError {
    /// Creates an `Io` variant with `message` derived from `source`.
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: io_error_kind_message(&source),
            source,
        }
    }

    /// Returns the error class used to pick the process exit code.
    ///
    /// Wrapper variants report the class of the error they wrap.
    /// `IdentityRestore` always reports its own class, even when it carries
    /// an action failure.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::IdentityRestore { .. } => ErrorClass::IdentityRestore,
            Self::IdentitySwitch { .. } => ErrorClass::IdentitySwitch,
            Self::UnresolvedPackage { .. } | Self::PackageManager { .. } => ErrorClass::Package,
            Self::Action { source, .. } | Self::Step { source, .. } => source.class(),
            _ => ErrorClass::General,
        }
    }

    /// Returns true if the environment's identity is known to be restored
    /// (or was never changed) after this error.
    pub fn identity_restored(&self) -> bool {
        self.class() != ErrorClass::IdentityRestore
    }
}
