//! Privilege escalation for commands run against the rootfs.
//!
//! Package-manager commands need root inside the chroot. When the
//! orchestrator is not running as root, they are wrapped with `sudo` or
//! `doas` as configured on the backend.

use serde::{Deserialize, Serialize};

/// Privilege escalation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeMethod {
    /// Use `sudo` for privilege escalation.
    Sudo,
    /// Use `doas` for privilege escalation.
    Doas,
}

impl PrivilegeMethod {
    /// Returns the command name for this privilege method.
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::Sudo => "sudo",
            Self::Doas => "doas",
        }
    }

    /// Prepends the escalation command to `command` and `args`.
    ///
    /// Returns the new program name and argument list.
    pub fn wrap(&self, command: &str, args: &[String]) -> (String, Vec<String>) {
        let mut wrapped = Vec::with_capacity(args.len() + 1);
        wrapped.push(command.to_string());
        wrapped.extend(args.iter().cloned());
        (self.command_name().to_string(), wrapped)
    }
}

impl std::fmt::Display for PrivilegeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.command_name())
    }
}

/// Returns true if the current process runs with effective UID 0.
pub fn is_effective_root() -> bool {
    rustix::process::geteuid().is_root()
}

/// Returns true if the orchestrator can assume identities other than the
/// active one: it is root already, or an escalation method is configured.
pub fn can_escalate(method: Option<PrivilegeMethod>) -> bool {
    method.is_some() || is_effective_root()
}
