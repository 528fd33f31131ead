//! Identity model and the identity/privilege collaborator.
//!
//! An [`Identity`] is a user/group pair that determines the privilege level
//! commands run under. The environment's active identity is explicit state
//! carried on [`Environment`](crate::environment::Environment); backends
//! only answer whether a requested identity exists and can be assumed.
//!
//! Backends:
//! - [`PasswdIdentityBackend`]: reads the rootfs `/etc/passwd` and `/etc/group`
//! - [`StaticIdentityBackend`]: a declared list of identities (simulation and tests)

mod memory;
mod passwd;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProvisionError;

pub use memory::StaticIdentityBackend;
pub use passwd::PasswdIdentityBackend;

/// Name of the privileged user.
pub const ROOT: &str = "root";

/// A user/group execution context.
///
/// Written in YAML as `"user"` (run with the user's primary group, as
/// recorded in the account database) or `"user:group"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity {
    user: String,
    group: Option<String>,
}

impl Identity {
    /// Creates an identity with an explicit group, without validation.
    pub fn new(user: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: Some(group.into()),
        }
    }

    /// Creates an identity that runs with the user's primary group.
    pub fn primary(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: None,
        }
    }

    /// The privileged `root` identity, with its primary group.
    pub fn root() -> Self {
        Self::primary(ROOT)
    }

    /// Returns the user name.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Returns the explicit group name, or `None` for the primary group.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Returns true for the privileged `root` user.
    pub fn is_privileged(&self) -> bool {
        self.user == ROOT
    }

    /// Returns the `user[:group]` form accepted by `chroot --userspec`.
    ///
    /// Without a group, chroot falls back to the user's primary group.
    pub fn userspec(&self) -> String {
        self.to_string()
    }
}

fn validate_part(part: &str, label: &str, input: &str) -> Result<(), ProvisionError> {
    if part.is_empty() {
        return Err(ProvisionError::Validation(format!(
            "identity '{}' has an empty {} name",
            input, label
        )));
    }
    if part.chars().any(|c| c.is_whitespace() || c == ':') {
        return Err(ProvisionError::Validation(format!(
            "identity '{}' has an invalid {} name '{}'",
            input, label, part
        )));
    }
    Ok(())
}

impl FromStr for Identity {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((user, group)) => {
                validate_part(user, "user", s)?;
                validate_part(group, "group", s)?;
                Ok(Self::new(user, group))
            }
            None => {
                validate_part(s, "user", s)?;
                Ok(Self::primary(s))
            }
        }
    }
}

impl TryFrom<String> for Identity {
    type Error = ProvisionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.userspec()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{}:{}", self.user, group),
            None => f.write_str(&self.user),
        }
    }
}

/// Identity/privilege subsystem consumed by provisioning steps.
///
/// Implementations decide whether `target` exists and whether the
/// orchestrator may assume it while `current` is active. They never hold the
/// active identity themselves.
pub trait IdentityBackend: Send + Sync {
    /// Returns the name of this backend.
    fn name(&self) -> &'static str;

    /// Checks that `target` can be assumed from `current`.
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::IdentitySwitch` if the identity does not
    /// exist or the orchestrator lacks the rights to assume it.
    fn switch_identity(&self, current: &Identity, target: &Identity) -> Result<(), ProvisionError>;
}
