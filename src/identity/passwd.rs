//! Identity backend backed by the rootfs user and group databases.
//!
//! An identity without an explicit group runs with the user's primary
//! group, found through the GID field of its passwd entry.
//!
//! The databases are re-read on every switch: packages installed by an
//! earlier action (e.g. `dbus` creating `messagebus`) may add accounts.

use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, trace};

use super::{Identity, IdentityBackend};
use crate::error::{ProvisionError, io_error_kind_message};
use crate::privilege::{self, PrivilegeMethod};

const PASSWD: &str = "etc/passwd";
const GROUP: &str = "etc/group";

/// Position of the numeric group id in a passwd line (`name:x:uid:gid:...`).
const PASSWD_GID_FIELD: usize = 3;
/// Position of the numeric group id in a group line (`name:x:gid:members`).
const GROUP_GID_FIELD: usize = 2;

/// Reads `<rootfs>/etc/passwd` and `<rootfs>/etc/group`.
#[derive(Debug, Clone)]
pub struct PasswdIdentityBackend {
    rootfs: Utf8PathBuf,
    can_escalate: bool,
}

impl PasswdIdentityBackend {
    /// Creates a backend with an explicit escalation capability.
    ///
    /// When `can_escalate` is false, only switches to the current identity
    /// are permitted.
    pub fn new(rootfs: impl Into<Utf8PathBuf>, can_escalate: bool) -> Self {
        Self {
            rootfs: rootfs.into(),
            can_escalate,
        }
    }

    /// Creates a backend whose escalation capability is derived from the
    /// running process: effective root, or a configured escalation method.
    pub fn for_host(rootfs: impl Into<Utf8PathBuf>, method: Option<PrivilegeMethod>) -> Self {
        Self::new(rootfs, privilege::can_escalate(method))
    }

    /// Returns the rootfs this backend reads from.
    pub fn rootfs(&self) -> &Utf8Path {
        &self.rootfs
    }

    fn read_database(
        &self,
        relative: &str,
        gid_field: usize,
        identity: &Identity,
    ) -> Result<BTreeMap<String, Option<u32>>, ProvisionError> {
        let path = self.rootfs.join(relative);
        let content = fs::read_to_string(&path).map_err(|e| ProvisionError::IdentitySwitch {
            identity: identity.clone(),
            reason: format!("failed to read {}: {}", path, io_error_kind_message(&e)),
        })?;
        trace!("read {} bytes from {}", content.len(), path);
        Ok(parse_database(&content, gid_field))
    }

    fn not_found(&self, target: &Identity, what: String, database: &str) -> ProvisionError {
        ProvisionError::IdentitySwitch {
            identity: target.clone(),
            reason: format!("{} not found in {}/{}", what, self.rootfs, database),
        }
    }
}

/// Maps the name of every colon-separated database line to its numeric
/// group id. The id is `None` when the field is missing or not a number.
///
/// Blank lines and `#` comments are skipped.
pub(crate) fn parse_database(content: &str, gid_field: usize) -> BTreeMap<String, Option<u32>> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split(':');
            let name = fields.next().filter(|name| !name.is_empty())?;
            let gid = fields
                .nth(gid_field - 1)
                .and_then(|gid| gid.parse().ok());
            Some((name.to_string(), gid))
        })
        .collect()
}

/// Returns the name of the first group with id `gid`.
fn group_name(groups: &BTreeMap<String, Option<u32>>, gid: u32) -> Option<&str> {
    groups
        .iter()
        .find(|(_, id)| **id == Some(gid))
        .map(|(name, _)| name.as_str())
}

impl IdentityBackend for PasswdIdentityBackend {
    fn name(&self) -> &'static str {
        "passwd"
    }

    fn switch_identity(&self, current: &Identity, target: &Identity) -> Result<(), ProvisionError> {
        let users = self.read_database(PASSWD, PASSWD_GID_FIELD, target)?;
        let primary_gid = match users.get(target.user()) {
            Some(gid) => *gid,
            None => {
                let user = format!("user '{}'", target.user());
                return Err(self.not_found(target, user, PASSWD));
            }
        };

        let groups = self.read_database(GROUP, GROUP_GID_FIELD, target)?;
        match target.group() {
            Some(group) => {
                let is_primary_gid = primary_gid.is_some_and(|gid| group == gid.to_string());
                if !groups.contains_key(group) && !is_primary_gid {
                    return Err(self.not_found(target, format!("group '{}'", group), GROUP));
                }
            }
            None => match primary_gid.and_then(|gid| group_name(&groups, gid)) {
                Some(group) => debug!("{} runs with primary group {}", target.user(), group),
                None => debug!(
                    "primary group of {} ({:?}) has no entry in {}/{}",
                    target.user(),
                    primary_gid,
                    self.rootfs,
                    GROUP
                ),
            },
        }

        if current != target && !self.can_escalate {
            return Err(ProvisionError::IdentitySwitch {
                identity: target.clone(),
                reason: format!(
                    "orchestrator is not root and no privilege method is configured \
                    (active identity: {})",
                    current
                ),
            });
        }

        debug!("identity {} is available in {}", target, self.rootfs);
        Ok(())
    }
}
