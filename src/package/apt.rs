//! apt/dpkg-backed package manager for a Debian rootfs.
//!
//! Installed state comes from `<rootfs>/var/lib/dpkg/status`. Resolution and
//! installation run inside the rootfs through `chroot --userspec`, so every
//! command executes as the environment's active identity.

use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use super::{PackageId, PackageManager, PackageSet};
use crate::error::{ProvisionError, io_error_kind_message};
use crate::executor::{CommandExecutor, CommandSpec, ExecutionResult};
use crate::identity::Identity;
use crate::privilege::PrivilegeMethod;

/// Location of the dpkg database relative to the rootfs.
const DPKG_STATUS: &str = "var/lib/dpkg/status";

/// Exit code of `apt-cache show` for a package it does not know.
const APT_NOT_FOUND: i32 = 100;

/// Parses a dpkg status database and returns the installed packages.
///
/// A package counts as installed when the last word of its `Status:` field
/// is `installed` (e.g. `install ok installed`, `hold ok installed`).
/// Entries whose name is not a valid identifier are skipped.
pub fn parse_dpkg_status(content: &str) -> PackageSet {
    let mut installed = PackageSet::new();
    let mut package: Option<&str> = None;
    let mut is_installed = false;

    for line in content.lines() {
        if line.trim().is_empty() {
            if let Some(name) = package.take()
                && is_installed
            {
                record_installed(&mut installed, name);
            }
            is_installed = false;
        } else if let Some(name) = line.strip_prefix("Package:") {
            package = Some(name.trim());
        } else if let Some(status) = line.strip_prefix("Status:") {
            is_installed = status.split_whitespace().last() == Some("installed");
        }
    }
    if let Some(name) = package
        && is_installed
    {
        record_installed(&mut installed, name);
    }

    installed
}

fn record_installed(installed: &mut PackageSet, name: &str) {
    match name.parse::<PackageId>() {
        Ok(id) => {
            installed.insert(id);
        }
        Err(_) => debug!("skipping dpkg entry with unexpected name: {}", name),
    }
}

/// Package manager driving `apt-cache` and `apt-get` inside a rootfs.
pub struct AptPackageManager {
    rootfs: Utf8PathBuf,
    executor: Arc<dyn CommandExecutor>,
    privilege: Option<PrivilegeMethod>,
}

impl AptPackageManager {
    /// Creates a manager for `rootfs` that runs commands through `executor`,
    /// wrapped with `privilege` when set.
    pub fn new(
        rootfs: impl Into<Utf8PathBuf>,
        executor: Arc<dyn CommandExecutor>,
        privilege: Option<PrivilegeMethod>,
    ) -> Self {
        Self {
            rootfs: rootfs.into(),
            executor,
            privilege,
        }
    }

    /// Returns the rootfs this manager operates on.
    pub fn rootfs(&self) -> &Utf8Path {
        &self.rootfs
    }

    /// Builds a command that runs `args` inside the rootfs as `identity`.
    pub fn chroot_command(&self, identity: &Identity, args: &[&str]) -> CommandSpec {
        let mut chroot_args = Vec::with_capacity(args.len() + 2);
        chroot_args.push(format!("--userspec={}", identity.userspec()));
        chroot_args.push(self.rootfs.to_string());
        chroot_args.extend(args.iter().map(|a| a.to_string()));

        CommandSpec::new("chroot", chroot_args)
            .with_env("DEBIAN_FRONTEND", "noninteractive")
            .with_privilege(self.privilege)
    }

    fn run(&self, spec: &CommandSpec) -> Result<ExecutionResult, ProvisionError> {
        let result = self
            .executor
            .execute(spec)
            .map_err(|e| ProvisionError::PackageManager {
                reason: format!("{:#}", e),
            })?;
        debug!("{} finished: {}", spec.display(), result.status_display());
        Ok(result)
    }

    /// Returns true if `apt-cache` knows `package`.
    ///
    /// Only apt's own "no such package" exit code means unresolved; any
    /// other failure (chroot, escalation, a missing binary) is a
    /// package-manager error.
    fn resolves(&self, identity: &Identity, package: &PackageId) -> Result<bool, ProvisionError> {
        let spec = self
            .chroot_command(
                identity,
                &["apt-cache", "show", "--no-all-versions", package.as_str()],
            )
            .read_only();
        let result = self.run(&spec)?;
        if result.success() {
            return Ok(true);
        }
        match result.code() {
            Some(APT_NOT_FOUND) => Ok(false),
            _ => Err(ProvisionError::PackageManager {
                reason: format!(
                    "apt-cache show {} exited with status: {}",
                    package,
                    result.status_display()
                ),
            }),
        }
    }

    /// Returns the packages `apt-cache` cannot find.
    fn unresolved(
        &self,
        identity: &Identity,
        packages: &PackageSet,
    ) -> Result<Vec<String>, ProvisionError> {
        let mut unresolved = Vec::new();
        for package in packages {
            if !self.resolves(identity, package)? {
                unresolved.push(package.to_string());
            }
        }
        Ok(unresolved)
    }
}

impl PackageManager for AptPackageManager {
    fn name(&self) -> &'static str {
        "apt"
    }

    fn installed(&self) -> Result<PackageSet, ProvisionError> {
        let path = self.rootfs.join(DPKG_STATUS);
        let content = fs::read_to_string(&path).map_err(|e| ProvisionError::PackageManager {
            reason: format!("failed to read {}: {}", path, io_error_kind_message(&e)),
        })?;
        Ok(parse_dpkg_status(&content))
    }

    fn ensure_installed(
        &self,
        identity: &Identity,
        packages: &PackageSet,
    ) -> Result<(), ProvisionError> {
        let unresolved = self.unresolved(identity, packages)?;
        if !unresolved.is_empty() {
            return Err(ProvisionError::UnresolvedPackage {
                packages: unresolved,
            });
        }

        let names = packages.names();
        let mut args = vec!["apt-get", "install", "-y", "--no-install-recommends"];
        args.extend(names.iter().map(String::as_str));
        let spec = self.chroot_command(identity, &args);

        info!("installing via apt as {}: {}", identity, packages);
        let result = self.run(&spec)?;
        if !result.success() {
            return Err(ProvisionError::PackageManager {
                reason: format!("apt-get install exited with status: {}", result.status_display()),
            });
        }
        Ok(())
    }
}
