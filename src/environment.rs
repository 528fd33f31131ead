//! The mutable provisioning target.
//!
//! The active identity is an explicit field here, never ambient process
//! state. Every identity transition goes through
//! [`Environment::switch_identity`], which validates the target with the
//! identity backend before changing the field, so a failed switch leaves
//! the environment untouched.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::ProvisionError;
use crate::identity::{Identity, IdentityBackend};
use crate::package::{PackageId, PackageManager, PackageSet};

/// Collaborators a provisioning run consumes.
pub struct Backends {
    /// Identity/privilege subsystem.
    pub identities: Box<dyn IdentityBackend>,
    /// Package manager.
    pub packages: Box<dyn PackageManager>,
}

impl Backends {
    /// Bundles an identity backend and a package manager.
    pub fn new(identities: Box<dyn IdentityBackend>, packages: Box<dyn PackageManager>) -> Self {
        Self {
            identities,
            packages,
        }
    }
}

/// Filesystem + package state + active identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    rootfs: Option<Utf8PathBuf>,
    identity: Identity,
    packages: PackageSet,
}

impl Environment {
    /// Creates an environment in the given base state.
    pub fn new(identity: Identity, packages: PackageSet) -> Self {
        Self {
            rootfs: None,
            identity,
            packages,
        }
    }

    /// Creates an environment whose package snapshot is read from the
    /// package manager.
    pub fn open(
        rootfs: Option<Utf8PathBuf>,
        identity: Identity,
        backends: &Backends,
    ) -> Result<Self, ProvisionError> {
        let packages = backends.packages.installed()?;
        debug!(
            "opened environment: identity={}, {} package(s) installed",
            identity,
            packages.len()
        );
        Ok(Self {
            rootfs,
            identity,
            packages,
        })
    }

    /// Returns the rootfs, if the environment is backed by one.
    pub fn rootfs(&self) -> Option<&Utf8Path> {
        self.rootfs.as_deref()
    }

    /// Returns the active identity.
    pub fn current_identity(&self) -> &Identity {
        &self.identity
    }

    /// Returns the installed package set.
    pub fn packages(&self) -> &PackageSet {
        &self.packages
    }

    /// Returns true if the package is recorded as installed.
    pub fn is_installed(&self, package: &PackageId) -> bool {
        self.packages.contains(package)
    }

    /// Makes `target` the active identity.
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::IdentitySwitch` if the backend refuses the
    /// switch; the active identity is unchanged in that case.
    pub fn switch_identity(
        &mut self,
        target: &Identity,
        backend: &dyn IdentityBackend,
    ) -> Result<(), ProvisionError> {
        backend.switch_identity(&self.identity, target)?;
        if &self.identity != target {
            debug!("identity {} -> {} ({})", self.identity, target, backend.name());
            self.identity = target.clone();
        }
        Ok(())
    }

    /// Records packages as installed. The set only grows.
    pub(crate) fn record_installed(&mut self, packages: &PackageSet) {
        self.packages.extend_from(packages);
    }
}
