//! In-memory package manager with a declared catalogue.

use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use super::{PackageId, PackageManager, PackageSet};
use crate::error::ProvisionError;
use crate::identity::Identity;

/// Package manager that resolves against a fixed catalogue of available
/// packages and records installs in memory.
///
/// Like a real package manager, installing requires a privileged identity.
#[derive(Debug, Default)]
pub struct MemoryPackageManager {
    available: PackageSet,
    installed: Mutex<PackageSet>,
}

impl MemoryPackageManager {
    /// Creates a manager from the available catalogue and the pre-installed set.
    ///
    /// Pre-installed packages are always resolvable.
    pub fn new(available: PackageSet, installed: PackageSet) -> Self {
        let mut catalogue = available;
        catalogue.extend_from(&installed);
        Self {
            available: catalogue,
            installed: Mutex::new(installed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PackageSet> {
        self.installed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PackageManager for MemoryPackageManager {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn installed(&self) -> Result<PackageSet, ProvisionError> {
        Ok(self.lock().clone())
    }

    fn is_installed(&self, package: &PackageId) -> Result<bool, ProvisionError> {
        Ok(self.lock().contains(package))
    }

    fn ensure_installed(
        &self,
        identity: &Identity,
        packages: &PackageSet,
    ) -> Result<(), ProvisionError> {
        let unresolved = packages.difference(&self.available);
        if !unresolved.is_empty() {
            return Err(ProvisionError::UnresolvedPackage {
                packages: unresolved.names(),
            });
        }

        if !identity.is_privileged() {
            return Err(ProvisionError::PackageManager {
                reason: format!(
                    "installing packages requires root, active identity is {}",
                    identity
                ),
            });
        }

        let mut installed = self.lock();
        installed.extend_from(packages);
        debug!("memory package manager now holds {} package(s)", installed.len());
        Ok(())
    }
}
