//! Actions a provisioning step applies, in declaration order.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::environment::{Backends, Environment};
use crate::error::ProvisionError;
use crate::identity::Identity;
use crate::package::PackageSet;

/// One idempotent action inside a step.
///
/// YAML forms:
/// - `install: [dbus, alsa-utils]`: ensure a package set is installed
/// - `user: dev`: switch the active identity
///
/// Adding a new action requires a variant here plus its arms in
/// `apply`, `validate`, and `Display`; the compiler flags every missing arm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", deny_unknown_fields)]
pub enum Action {
    /// Ensure every package of the set is installed.
    Install(PackageSet),
    /// Switch the active identity.
    User(Identity),
}

impl Action {
    /// Validates the action configuration.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        match self {
            Self::Install(packages) if packages.is_empty() => Err(ProvisionError::Validation(
                "install list must not be empty".to_string(),
            )),
            Self::Install(_) | Self::User(_) => Ok(()),
        }
    }

    /// Applies the action to `env`.
    ///
    /// Installing is idempotent: packages already present (in the
    /// environment snapshot or according to the package manager) are
    /// skipped, and a fully satisfied set is a no-op.
    pub fn apply(&self, env: &mut Environment, backends: &Backends) -> Result<(), ProvisionError> {
        match self {
            Self::Install(packages) => install(packages, env, backends),
            Self::User(identity) => env.switch_identity(identity, backends.identities.as_ref()),
        }
    }
}

fn install(
    packages: &PackageSet,
    env: &mut Environment,
    backends: &Backends,
) -> Result<(), ProvisionError> {
    let mut present = PackageSet::new();
    let mut missing = PackageSet::new();
    for package in packages {
        if env.is_installed(package) || backends.packages.is_installed(package)? {
            present.insert(package.clone());
        } else {
            missing.insert(package.clone());
        }
    }
    env.record_installed(&present);

    if missing.is_empty() {
        info!("already installed, nothing to do: {}", packages);
        return Ok(());
    }

    info!(
        "installing {} package(s) as {} via {}: {}",
        missing.len(),
        env.current_identity(),
        backends.packages.name(),
        missing
    );
    backends
        .packages
        .ensure_installed(env.current_identity(), &missing)?;
    env.record_installed(&missing);
    Ok(())
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install(packages) => write!(f, "install: {}", packages),
            Self::User(identity) => write!(f, "user: {}", identity),
        }
    }
}
