//! Profile configuration.
//!
//! A profile declares the base state of the environment, the backend that
//! supplies the identity and package collaborators, and the ordered list of
//! provisioning steps.

use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tracing::debug;

use crate::environment::Backends;
use crate::error::ProvisionError;
use crate::executor::CommandExecutor;
use crate::identity::{Identity, PasswdIdentityBackend, StaticIdentityBackend};
use crate::package::{AptPackageManager, MemoryPackageManager, PackageSet};
use crate::privilege::PrivilegeMethod;
use crate::sequence::Sequence;
use crate::step::ProvisioningStep;

/// Base state of the environment before any step runs.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BaseConfig {
    /// Base image reference, informational only
    #[serde(default)]
    pub image: Option<String>,
    /// Identity active when provisioning starts
    #[serde(default = "Identity::root")]
    pub identity: Identity,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            image: None,
            identity: Identity::root(),
        }
    }
}

/// apt/dpkg backend settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AptConfig {
    /// Escalation method for commands run against the rootfs
    #[serde(default)]
    pub privilege: Option<PrivilegeMethod>,
}

/// In-memory backend settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Identities that exist in the simulated environment
    #[serde(default)]
    pub identities: Vec<Identity>,
    /// Packages the simulated package manager can resolve
    #[serde(default)]
    pub available: PackageSet,
    /// Packages installed before the first step
    #[serde(default)]
    pub installed: PackageSet,
}

/// Backend configuration, selected by the `type` field.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(tag = "type", rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendConfig {
    /// Debian rootfs driven through chroot, apt, and dpkg
    Apt(AptConfig),
    /// Simulated environment held in memory
    Memory(MemoryConfig),
}

impl BackendConfig {
    /// Builds the collaborators for this backend.
    ///
    /// `rootfs` is required by the apt backend and ignored by the memory
    /// backend.
    pub fn build(
        &self,
        rootfs: Option<&Utf8Path>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Backends, ProvisionError> {
        match self {
            Self::Apt(cfg) => {
                let rootfs = rootfs.ok_or_else(|| {
                    ProvisionError::Validation("apt backend requires 'rootfs'".to_string())
                })?;
                Ok(Backends::new(
                    Box::new(PasswdIdentityBackend::for_host(rootfs, cfg.privilege)),
                    Box::new(AptPackageManager::new(rootfs, executor, cfg.privilege)),
                ))
            }
            Self::Memory(cfg) => Ok(Backends::new(
                Box::new(StaticIdentityBackend::new(cfg.identities.iter().cloned())),
                Box::new(MemoryPackageManager::new(cfg.available.clone(), cfg.installed.clone())),
            )),
        }
    }
}

/// A provisioning profile.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// Base state
    #[serde(default)]
    pub base: BaseConfig,
    /// Rootfs directory, resolved against the profile's directory
    #[serde(default)]
    pub rootfs: Option<Utf8PathBuf>,
    /// Identity and package collaborators
    pub backend: BackendConfig,
    /// Steps applied in order
    #[serde(default)]
    pub steps: Vec<ProvisioningStep>,
}

impl Profile {
    /// Resolves a relative `rootfs` against `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Utf8Path) {
        if let Some(rootfs) = &mut self.rootfs
            && rootfs.is_relative()
        {
            *rootfs = base_dir.join(&*rootfs);
        }
    }

    /// Returns the sequence executor over this profile's steps.
    pub fn sequence(&self) -> Sequence<'_> {
        Sequence::new(&self.steps)
    }

    /// Validates the profile.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        if self.steps.is_empty() {
            return Err(ProvisionError::Validation(
                "profile must declare at least one step".to_string(),
            ));
        }
        self.sequence().validate()?;

        match &self.backend {
            BackendConfig::Apt(_) => {
                let rootfs = self.rootfs.as_ref().ok_or_else(|| {
                    ProvisionError::Validation("apt backend requires 'rootfs'".to_string())
                })?;
                let metadata = fs::metadata(rootfs).map_err(|e| {
                    ProvisionError::io(format!("failed to read rootfs metadata: {}", rootfs), e)
                })?;
                if !metadata.is_dir() {
                    return Err(ProvisionError::Validation(format!(
                        "rootfs is not a directory: {}",
                        rootfs
                    )));
                }
            }
            BackendConfig::Memory(cfg) => {
                if cfg.identities.is_empty() {
                    return Err(ProvisionError::Validation(
                        "memory backend must declare at least one identity".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Loads a profile from a YAML file and resolves its relative paths.
pub fn load_profile(path: &Utf8Path) -> Result<Profile, ProvisionError> {
    let content = fs::read_to_string(path).map_err(|e| ProvisionError::io(path.as_str(), e))?;
    let mut profile: Profile = serde_yaml::from_str(&content)
        .map_err(|e| ProvisionError::Config(format!("failed to parse {}: {}", path, e)))?;

    let base_dir = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir.to_owned(),
        _ => Utf8PathBuf::from("."),
    };
    profile.resolve_paths(&base_dir);
    debug!(
        "loaded profile {} ({} step(s), backend: {})",
        path,
        profile.steps.len(),
        profile.backend
    );

    Ok(profile)
}
