//! Package identifiers, package sets, and the package-manager collaborator.
//!
//! Resolution, download, and verification belong to the package manager;
//! this module only models what is requested and what is installed.

mod apt;
mod memory;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ProvisionError;
use crate::identity::Identity;

pub use apt::{AptPackageManager, parse_dpkg_status};
pub use memory::MemoryPackageManager;

/// Debian package name rule: lowercase alphanumerics and `+ - .`,
/// starting with an alphanumeric, at least two characters.
static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9+.\-]+$").expect("package name pattern is valid")
});

/// A validated package identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId(String);

impl PackageId {
    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PackageId {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if PACKAGE_NAME.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ProvisionError::Validation(format!("invalid package identifier '{}'", s)))
        }
    }
}

impl TryFrom<String> for PackageId {
    type Error = ProvisionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PackageId> for String {
    fn from(id: PackageId) -> Self {
        id.0
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A set of package identifiers.
///
/// Ordering is lexical and duplicates collapse, so two sets built from the
/// same names in any order compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageSet(BTreeSet<PackageId>);

impl PackageSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a set from package names.
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::Validation` for the first invalid name.
    pub fn parse<I, S>(names: I) -> Result<Self, ProvisionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| name.as_ref().parse::<PackageId>())
            .collect()
    }

    /// Adds a package, returning false if it was already present.
    pub fn insert(&mut self, id: PackageId) -> bool {
        self.0.insert(id)
    }

    /// Returns true if the package is in the set.
    pub fn contains(&self, id: &PackageId) -> bool {
        self.0.contains(id)
    }

    /// Returns the number of packages.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates in lexical order.
    pub fn iter(&self) -> impl Iterator<Item = &PackageId> {
        self.0.iter()
    }

    /// Returns the packages of `self` that are not in `other`.
    pub fn difference(&self, other: &PackageSet) -> PackageSet {
        Self(self.0.difference(&other.0).cloned().collect())
    }

    /// Returns true if every package of `other` is in `self`.
    pub fn is_superset(&self, other: &PackageSet) -> bool {
        self.0.is_superset(&other.0)
    }

    /// Adds every package of `other`.
    pub fn extend_from(&mut self, other: &PackageSet) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Returns the package names as owned strings.
    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|id| id.0.clone()).collect()
    }
}

impl FromIterator<PackageId> for PackageSet {
    fn from_iter<T: IntoIterator<Item = PackageId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PackageSet {
    type Item = &'a PackageId;
    type IntoIter = std::collections::btree_set::Iter<'a, PackageId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for PackageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(", "))
    }
}

/// Package-manager collaborator consumed by provisioning steps.
pub trait PackageManager: Send + Sync {
    /// Returns the name of this backend.
    fn name(&self) -> &'static str;

    /// Returns every package currently installed in the environment.
    fn installed(&self) -> Result<PackageSet, ProvisionError>;

    /// Returns true if `package` is currently installed.
    fn is_installed(&self, package: &PackageId) -> Result<bool, ProvisionError> {
        Ok(self.installed()?.contains(package))
    }

    /// Installs `packages` as one intent while `identity` is active.
    ///
    /// Callers pass only packages that are not yet installed.
    ///
    /// # Errors
    ///
    /// - `ProvisionError::UnresolvedPackage` naming every unknown identifier;
    ///   nothing is installed in that case.
    /// - `ProvisionError::PackageManager` when the install mechanism fails.
    fn ensure_installed(
        &self,
        identity: &Identity,
        packages: &PackageSet,
    ) -> Result<(), ProvisionError>;
}
