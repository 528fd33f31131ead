//! Identity backend backed by a declared list of identities.

use std::collections::BTreeSet;

use super::{Identity, IdentityBackend};
use crate::error::ProvisionError;

/// Accepts exactly the identities it was created with.
///
/// Used by the in-memory backend for simulated runs and by tests.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityBackend {
    known: BTreeSet<Identity>,
}

impl StaticIdentityBackend {
    /// Creates a backend that knows the given identities.
    pub fn new(known: impl IntoIterator<Item = Identity>) -> Self {
        Self {
            known: known.into_iter().collect(),
        }
    }

    /// Returns true if `identity` was declared.
    pub fn contains(&self, identity: &Identity) -> bool {
        self.known.contains(identity)
    }
}

impl IdentityBackend for StaticIdentityBackend {
    fn name(&self) -> &'static str {
        "static"
    }

    fn switch_identity(
        &self,
        _current: &Identity,
        target: &Identity,
    ) -> Result<(), ProvisionError> {
        if self.contains(target) {
            Ok(())
        } else {
            Err(ProvisionError::IdentitySwitch {
                identity: target.clone(),
                reason: "identity is not declared".to_string(),
            })
        }
    }
}
