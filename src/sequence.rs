//! Sequential executor for an ordered list of provisioning steps.
//!
//! Steps run one at a time, in declaration order, on the caller's thread.
//! The active identity is environment-wide state, so steps are never run
//! concurrently against the same environment. The first failing step aborts
//! the whole sequence; there is no rollback of packages already installed.

use tracing::{debug, info};

use crate::environment::{Backends, Environment};
use crate::error::ProvisionError;
use crate::step::ProvisioningStep;

/// Thin executor over borrowed steps.
pub struct Sequence<'a> {
    steps: &'a [ProvisioningStep],
}

impl<'a> Sequence<'a> {
    /// Creates a sequence over the given steps.
    pub fn new(steps: &'a [ProvisioningStep]) -> Self {
        Self { steps }
    }

    /// Returns true if there are no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the number of steps.
    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// Validates every step, prefixing errors with the step position.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        for (index, step) in self.steps.iter().enumerate() {
            step.validate().map_err(|e| match e {
                ProvisionError::Validation(msg) => ProvisionError::Validation(format!(
                    "step {} ({}) validation failed: {}",
                    index + 1,
                    step.name(),
                    msg
                )),
                other => other,
            })?;
        }
        Ok(())
    }

    /// Applies every step to `env` in order.
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::Step` wrapping the first step failure.
    /// Later steps are not attempted.
    pub fn run(&self, env: &mut Environment, backends: &Backends) -> Result<(), ProvisionError> {
        if self.is_empty() {
            debug!("no steps to apply");
            return Ok(());
        }

        info!("applying {} step(s)", self.total_steps());
        for (index, step) in self.steps.iter().enumerate() {
            info!("applying step {}/{}: {}", index + 1, self.total_steps(), step.name());
            step.apply(env, backends)
                .map_err(|e| ProvisionError::Step {
                    index,
                    name: step.name().into_owned(),
                    source: Box::new(e),
                })?;
        }

        info!(
            "all steps applied: identity={}, {} package(s) installed",
            env.current_identity(),
            env.packages().len()
        );
        Ok(())
    }
}
