//! Provisioning steps.
//!
//! A [`ProvisioningStep`] is a declarative value: the identity to run under,
//! an ordered list of [`Action`]s, and the identity to restore afterward.
//! [`ProvisioningStep::apply`] guarantees the active identity is
//! well-defined when it returns, whatever the outcome.
//!
//! Lifecycle:
//!
//! ```text
//! NotStarted -> IdentitySwitched -> ActionsApplied -> IdentityRestored
//!                     \                   \
//!                      `---> Failed <------'  (after a best-effort restore)
//! ```

mod action;

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

pub use action::Action;

use crate::environment::{Backends, Environment};
use crate::error::ProvisionError;
use crate::identity::Identity;

/// Execution state of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum StepState {
    NotStarted,
    IdentitySwitched,
    ActionsApplied,
    IdentityRestored,
    Failed,
}

/// One ordered unit of privileged work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisioningStep {
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,

    /// Identity the actions run under
    user: Identity,

    /// Actions applied in declaration order
    #[serde(default)]
    actions: Vec<Action>,

    /// Identity restored after the actions, on success and on failure
    restore: Identity,
}

impl ProvisioningStep {
    /// Creates an unnamed step.
    pub fn new(user: Identity, actions: Vec<Action>, restore: Identity) -> Self {
        Self {
            name: None,
            user,
            actions,
            restore,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the display name, falling back to `user -> restore`.
    pub fn name(&self) -> Cow<'_, str> {
        match &self.name {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("{} -> {}", self.user, self.restore)),
        }
    }

    /// Returns the identity the actions run under.
    pub fn user(&self) -> &Identity {
        &self.user
    }

    /// Returns the actions in declaration order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Returns the post-condition identity.
    pub fn restore(&self) -> &Identity {
        &self.restore
    }

    /// Validates the step configuration.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        if let Some(name) = &self.name
            && name.trim().is_empty()
        {
            return Err(ProvisionError::Validation("step name must not be empty".to_string()));
        }
        for (index, action) in self.actions.iter().enumerate() {
            action.validate().map_err(|e| match e {
                ProvisionError::Validation(msg) => {
                    ProvisionError::Validation(format!("action {}: {}", index + 1, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Applies the step to `env`.
    ///
    /// 1. Switches to the required identity. If that fails the error is
    ///    returned as is and `env` is unchanged; no restore is attempted.
    /// 2. Applies the actions in order, stopping at the first failure.
    /// 3. Restores the post-condition identity whether or not the actions
    ///    succeeded. A failed restore is reported as
    ///    `ProvisionError::IdentityRestore`, carrying the action failure if
    ///    there was one.
    pub fn apply(&self, env: &mut Environment, backends: &Backends) -> Result<(), ProvisionError> {
        let mut state = StepState::NotStarted;
        debug!(step = %self.name(), %state, "starting step");

        if let Err(e) = env.switch_identity(&self.user, backends.identities.as_ref()) {
            state = StepState::Failed;
            error!(step = %self.name(), %state, "{}", e);
            return Err(e);
        }
        state = StepState::IdentitySwitched;
        debug!(step = %self.name(), %state, "running as {}", self.user);

        let actions_result = self.apply_actions(env, backends);
        if actions_result.is_ok() {
            state = StepState::ActionsApplied;
            debug!(step = %self.name(), %state, "{} action(s) applied", self.actions.len());
        }

        let restore_result = env.switch_identity(&self.restore, backends.identities.as_ref());

        match (actions_result, restore_result) {
            (Ok(()), Ok(())) => {
                state = StepState::IdentityRestored;
                info!(step = %self.name(), %state, "identity restored to {}", self.restore);
                Ok(())
            }
            (Err(action_err), Ok(())) => {
                state = StepState::Failed;
                warn!(
                    step = %self.name(),
                    %state,
                    "action failed, identity restored to {}",
                    self.restore
                );
                Err(action_err)
            }
            (actions_result, Err(restore_err)) => {
                state = StepState::Failed;
                let reason = match restore_err {
                    ProvisionError::IdentitySwitch { reason, .. } => reason,
                    other => other.to_string(),
                };
                error!(
                    step = %self.name(),
                    %state,
                    "identity restore to {} failed: {}; active identity is {}",
                    self.restore,
                    reason,
                    env.current_identity()
                );
                Err(ProvisionError::IdentityRestore {
                    identity: self.restore.clone(),
                    reason,
                    action_error: actions_result.err().map(Box::new),
                })
            }
        }
    }

    fn apply_actions(
        &self,
        env: &mut Environment,
        backends: &Backends,
    ) -> Result<(), ProvisionError> {
        for (index, action) in self.actions.iter().enumerate() {
            debug!("applying action {}/{}: {}", index + 1, self.actions.len(), action);
            action
                .apply(env, backends)
                .map_err(|e| ProvisionError::Action {
                    index,
                    action: action.to_string(),
                    source: Box::new(e),
                })?;
        }
        Ok(())
    }
}
