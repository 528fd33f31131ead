//! Tests for applying a single provisioning step.

mod helpers;

use std::sync::{Arc, Mutex};

use helpers::{dev, memory_backends, packages, root_env};
use rslayer::ProvisionError;
use rslayer::environment::{Backends, Environment};
use rslayer::identity::{Identity, IdentityBackend, StaticIdentityBackend};
use rslayer::package::{MemoryPackageManager, PackageId, PackageManager, PackageSet};
use rslayer::step::{Action, ProvisioningStep};

fn desktop_step() -> ProvisioningStep {
    ProvisioningStep::new(
        Identity::root(),
        vec![Action::Install(packages(&["dbus", "alsa", "gtk"]))],
        dev(),
    )
    .with_name("desktop-integration")
}

/// Package manager that records each `ensure_installed` request and fails
/// requests containing `broken` with a mechanism error.
struct RecordingPackageManager {
    installed: Mutex<PackageSet>,
    requests: Arc<Mutex<Vec<PackageSet>>>,
}

impl RecordingPackageManager {
    fn new() -> Self {
        Self {
            installed: Mutex::new(PackageSet::new()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl PackageManager for RecordingPackageManager {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn installed(&self) -> Result<PackageSet, ProvisionError> {
        Ok(self.installed.lock().unwrap().clone())
    }

    fn ensure_installed(
        &self,
        _identity: &Identity,
        packages: &PackageSet,
    ) -> Result<(), ProvisionError> {
        self.requests.lock().unwrap().push(packages.clone());
        if packages.contains(&"broken".parse::<PackageId>().unwrap()) {
            return Err(ProvisionError::PackageManager {
                reason: "could not get lock /var/lib/dpkg/lock-frontend".to_string(),
            });
        }
        self.installed.lock().unwrap().extend_from(packages);
        Ok(())
    }
}

/// Identity backend that refuses one specific identity only on restore,
/// i.e. the second time it is asked for it.
struct FlakyRestoreBackend {
    inner: StaticIdentityBackend,
    refuse: Identity,
    seen: Mutex<usize>,
}

impl IdentityBackend for FlakyRestoreBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn switch_identity(&self, current: &Identity, target: &Identity) -> Result<(), ProvisionError> {
        if target == &self.refuse {
            let mut seen = self.seen.lock().unwrap();
            *seen += 1;
            if *seen > 1 {
                return Err(ProvisionError::IdentitySwitch {
                    identity: target.clone(),
                    reason: "account locked".to_string(),
                });
            }
        }
        self.inner.switch_identity(current, target)
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn scenario_install_then_drop_privileges() {
    let backends = memory_backends(&["dbus", "alsa", "gtk"]);
    let mut env = root_env();

    desktop_step().apply(&mut env, &backends).unwrap();

    assert_eq!(env.packages(), &packages(&["dbus", "alsa", "gtk"]));
    assert_eq!(env.current_identity(), &dev());
}

#[test]
fn scenario_reapply_is_idempotent() {
    let backends = memory_backends(&["dbus", "alsa", "gtk"]);
    let mut env = root_env();
    let step = desktop_step();

    step.apply(&mut env, &backends).unwrap();
    let after_first = env.clone();
    step.apply(&mut env, &backends).unwrap();

    assert_eq!(env, after_first);
    assert_eq!(env.packages(), &packages(&["dbus", "alsa", "gtk"]));
    assert_eq!(env.current_identity(), &dev());
}

#[test]
fn scenario_unknown_identity_leaves_environment_unchanged() {
    let backends = memory_backends(&["dbus"]);
    let mut env = root_env();
    let before = env.clone();
    let step = ProvisioningStep::new(
        Identity::new("nonexistent-user", "nonexistent-user"),
        vec![Action::Install(packages(&["dbus"]))],
        dev(),
    );

    let err = step.apply(&mut env, &backends).unwrap_err();

    assert!(
        matches!(err, ProvisionError::IdentitySwitch { ref identity, .. }
            if identity.user() == "nonexistent-user"),
        "expected IdentitySwitch, got: {:?}",
        err
    );
    assert_eq!(env, before);
}

#[test]
fn scenario_unresolved_package_still_restores_identity() {
    let backends = memory_backends(&["dbus"]);
    let mut env = root_env();
    let step = ProvisioningStep::new(
        Identity::root(),
        vec![Action::Install(packages(&["libfoo-does-not-exist"]))],
        dev(),
    );

    let err = step.apply(&mut env, &backends).unwrap_err();

    match &err {
        ProvisionError::Action { index, source, .. } => {
            assert_eq!(*index, 0);
            assert!(
                matches!(**source, ProvisionError::UnresolvedPackage { packages: ref names }
                    if names == &vec!["libfoo-does-not-exist".to_string()]),
                "expected UnresolvedPackage, got: {:?}",
                source
            );
        }
        other => panic!("expected Action error, got: {:?}", other),
    }
    assert!(err.identity_restored());
    assert_eq!(env.current_identity(), &dev());
    assert!(env.packages().is_empty());
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn noop_step_still_restores_identity() {
    let backends = memory_backends(&[]);
    let mut env = root_env();
    let step = ProvisioningStep::new(Identity::root(), Vec::new(), dev());

    step.apply(&mut env, &backends).unwrap();

    assert_eq!(env.current_identity(), &dev());
}

#[test]
fn already_installed_packages_skip_the_package_manager() {
    let pm = RecordingPackageManager::new();
    pm.installed.lock().unwrap().extend_from(&packages(&["dbus"]));
    let requests = Arc::clone(&pm.requests);
    let backends = Backends::new(
        Box::new(StaticIdentityBackend::new([Identity::root(), dev()])),
        Box::new(pm),
    );
    let mut env = Environment::open(None, dev(), &backends).unwrap();
    let step = ProvisioningStep::new(
        Identity::root(),
        vec![Action::Install(packages(&["dbus", "gtk"]))],
        dev(),
    );

    step.apply(&mut env, &backends).unwrap();
    step.apply(&mut env, &backends).unwrap();

    assert_eq!(env.packages(), &packages(&["dbus", "gtk"]));
    assert_eq!(*requests.lock().unwrap(), vec![packages(&["gtk"])]);
}

#[test]
fn installs_are_monotonic() {
    let backends = Backends::new(
        Box::new(StaticIdentityBackend::new([Identity::root(), dev()])),
        Box::new(MemoryPackageManager::new(packages(&["dbus", "gtk"]), packages(&["bash"]))),
    );
    let mut env = Environment::open(None, Identity::root(), &backends).unwrap();
    let before = env.packages().clone();

    ProvisioningStep::new(Identity::root(), vec![Action::Install(packages(&["gtk"]))], dev())
        .apply(&mut env, &backends)
        .unwrap();

    assert!(env.packages().is_superset(&before));
    assert_eq!(env.packages(), &packages(&["bash", "gtk"]));
}

#[test]
fn failing_action_stops_later_actions() {
    let backends = Backends::new(
        Box::new(StaticIdentityBackend::new([Identity::root(), dev()])),
        Box::new(RecordingPackageManager::new()),
    );
    let mut env = root_env();
    let step = ProvisioningStep::new(
        Identity::root(),
        vec![
            Action::Install(packages(&["dbus"])),
            Action::Install(packages(&["broken"])),
            Action::Install(packages(&["gtk"])),
        ],
        dev(),
    );

    let err = step.apply(&mut env, &backends).unwrap_err();

    match &err {
        ProvisionError::Action { index, action, source } => {
            assert_eq!(*index, 1);
            assert_eq!(action, "install: broken");
            assert!(matches!(**source, ProvisionError::PackageManager { .. }));
        }
        other => panic!("expected Action error, got: {:?}", other),
    }
    assert_eq!(env.packages(), &packages(&["dbus"]));
    assert_eq!(env.current_identity(), &dev());
}

#[test]
fn install_as_unprivileged_identity_fails_and_restores() {
    let backends = memory_backends(&["dbus"]);
    let mut env = root_env();
    let step = ProvisioningStep::new(
        Identity::root(),
        vec![Action::User(dev()), Action::Install(packages(&["dbus"]))],
        Identity::root(),
    );

    let err = step.apply(&mut env, &backends).unwrap_err();

    assert!(matches!(err, ProvisionError::Action { index: 1, .. }), "got: {:?}", err);
    assert_eq!(env.current_identity(), &Identity::root());
    assert!(env.packages().is_empty());
}

#[test]
fn mid_step_switch_failure_is_reported_as_action() {
    let backends = memory_backends(&[]);
    let mut env = root_env();
    let step = ProvisioningStep::new(
        Identity::root(),
        vec![Action::User(Identity::new("ghost", "ghost"))],
        dev(),
    );

    let err = step.apply(&mut env, &backends).unwrap_err();

    assert!(matches!(err, ProvisionError::Action { index: 0, .. }), "got: {:?}", err);
    assert_eq!(err.class(), rslayer::ErrorClass::IdentitySwitch);
    assert_eq!(env.current_identity(), &dev());
}

#[test]
fn restore_failure_is_most_severe_and_keeps_action_error() {
    let backends = Backends::new(
        Box::new(FlakyRestoreBackend {
            inner: StaticIdentityBackend::new([Identity::root(), dev()]),
            refuse: Identity::root(),
            seen: Mutex::new(0),
        }),
        Box::new(MemoryPackageManager::new(packages(&["dbus"]), PackageSet::new())),
    );
    let mut env = root_env();
    let step = ProvisioningStep::new(
        Identity::root(),
        vec![Action::Install(packages(&["libfoo-does-not-exist"]))],
        Identity::root(),
    );
    // First switch to root succeeds, the restore is refused.
    let err = step.apply(&mut env, &backends).unwrap_err();

    match &err {
        ProvisionError::IdentityRestore {
            identity,
            reason,
            action_error,
        } => {
            assert_eq!(identity, &Identity::root());
            assert_eq!(reason, "account locked");
            assert!(matches!(
                action_error.as_deref(),
                Some(ProvisionError::Action { .. })
            ));
        }
        other => panic!("expected IdentityRestore, got: {:?}", other),
    }
    assert_eq!(err.class(), rslayer::ErrorClass::IdentityRestore);
    assert!(!err.identity_restored());
}

#[test]
fn restore_failure_after_successful_actions() {
    let backends = Backends::new(
        Box::new(FlakyRestoreBackend {
            inner: StaticIdentityBackend::new([Identity::root(), dev()]),
            refuse: dev(),
            seen: Mutex::new(0),
        }),
        Box::new(MemoryPackageManager::new(packages(&["dbus"]), PackageSet::new())),
    );
    let mut env = root_env();
    let step = ProvisioningStep::new(
        Identity::root(),
        vec![
            Action::User(dev()),
            Action::User(Identity::root()),
            Action::Install(packages(&["dbus"])),
        ],
        dev(),
    );

    let err = step.apply(&mut env, &backends).unwrap_err();

    assert!(
        matches!(err, ProvisionError::IdentityRestore { action_error: None, .. }),
        "got: {:?}",
        err
    );
    assert_eq!(env.packages(), &packages(&["dbus"]));
    assert_eq!(env.current_identity(), &Identity::root());
}
