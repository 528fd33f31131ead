#![allow(dead_code)]

use std::fs;
use std::sync::Mutex;

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use rslayer::ProvisionError;
use rslayer::config::{Profile, load_profile};
use rslayer::environment::{Backends, Environment};
use rslayer::executor::{CommandExecutor, CommandSpec, ExecutionResult};
use rslayer::identity::{Identity, StaticIdentityBackend};
use rslayer::package::{MemoryPackageManager, PackageSet};

/// Strips the common leading indentation from an indented YAML literal.
#[macro_export]
macro_rules! yaml {
    ($s:expr) => {
        $crate::helpers::dedent($s)
    };
}

pub fn dedent(s: &str) -> String {
    let indent = s
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    s.lines()
        .map(|line| if line.len() >= indent { &line[indent..] } else { line.trim_start() })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Writes `yaml` to a temporary `profile.yaml` and loads it.
pub fn load_profile_from_yaml(yaml: impl AsRef<str>) -> Result<Profile, ProvisionError> {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = utf8(dir.path()).join("profile.yaml");
    fs::write(&path, yaml.as_ref()).expect("failed to write profile");
    load_profile(&path)
}

pub fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).expect("path should be valid UTF-8")
}

pub fn dev() -> Identity {
    Identity::primary("dev")
}

pub fn packages(names: &[&str]) -> PackageSet {
    PackageSet::parse(names).expect("valid package names")
}

/// Memory backends knowing `root` and `dev`, resolving `available`.
pub fn memory_backends(available: &[&str]) -> Backends {
    Backends::new(
        Box::new(StaticIdentityBackend::new([Identity::root(), dev()])),
        Box::new(MemoryPackageManager::new(packages(available), PackageSet::new())),
    )
}

/// Fresh environment: identity `root`, no packages.
pub fn root_env() -> Environment {
    Environment::new(Identity::root(), PackageSet::new())
}

/// Creates a minimal Debian-like rootfs with user/group databases and a
/// dpkg status file listing `installed`.
pub fn create_rootfs(root: &Utf8Path, installed: &[&str]) {
    fs::create_dir_all(root.join("etc")).unwrap();
    fs::create_dir_all(root.join("var/lib/dpkg")).unwrap();
    fs::write(
        root.join("etc/passwd"),
        "root:x:0:0:root:/root:/bin/bash\ndev:x:1000:1000::/home/dev:/bin/bash\n",
    )
    .unwrap();
    fs::write(root.join("etc/group"), "root:x:0:\naudio:x:29:dev\ndev:x:1000:\n").unwrap();
    let status: String = installed
        .iter()
        .map(|name| format!("Package: {}\nStatus: install ok installed\n\n", name))
        .collect();
    fs::write(root.join("var/lib/dpkg/status"), status).unwrap();
}

/// Records executed commands in order, optionally failing calls.
pub struct MockExecutor {
    calls: Mutex<Vec<CommandSpec>>,
    /// Calls (0-indexed) that return an error.
    error_on: Vec<usize>,
    /// Calls (0-indexed) that exit with `exit_code`.
    exit_nonzero_on: Vec<usize>,
    exit_code: i32,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            error_on: Vec::new(),
            exit_nonzero_on: Vec::new(),
            exit_code: 100,
        }
    }

    pub fn erroring_on(call_index: usize) -> Self {
        Self {
            error_on: vec![call_index],
            ..Self::new()
        }
    }

    /// Exits with apt's "not found" status (100) on the given calls.
    pub fn exiting_nonzero_on(calls: &[usize]) -> Self {
        Self::exiting_with(100, calls)
    }

    pub fn exiting_with(code: i32, calls: &[usize]) -> Self {
        Self {
            exit_nonzero_on: calls.to_vec(),
            exit_code: code,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl CommandExecutor for MockExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
        let mut calls = self.calls.lock().unwrap();
        let index = calls.len();
        calls.push(spec.clone());
        drop(calls);

        if self.error_on.contains(&index) {
            anyhow::bail!("simulated failure on call {}", index);
        }
        if self.exit_nonzero_on.contains(&index) {
            return Ok(ExecutionResult {
                status: Some(exit_status(self.exit_code)),
            });
        }
        Ok(ExecutionResult {
            status: Some(exit_status(0)),
        })
    }
}

#[cfg(unix)]
fn exit_status(code: i32) -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(code << 8)
}
