pub mod cli;
pub mod config;
pub mod environment;
pub mod error;
pub mod executor;
pub mod identity;
pub mod package;
pub mod privilege;
pub mod sequence;
pub mod step;

pub use error::{ErrorClass, ProvisionError};

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

use crate::environment::Environment;
use crate::executor::CommandExecutor;

/// Installs a global `tracing` subscriber at the given level.
pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(filter).finish(),
    )
    .context("failed to set global default tracing subscriber")
}

/// Returns the error class of the first `ProvisionError` in the chain,
/// or `General` when there is none.
pub fn error_class(err: &anyhow::Error) -> ErrorClass {
    err.chain()
        .find_map(|e| e.downcast_ref::<ProvisionError>())
        .map(ProvisionError::class)
        .unwrap_or(ErrorClass::General)
}

/// Loads, validates, and applies a profile.
///
/// Returns the final environment on success.
pub fn run_apply(opts: &cli::ApplyArgs, executor: Arc<dyn CommandExecutor>) -> Result<Environment> {
    let profile = config::load_profile(&opts.file)
        .with_context(|| format!("failed to load profile from {}", opts.file))?;
    profile.validate().context("profile validation failed")?;

    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("apply", %run_id);
    let _enter = span.enter();

    if let Some(image) = &profile.base.image {
        info!("base image: {}", image);
    }
    if opts.dry_run {
        info!("dry run: installs are skipped, read-only package queries still run");
    }

    let backends = profile
        .backend
        .build(profile.rootfs.as_deref(), executor)
        .context("failed to set up backend")?;
    let mut env = Environment::open(
        profile.rootfs.clone(),
        profile.base.identity.clone(),
        &backends,
    )
    .context("failed to open environment")?;

    profile.sequence().run(&mut env, &backends)?;

    info!(
        "provisioning completed: identity={}, packages: {}",
        env.current_identity(),
        env.packages()
    );
    Ok(env)
}

/// Loads and validates a profile without touching any environment.
pub fn run_validate(opts: &cli::ValidateArgs) -> Result<()> {
    let profile = config::load_profile(&opts.file)?;
    profile.validate().context("profile validation failed")?;
    info!("validation successful:\n{:#?}", profile);
    Ok(())
}
