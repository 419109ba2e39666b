//! Error types for the CLI runtime.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use h2ctl_config::ConfigError;
use h2ctl_lifecycle::telemetry::TelemetryError;
use h2ctl_lifecycle::{ExitGuardError, TaskError};

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error("failed to install exit guard: {0}")]
    ExitGuard(#[from] ExitGuardError),
    #[error("failed to spawn {program}: {source}")]
    SpawnCommand { program: String, source: io::Error },
    #[error("no command given to run against the database")]
    MissingCommand,
    #[error("failed to wait for a shutdown signal: {0}")]
    ShutdownSignal(io::Error),
    #[error("failed to write output: {0}")]
    Output(io::Error),
}
