//! Start and stop operations exposed to a build's task graph.
//!
//! A build wires [`DatabaseTasks::start_database`] before the steps that need
//! the database and [`DatabaseTasks::stop_database`] after them. Hosts with
//! scoped resources use [`DatabaseTasks::session`] or
//! [`DatabaseTasks::run_step`] instead, which stop the server however the
//! step ends.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{info, warn};

use h2ctl_config::{ConfigError, ServerConfig, ServerSettings};

use crate::LIFECYCLE_TARGET;
use crate::controller::LifecycleController;
use crate::engine::DatabaseEngine;
use crate::error::LifecycleError;
use crate::probe::{ReadinessProbe, TcpProbe};
use crate::registry::{InstanceInfo, lock};
use crate::shutdown::StopOutcome;

/// Errors that abort the dependent build step.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The configured settings are unusable.
    #[error("database configuration rejected: {0}")]
    Configuration(#[from] ConfigError),
    /// The server could not be started.
    #[error("database could not be started: {0}")]
    Start(#[from] LifecycleError),
}

/// Database operations bound to one validated configuration.
pub struct DatabaseTasks<E, P = TcpProbe> {
    controller: Arc<LifecycleController<E, P>>,
    config: ServerConfig,
    active_port: Mutex<Option<u16>>,
}

impl<E, P> DatabaseTasks<E, P>
where
    E: DatabaseEngine,
    P: ReadinessProbe,
{
    /// Binds `config` to `controller`.
    #[must_use]
    pub fn new(controller: Arc<LifecycleController<E, P>>, config: ServerConfig) -> Self {
        Self {
            controller,
            config,
            active_port: Mutex::new(None),
        }
    }

    /// Validates `settings` and binds the result to `controller`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Configuration`] when validation fails.
    pub fn from_settings(
        controller: Arc<LifecycleController<E, P>>,
        settings: &ServerSettings,
    ) -> Result<Self, TaskError> {
        Ok(Self::new(controller, settings.validate()?))
    }

    /// Configuration the tasks start servers with.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Starts the database, reusing a server that is already running.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Start`] when the server cannot be started.
    pub fn start_database(&self) -> Result<InstanceInfo, TaskError> {
        let info = self.controller.start(&self.config)?;
        *lock(&self.active_port) = Some(info.port);
        info!(
            target: LIFECYCLE_TARGET,
            port = info.port,
            url = %info.connection_url("test"),
            "database available to build steps"
        );
        Ok(info)
    }

    /// Stops the database these tasks started or reused.
    ///
    /// Only the port of the last successful [`Self::start_database`] is
    /// stopped; a server another owner runs on the configured port is left
    /// alone. Failures are logged and never abort the build.
    pub fn stop_database(&self) -> StopOutcome {
        let Some(port) = lock(&self.active_port).take() else {
            return StopOutcome::NotRunning;
        };
        let outcome = self.controller.stop(port);
        if !outcome.is_stopped() {
            warn!(
                target: LIFECYCLE_TARGET,
                port,
                "database server may still be running after the build"
            );
        }
        outcome
    }

    /// Starts the database and returns a session that stops it when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Start`] when the server cannot be started.
    pub fn session(&self) -> Result<DatabaseSession<'_, E, P>, TaskError> {
        let info = self.start_database()?;
        Ok(DatabaseSession { tasks: self, info })
    }

    /// Runs `step` with the database up and stops it afterwards, including
    /// when `step` panics.
    ///
    /// The step's own result is returned untouched.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Start`] without running `step` when the server
    /// cannot be started.
    pub fn run_step<T>(&self, step: impl FnOnce(&InstanceInfo) -> T) -> Result<T, TaskError> {
        let session = self.session()?;
        Ok(step(session.info()))
    }
}

/// Running database whose server stops when the session is dropped.
pub struct DatabaseSession<'tasks, E, P = TcpProbe>
where
    E: DatabaseEngine,
    P: ReadinessProbe,
{
    tasks: &'tasks DatabaseTasks<E, P>,
    info: InstanceInfo,
}

impl<E, P> DatabaseSession<'_, E, P>
where
    E: DatabaseEngine,
    P: ReadinessProbe,
{
    /// Snapshot of the server taken when the session began.
    #[must_use]
    pub fn info(&self) -> &InstanceInfo {
        &self.info
    }
}

impl<E, P> Drop for DatabaseSession<'_, E, P>
where
    E: DatabaseEngine,
    P: ReadinessProbe,
{
    fn drop(&mut self) {
        self.tasks.stop_database();
    }
}
