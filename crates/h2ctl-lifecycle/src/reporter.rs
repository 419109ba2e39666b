//! Structured reporting for server lifecycle events.

use std::sync::Arc;

use h2ctl_config::ServerConfig;

use crate::error::{LifecycleError, ShutdownError};
use crate::registry::InstanceInfo;
use crate::shutdown::StopOutcome;

const REPORTER_TARGET: &str = "h2ctl::lifecycle";

/// Observer notified as servers start and stop.
pub trait LifecycleReporter: Send + Sync {
    /// Invoked when a start request is received.
    fn start_requested(&self, config: &ServerConfig);

    /// Invoked once a newly launched server accepts connections.
    fn server_ready(&self, info: &InstanceInfo);

    /// Invoked when a start request fails.
    fn start_failed(&self, port: u16, error: &LifecycleError);

    /// Invoked when a stop request concludes.
    fn stop_completed(&self, port: u16, outcome: StopOutcome);

    /// Invoked when a server could not be terminated.
    fn stop_failed(&self, error: &ShutdownError);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn start_requested(&self, config: &ServerConfig) {
        (**self).start_requested(config);
    }

    fn server_ready(&self, info: &InstanceInfo) {
        (**self).server_ready(info);
    }

    fn start_failed(&self, port: u16, error: &LifecycleError) {
        (**self).start_failed(port, error);
    }

    fn stop_completed(&self, port: u16, outcome: StopOutcome) {
        (**self).stop_completed(port, outcome);
    }

    fn stop_failed(&self, error: &ShutdownError) {
        (**self).stop_failed(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl StructuredLifecycleReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredLifecycleReporter {
    fn start_requested(&self, config: &ServerConfig) {
        tracing::info!(
            target: REPORTER_TARGET,
            event = "start_requested",
            port = config.port(),
            in_memory = config.data_directory().is_none(),
            remote_clients = config.allow_remote_clients(),
            timeout_ms = config.start_timeout().as_millis(),
            "database start requested"
        );
    }

    fn server_ready(&self, info: &InstanceInfo) {
        tracing::info!(
            target: REPORTER_TARGET,
            event = "server_ready",
            instance = %info.id,
            port = info.port,
            pid = info.pid,
            "database server ready"
        );
    }

    fn start_failed(&self, port: u16, error: &LifecycleError) {
        tracing::error!(
            target: REPORTER_TARGET,
            event = "start_failed",
            port,
            error = %error,
            "database server failed to start"
        );
    }

    fn stop_completed(&self, port: u16, outcome: StopOutcome) {
        tracing::info!(
            target: REPORTER_TARGET,
            event = "stop_completed",
            port,
            outcome = %outcome,
            "database stop completed"
        );
    }

    fn stop_failed(&self, error: &ShutdownError) {
        tracing::warn!(
            target: REPORTER_TARGET,
            event = "stop_failed",
            port = error.port,
            error = %error,
            "database server could not be terminated"
        );
    }
}
