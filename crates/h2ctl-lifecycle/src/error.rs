//! Error types raised by the lifecycle controller.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::engine::EngineError;
use crate::state::InvalidTransition;

/// Errors surfaced by [`LifecycleController::start`](crate::LifecycleController::start).
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Something outside the registry already listens on the port.
    #[error("port {port} is already in use by an unmanaged process")]
    PortInUse {
        /// Requested port.
        port: u16,
    },
    /// Checking whether the port was free failed.
    #[error("failed to check availability of port {port}: {source}")]
    PortProbe {
        /// Requested port.
        port: u16,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// No ephemeral port could be reserved for a `port = 0` request.
    #[error("failed to reserve an ephemeral port: {source}")]
    PortReservation {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The server did not accept connections in time.
    #[error("server on port {port} did not accept connections within {} ms", .timeout.as_millis())]
    StartTimeout {
        /// Requested port.
        port: u16,
        /// Configured start timeout.
        timeout: Duration,
    },
    /// The engine went away before it accepted connections.
    #[error("engine for port {port} exited before accepting connections ({})", describe_exit(*.code))]
    EngineExited {
        /// Requested port.
        port: u16,
        /// Exit code reported by the engine process.
        code: Option<i32>,
    },
    /// The engine could not be launched.
    #[error("failed to launch server on port {port}: {source}")]
    EngineLaunch {
        /// Requested port.
        port: u16,
        /// Engine failure.
        #[source]
        source: EngineError,
    },
    /// The exit guard terminated the server while it was starting.
    #[error("server on port {port} was terminated while starting")]
    Interrupted {
        /// Requested port.
        port: u16,
    },
    /// A running server on the port was started with different settings.
    #[error("server on port {port} is already running with a different '{field}'")]
    ConfigurationConflict {
        /// Requested port.
        port: u16,
        /// First setting that differs.
        field: &'static str,
    },
    /// The controller attempted an illegal state change.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

impl LifecycleError {
    /// Port the failed request targeted, when known.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::PortInUse { port }
            | Self::PortProbe { port, .. }
            | Self::StartTimeout { port, .. }
            | Self::EngineExited { port, .. }
            | Self::EngineLaunch { port, .. }
            | Self::Interrupted { port }
            | Self::ConfigurationConflict { port, .. } => Some(*port),
            Self::PortReservation { .. } | Self::InvalidTransition(_) => None,
        }
    }
}

fn describe_exit(code: Option<i32>) -> String {
    code.map_or_else(
        || String::from("terminated by signal"),
        |code| format!("exit code {code}"),
    )
}

/// Failure to bring a server down, even forcibly.
///
/// Graceful shutdown problems are logged and fall through to forced
/// termination; only a failed forced termination is reported.
#[derive(Debug, Error)]
#[error("failed to terminate server on port {port}: {source}")]
pub struct ShutdownError {
    /// Port of the server.
    pub port: u16,
    /// Underlying IO error.
    #[source]
    pub source: io::Error,
}
