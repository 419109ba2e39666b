//! Engine abstraction used by the lifecycle controller.
//!
//! The controller never talks to a database directly. It asks a
//! [`DatabaseEngine`] to launch a server for a validated configuration and
//! receives an opaque [`ServerHandle`] it can later shut down.

mod h2;

use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

use h2ctl_config::ServerConfig;

pub use h2::{H2_SERVER_CLASS, H2ProcessEngine, h2_server_arguments};

/// Launches database servers.
pub trait DatabaseEngine: Send + Sync {
    /// Starts a server bound to `config.port()`.
    ///
    /// Returning does not imply readiness; the controller probes separately.
    fn launch(&self, config: &ServerConfig) -> Result<Box<dyn ServerHandle>, EngineError>;
}

/// Observed status of a launched server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStatus {
    /// The server is still alive.
    Running,
    /// The server has gone away.
    Exited {
        /// Exit code when the server was a process that reported one.
        code: Option<i32>,
    },
}

/// Owned handle to one launched server.
pub trait ServerHandle: Send {
    /// Operating system process id, when the server is a separate process.
    fn pid(&self) -> Option<u32>;

    /// Asks the server to shut down gracefully without waiting.
    fn request_shutdown(&mut self) -> io::Result<()>;

    /// Reports whether the server is still alive.
    fn status(&mut self) -> io::Result<HandleStatus>;

    /// Terminates the server immediately and waits for it to go away.
    ///
    /// Calling this on a server that has already exited succeeds.
    fn force_terminate(&mut self) -> io::Result<()>;
}

/// Errors raised while launching a server.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not bind its listening socket.
    #[error("port {port} is already bound by another process")]
    PortInUse {
        /// Requested port.
        port: u16,
    },
    /// The data directory could not be prepared.
    #[error("failed to prepare data directory '{path}': {source}")]
    PrepareDataDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The engine process could not be spawned.
    #[error("failed to spawn engine '{program}': {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
