//! Best-effort termination of managed servers when the host exits abnormally.
//!
//! The guard covers termination signals and panics. A hard kill of the host
//! (`SIGKILL`, power loss) bypasses every hook, so servers can still be
//! orphaned in that case.

use std::io;
use std::panic;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::LIFECYCLE_TARGET;
use crate::registry::{Registry, lock};

/// Errors raised while installing exit hooks.
#[derive(Debug, Error)]
pub enum ExitGuardError {
    /// Registering signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Terminates every registered server when the host goes down.
#[derive(Debug, Clone)]
pub struct ExitGuard {
    registry: Arc<Registry>,
}

impl ExitGuard {
    /// Builds a guard over `registry`.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Forcibly terminates and unregisters every server.
    ///
    /// Returns the number of servers that were terminated.
    pub fn terminate_all(&self) -> usize {
        terminate_registered(&self.registry)
    }

    /// Terminates all servers and exits with `128 + signal` when the host
    /// receives `SIGTERM`, `SIGINT`, `SIGQUIT` or `SIGHUP`.
    ///
    /// # Errors
    ///
    /// Returns [`ExitGuardError::Install`] when the handlers cannot be
    /// registered.
    #[cfg(unix)]
    pub fn install_signal_handler(&self) -> Result<(), ExitGuardError> {
        use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ExitGuardError::Install { source })?;
        let registry = Arc::clone(&self.registry);
        std::thread::Builder::new()
            .name(String::from("h2ctl-exit-guard"))
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    let terminated = terminate_registered(&registry);
                    info!(
                        target: LIFECYCLE_TARGET,
                        signal,
                        terminated,
                        "termination signal received; exiting"
                    );
                    std::process::exit(128 + signal);
                }
            })
            .map(drop)
            .map_err(|source| ExitGuardError::Install { source })
    }

    /// Signal handling is unavailable on this platform; only the panic hook
    /// protects managed servers.
    ///
    /// # Errors
    ///
    /// Never fails on this platform.
    #[cfg(not(unix))]
    pub fn install_signal_handler(&self) -> Result<(), ExitGuardError> {
        warn!(
            target: LIFECYCLE_TARGET,
            "signal-driven cleanup is not supported on this platform"
        );
        Ok(())
    }

    /// Terminates all servers before the previously installed panic hook runs.
    pub fn install_panic_hook(&self) {
        let registry = Arc::clone(&self.registry);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            let terminated = terminate_registered(&registry);
            if terminated > 0 {
                error!(
                    target: LIFECYCLE_TARGET,
                    terminated,
                    "panic detected; terminated managed servers"
                );
            }
            previous(panic_info);
        }));
    }
}

fn terminate_registered(registry: &Registry) -> usize {
    let mut terminated = 0;
    for instance in registry.drain() {
        let port = instance.port();
        match lock(&instance.handle()).force_terminate() {
            Ok(()) => terminated += 1,
            Err(error) => warn!(
                target: LIFECYCLE_TARGET,
                port,
                error = %error,
                "failed to terminate server during exit cleanup"
            ),
        }
    }
    terminated
}
