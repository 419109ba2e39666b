//! Bounded graceful shutdown of a launched server.
//!
//! A stop asks the engine to shut down, then polls until the handle reports
//! an exit and the socket stops accepting connections. When the grace period
//! runs out the server is terminated forcibly.

use std::fmt;
use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::LIFECYCLE_TARGET;
use crate::engine::HandleStatus;
use crate::error::ShutdownError;
use crate::probe::socket_is_reachable;
use crate::registry::{SharedHandle, lock};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a stop request concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was registered on the port.
    NotRunning,
    /// The server shut down within its grace period.
    Graceful,
    /// The grace period expired and the server was killed.
    Forced,
    /// Forced termination failed; the server may still be alive.
    Abandoned,
}

impl StopOutcome {
    /// Returns `true` when the server is known to be gone.
    #[must_use]
    pub fn is_stopped(self) -> bool {
        !matches!(self, Self::Abandoned)
    }
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::NotRunning => "not-running",
            Self::Graceful => "graceful",
            Self::Forced => "forced",
            Self::Abandoned => "abandoned",
        })
    }
}

/// Stops the server behind `handle`.
///
/// # Errors
///
/// Returns [`ShutdownError`] only when forced termination fails.
pub(crate) fn stop_server(
    handle: &SharedHandle,
    address: SocketAddr,
    grace: Duration,
) -> Result<StopOutcome, ShutdownError> {
    let port = address.port();
    if let Err(error) = lock(handle).request_shutdown() {
        warn!(
            target: LIFECYCLE_TARGET,
            port,
            error = %error,
            "graceful shutdown request failed"
        );
    } else if wait_for_shutdown(handle, address, grace) {
        return Ok(StopOutcome::Graceful);
    }

    debug!(target: LIFECYCLE_TARGET, port, "forcing server termination");
    lock(handle)
        .force_terminate()
        .map(|()| StopOutcome::Forced)
        .map_err(|source| ShutdownError { port, source })
}

/// Polls until the server has exited and released its socket.
///
/// Returns `false` when the grace period expires or the state cannot be
/// observed. At least one observation is made even with a zero grace period.
fn wait_for_shutdown(handle: &SharedHandle, address: SocketAddr, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        match shutdown_complete(handle, address) {
            Ok(true) => return true,
            Ok(false) => {}
            Err(error) => {
                warn!(
                    target: LIFECYCLE_TARGET,
                    port = address.port(),
                    error = %error,
                    "failed to observe server shutdown"
                );
                return false;
            }
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        thread::sleep(POLL_INTERVAL.min(remaining));
    }
}

fn shutdown_complete(handle: &SharedHandle, address: SocketAddr) -> std::io::Result<bool> {
    let exited = matches!(lock(handle).status()?, HandleStatus::Exited { .. });
    Ok(exited && !socket_is_reachable(address)?)
}
