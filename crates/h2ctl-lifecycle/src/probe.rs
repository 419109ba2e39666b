//! Socket readiness probing.
//!
//! The prober answers one question: does anything accept TCP connections on
//! an address? Every attempt opens and immediately drops its stream, so no
//! probe connection outlives the call that made it.

use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

/// Pause between connection attempts while waiting for readiness.
pub const PROBE_INTERVAL: Duration = Duration::from_millis(50);

const CONNECT_TIMEOUT: Duration = Duration::from_millis(250);

/// Waits for a server to accept connections.
pub trait ReadinessProbe: Send + Sync {
    /// Returns `true` once `address` accepts a connection, or `false` when
    /// `timeout` elapses first.
    fn wait_ready(&self, address: SocketAddr, timeout: Duration) -> bool;
}

/// Probe that polls with plain TCP connection attempts.
#[derive(Debug, Clone, Copy)]
pub struct TcpProbe {
    interval: Duration,
}

impl TcpProbe {
    /// Builds a probe that retries every `interval`.
    #[must_use]
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::with_interval(PROBE_INTERVAL)
    }
}

impl ReadinessProbe for TcpProbe {
    fn wait_ready(&self, address: SocketAddr, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            if try_connect(address, remaining.min(CONNECT_TIMEOUT)).is_ok() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            thread::sleep(self.interval.min(remaining));
        }
    }
}

/// Checks whether `address` currently accepts connections.
///
/// # Errors
///
/// Returns the connection error when it does not simply mean "nothing is
/// listening" (for example a timeout or a permission problem).
pub fn socket_is_reachable(address: SocketAddr) -> io::Result<bool> {
    match try_connect(address, CONNECT_TIMEOUT) {
        Ok(()) => Ok(true),
        Err(error) if is_socket_available(&error) => Ok(false),
        Err(error) => Err(error),
    }
}

/// Checks whether `address` can be bound right now.
///
/// Returns `Ok(false)` when another socket already holds the address.
///
/// # Errors
///
/// Returns any bind error other than "address in use".
pub fn port_is_free(address: SocketAddr) -> io::Result<bool> {
    match TcpListener::bind(address) {
        Ok(listener) => {
            drop(listener);
            Ok(true)
        }
        Err(error) if error.kind() == io::ErrorKind::AddrInUse => Ok(false),
        Err(error) => Err(error),
    }
}

/// Asks the operating system for an unused port on `host`.
///
/// The port is released before returning, so a racing process could still
/// claim it; callers treat a later bind conflict as an ordinary start error.
///
/// # Errors
///
/// Returns the bind error when no port can be reserved.
pub fn reserve_ephemeral_port(host: IpAddr) -> io::Result<u16> {
    let listener = TcpListener::bind(SocketAddr::new(host, 0))?;
    Ok(listener.local_addr()?.port())
}

fn try_connect(address: SocketAddr, timeout: Duration) -> io::Result<()> {
    TcpStream::connect_timeout(&address, timeout).map(drop)
}

/// `ConnectionRefused` and `AddrNotAvailable` mean nothing is listening.
///
/// `ConnectionReset` is excluded: a peer accepted and then closed the
/// connection, so something was listening.
fn is_socket_available(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrNotAvailable
    )
}
