//! Waiting for the operator to stop `h2ctl serve`.

use std::io;

/// Blocks until the host should stop serving.
///
/// `register` runs before the server starts so a request arriving during
/// startup is held until `wait` instead of killing the process.
pub(crate) trait ShutdownSignal {
    /// Starts listening for shutdown requests.
    fn register(&mut self) -> io::Result<()>;

    /// Returns once shutdown has been requested.
    fn wait(&mut self) -> io::Result<()>;
}

/// Waits for `SIGTERM`, `SIGINT` or `SIGHUP`.
#[cfg(unix)]
#[derive(Default)]
pub(crate) struct SystemShutdownSignal {
    signals: Option<signal_hook::iterator::Signals>,
}

#[cfg(unix)]
impl SystemShutdownSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[cfg(unix)]
impl ShutdownSignal for SystemShutdownSignal {
    fn register(&mut self) -> io::Result<()> {
        use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        if self.signals.is_none() {
            self.signals = Some(Signals::new([SIGTERM, SIGINT, SIGHUP])?);
        }
        Ok(())
    }

    fn wait(&mut self) -> io::Result<()> {
        self.register()?;
        let Some(signals) = self.signals.as_mut() else {
            return Ok(());
        };
        if let Some(signal) = signals.forever().next() {
            tracing::info!(target: crate::CLI_TARGET, signal, "shutdown requested");
        }
        Ok(())
    }
}

/// Waits for standard input to close.
#[cfg(not(unix))]
#[derive(Default)]
pub(crate) struct SystemShutdownSignal;

#[cfg(not(unix))]
impl SystemShutdownSignal {
    pub(crate) fn new() -> Self {
        Self
    }
}

#[cfg(not(unix))]
impl ShutdownSignal for SystemShutdownSignal {
    fn register(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn wait(&mut self) -> io::Result<()> {
        io::copy(&mut io::stdin().lock(), &mut io::sink()).map(drop)
    }
}
