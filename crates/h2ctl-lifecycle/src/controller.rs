//! Idempotent start and stop of database servers.
//!
//! Every start or stop for a port runs under that port's registry lock, so
//! concurrent callers observe a single total order. A start on a port whose
//! server is already running returns the existing instance; a stop on a port
//! with nothing registered is a no-op.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use h2ctl_config::ServerConfig;

use crate::LIFECYCLE_TARGET;
use crate::engine::{DatabaseEngine, EngineError, HandleStatus};
use crate::error::LifecycleError;
use crate::probe::{
    ReadinessProbe, TcpProbe, port_is_free, reserve_ephemeral_port, socket_is_reachable,
};
use crate::registry::{
    AlreadyPresent, InstanceInfo, Registry, ServerInstance, SharedHandle, lock,
};
use crate::reporter::{LifecycleReporter, StructuredLifecycleReporter};
use crate::shutdown::{StopOutcome, stop_server};
use crate::state::ServerState;

/// Starts and stops servers through a [`DatabaseEngine`].
pub struct LifecycleController<E, P = TcpProbe> {
    engine: E,
    probe: P,
    registry: Arc<Registry>,
    reporter: Arc<dyn LifecycleReporter>,
}

impl<E> LifecycleController<E, TcpProbe>
where
    E: DatabaseEngine,
{
    /// Builds a controller that records instances in `registry`.
    #[must_use]
    pub fn new(engine: E, registry: Arc<Registry>) -> Self {
        Self {
            engine,
            probe: TcpProbe::default(),
            registry,
            reporter: Arc::new(StructuredLifecycleReporter::new()),
        }
    }
}

impl<E, P> LifecycleController<E, P>
where
    E: DatabaseEngine,
    P: ReadinessProbe,
{
    /// Replaces the readiness probe.
    #[must_use]
    pub fn with_probe<Q>(self, probe: Q) -> LifecycleController<E, Q>
    where
        Q: ReadinessProbe,
    {
        LifecycleController {
            engine: self.engine,
            probe,
            registry: self.registry,
            reporter: self.reporter,
        }
    }

    /// Replaces the lifecycle reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn LifecycleReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Registry shared with this controller.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Starts a server for `config`, or returns the one already running.
    ///
    /// A `port` of `0` reserves an ephemeral loopback port first; such
    /// requests always launch a new server.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ConfigurationConflict`] when a server on the
    /// port was started with different settings,
    /// [`LifecycleError::PortInUse`] when an unmanaged process holds the
    /// port, and [`LifecycleError::StartTimeout`] when the server does not
    /// accept connections within the configured timeout.
    pub fn start(&self, config: &ServerConfig) -> Result<InstanceInfo, LifecycleError> {
        self.reporter.start_requested(config);
        self.start_locked(config).inspect_err(|error| {
            self.reporter.start_failed(error.port().unwrap_or(config.port()), error);
        })
    }

    /// Stops the server on `port`.
    ///
    /// Never fails: problems are logged and reflected in the outcome.
    pub fn stop(&self, port: u16) -> StopOutcome {
        let port_lock = self.registry.port_lock(port);
        let outcome = {
            let _serialized = lock(&port_lock);
            self.stop_serialized(port)
        };
        self.registry.release_port_lock(port, port_lock);
        outcome
    }

    fn stop_serialized(&self, port: u16) -> StopOutcome {
        let Some(ticket) = self.begin_stop(port) else {
            debug!(
                target: LIFECYCLE_TARGET,
                port,
                "stop requested but nothing is running"
            );
            self.reporter.stop_completed(port, StopOutcome::NotRunning);
            return StopOutcome::NotRunning;
        };

        let config = &ticket.instance.config;
        let outcome = match stop_server(
            &ticket.handle,
            config.probe_address(),
            config.shutdown_grace(),
        ) {
            Ok(outcome) => outcome,
            Err(error) => {
                self.reporter.stop_failed(&error);
                StopOutcome::Abandoned
            }
        };

        if let Some(mut instance) = self.registry.remove(port, ticket.instance.id) {
            if let Err(error) = instance.advance(ServerState::Stopped) {
                warn!(
                    target: LIFECYCLE_TARGET,
                    port,
                    error = %error,
                    "unexpected state after stop"
                );
            }
        }
        self.reporter.stop_completed(port, outcome);
        outcome
    }

    /// Snapshot of the server on `port`, if any.
    #[must_use]
    pub fn status(&self, port: u16) -> Option<InstanceInfo> {
        self.registry.get(port)
    }

    /// Snapshots of every running server ordered by port.
    #[must_use]
    pub fn running(&self) -> Vec<InstanceInfo> {
        self.registry
            .snapshot()
            .into_iter()
            .filter(|info| info.state == ServerState::Running)
            .collect()
    }

    /// Stops every registered server.
    pub fn stop_all(&self) -> Vec<(u16, StopOutcome)> {
        self.registry
            .ports()
            .into_iter()
            .map(|port| (port, self.stop(port)))
            .collect()
    }

    fn start_locked(&self, config: &ServerConfig) -> Result<InstanceInfo, LifecycleError> {
        let resolved = resolve_port(config)?;
        let port = resolved.port();
        let port_lock = self.registry.port_lock(port);
        let result = {
            let _serialized = lock(&port_lock);
            self.start_serialized(&resolved)
        };
        self.registry.release_port_lock(port, port_lock);
        result
    }

    fn start_serialized(&self, config: &ServerConfig) -> Result<InstanceInfo, LifecycleError> {
        let port = config.port();
        if let Some(existing) = self.registry.get(port) {
            return match existing.config.first_difference(config) {
                None => {
                    debug!(
                        target: LIFECYCLE_TARGET,
                        port,
                        instance = %existing.id,
                        "server already running; reusing instance"
                    );
                    Ok(existing)
                }
                Some(field) => Err(LifecycleError::ConfigurationConflict { port, field }),
            };
        }

        ensure_port_available(config)?;
        let state = ServerState::Stopped.transition(ServerState::Starting)?;
        let handle = self.engine.launch(config).map_err(|source| match source {
            EngineError::PortInUse { port } => LifecycleError::PortInUse { port },
            source => LifecycleError::EngineLaunch { port, source },
        })?;

        let instance = ServerInstance::new(config.clone(), state, handle);
        let id = instance.id();
        let shared = instance.handle();
        self.registry
            .try_insert(instance)
            .map_err(|AlreadyPresent(_)| LifecycleError::PortInUse { port })?;
        info!(
            target: LIFECYCLE_TARGET,
            port,
            instance = %id,
            timeout_ms = config.start_timeout().as_millis(),
            "engine launched; waiting for readiness"
        );

        if self.probe.wait_ready(config.probe_address(), config.start_timeout()) {
            let info = self
                .registry
                .update(port, |instance| instance.advance(ServerState::Running))
                .ok_or(LifecycleError::Interrupted { port })??;
            self.reporter.server_ready(&info);
            return Ok(info);
        }

        if let Some(mut instance) = self.registry.remove(port, id) {
            if let Err(error) = instance.advance(ServerState::Failed) {
                warn!(target: LIFECYCLE_TARGET, port, error = %error, "unexpected state after timeout");
            }
        }
        let exit_code = match lock(&shared).status() {
            Ok(HandleStatus::Exited { code }) => Some(code),
            Ok(HandleStatus::Running) | Err(_) => None,
        };
        spawn_cleanup(shared, config);
        Err(exit_code.map_or(
            LifecycleError::StartTimeout {
                port,
                timeout: config.start_timeout(),
            },
            |code| LifecycleError::EngineExited { port, code },
        ))
    }

    fn begin_stop(&self, port: u16) -> Option<StopTicket> {
        let advanced = self.registry.update(port, |instance| {
            instance
                .advance(ServerState::Stopping)
                .map(|info| StopTicket {
                    instance: info,
                    handle: instance.handle(),
                })
        })?;
        match advanced {
            Ok(ticket) => Some(ticket),
            Err(error) => {
                warn!(
                    target: LIFECYCLE_TARGET,
                    port,
                    error = %error,
                    "server cannot be stopped from its current state"
                );
                None
            }
        }
    }
}

struct StopTicket {
    instance: InstanceInfo,
    handle: SharedHandle,
}

fn resolve_port(config: &ServerConfig) -> Result<ServerConfig, LifecycleError> {
    if config.port() != 0 {
        return Ok(config.clone());
    }
    let port = reserve_ephemeral_port(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .map_err(|source| LifecycleError::PortReservation { source })?;
    debug!(target: LIFECYCLE_TARGET, port, "reserved ephemeral port");
    Ok(config.with_port(port))
}

fn ensure_port_available(config: &ServerConfig) -> Result<(), LifecycleError> {
    let port = config.port();
    let probe_error = |source| LifecycleError::PortProbe { port, source };
    let free = port_is_free(config.bind_address()).map_err(probe_error)?;
    if !free || socket_is_reachable(config.probe_address()).map_err(probe_error)? {
        return Err(LifecycleError::PortInUse { port });
    }
    Ok(())
}

/// Stops a half-started server off the caller's thread.
fn spawn_cleanup(handle: SharedHandle, config: &ServerConfig) {
    let address = config.probe_address();
    let grace = config.shutdown_grace();
    let port = address.port();
    let cleanup = move || {
        if let Err(error) = stop_server(&handle, address, grace) {
            warn!(
                target: LIFECYCLE_TARGET,
                port,
                error = %error,
                "failed to clean up timed-out server"
            );
        }
    };
    let spawned = thread::Builder::new()
        .name(format!("h2ctl-cleanup-{port}"))
        .spawn(cleanup.clone());
    if let Err(error) = spawned {
        warn!(
            target: LIFECYCLE_TARGET,
            port,
            error = %error,
            "cleanup thread unavailable; cleaning up inline"
        );
        cleanup();
    }
}
