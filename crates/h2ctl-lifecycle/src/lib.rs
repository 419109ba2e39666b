//! Lifecycle control for build-time H2 database servers.
//!
//! A build starts a database server before the steps that need it and stops
//! it afterwards, whether those steps succeed or fail. The
//! [`LifecycleController`] makes both operations idempotent and safe under
//! concurrent invocation:
//!
//! - a start on a port whose server already runs returns that server;
//! - a stop on a port with nothing registered is a no-op;
//! - starts and stops on one port are serialized through the [`Registry`];
//! - readiness is observed by probing the server's TCP socket.
//!
//! Servers are launched through the [`DatabaseEngine`] seam;
//! [`H2ProcessEngine`] runs `org.h2.tools.Server` in a child JVM. The
//! [`ExitGuard`] terminates registered servers when the host is signalled or
//! panics, and [`DatabaseTasks`] exposes start and stop to a task graph.

mod controller;
mod engine;
mod error;
mod exit_guard;
mod probe;
mod registry;
mod reporter;
mod shutdown;
mod state;
mod tasks;
pub mod telemetry;

pub use controller::LifecycleController;
pub use engine::{
    DatabaseEngine, EngineError, H2_SERVER_CLASS, H2ProcessEngine, HandleStatus, ServerHandle,
    h2_server_arguments,
};
pub use error::{LifecycleError, ShutdownError};
pub use exit_guard::{ExitGuard, ExitGuardError};
pub use probe::{
    PROBE_INTERVAL, ReadinessProbe, TcpProbe, port_is_free, reserve_ephemeral_port,
    socket_is_reachable,
};
pub use registry::{InstanceId, InstanceInfo, Registry, ServerInstance};
pub use reporter::{LifecycleReporter, StructuredLifecycleReporter};
pub use shutdown::StopOutcome;
pub use state::{InvalidTransition, ServerState};
pub use tasks::{DatabaseSession, DatabaseTasks, TaskError};

pub(crate) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");
pub(crate) const ENGINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::engine");

#[cfg(test)]
mod tests;
