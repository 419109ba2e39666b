//! Shared doubles for the lifecycle test suites.

mod engine;
mod reporter;

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use h2ctl_config::{ServerConfig, ServerSettings};

use crate::probe::reserve_ephemeral_port;

pub use engine::{EngineBehaviour, LoopbackEngine};
pub use reporter::{LifecycleEvent, RecordingLifecycleReporter};

/// Port nothing currently listens on.
pub fn free_port() -> u16 {
    reserve_ephemeral_port(IpAddr::V4(Ipv4Addr::LOCALHOST)).expect("reserve ephemeral port")
}

/// Loopback configuration with timeouts suited to tests.
pub fn loopback_config(port: u16) -> ServerConfig {
    ServerSettings {
        port: u32::from(port),
        ..ServerSettings::default()
    }
    .validate()
    .expect("test settings should validate")
    .with_start_timeout(Duration::from_secs(2))
    .with_shutdown_grace(Duration::from_millis(300))
}
