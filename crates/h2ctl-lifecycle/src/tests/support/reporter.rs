//! Test double for [`LifecycleReporter`] that records events for assertions.

use std::sync::Mutex;

use h2ctl_config::ServerConfig;

use crate::error::{LifecycleError, ShutdownError};
use crate::registry::InstanceInfo;
use crate::reporter::LifecycleReporter;
use crate::shutdown::StopOutcome;

/// Lifecycle events observed during a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    StartRequested(u16),
    ServerReady(u16),
    StartFailed { port: u16, message: String },
    StopCompleted(u16, StopOutcome),
    StopFailed(u16),
}

#[derive(Debug, Default)]
pub struct RecordingLifecycleReporter {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingLifecycleReporter {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .push(event);
    }
}

impl LifecycleReporter for RecordingLifecycleReporter {
    fn start_requested(&self, config: &ServerConfig) {
        self.record(LifecycleEvent::StartRequested(config.port()));
    }

    fn server_ready(&self, info: &InstanceInfo) {
        self.record(LifecycleEvent::ServerReady(info.port));
    }

    fn start_failed(&self, port: u16, error: &LifecycleError) {
        self.record(LifecycleEvent::StartFailed {
            port,
            message: error.to_string(),
        });
    }

    fn stop_completed(&self, port: u16, outcome: StopOutcome) {
        self.record(LifecycleEvent::StopCompleted(port, outcome));
    }

    fn stop_failed(&self, error: &ShutdownError) {
        self.record(LifecycleEvent::StopFailed(error.port));
    }
}
