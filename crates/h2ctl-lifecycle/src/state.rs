//! Server lifecycle state machine.

use std::fmt;

use thiserror::Error;

/// Lifecycle state of a managed server.
///
/// ```text
/// Stopped -> Starting -> Running -> Stopping -> Stopped
///               |
///               +-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    /// Not running; the initial and final state.
    Stopped,
    /// Engine launched, waiting for readiness.
    Starting,
    /// Accepting client connections.
    Running,
    /// Graceful shutdown requested.
    Stopping,
    /// Startup could not complete.
    Failed,
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal server state transition {from} -> {to}")]
pub struct InvalidTransition {
    /// State the server was in.
    pub from: ServerState,
    /// State that was requested.
    pub to: ServerState,
}

impl ServerState {
    /// Returns `true` when `next` directly follows `self`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Stopped, Self::Starting)
                | (Self::Starting, Self::Running)
                | (Self::Starting, Self::Failed)
                | (Self::Running, Self::Stopping)
                | (Self::Stopping, Self::Stopped)
        )
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when `next` does not follow `self`.
    pub fn transition(self, next: Self) -> Result<Self, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        };
        formatter.write_str(label)
    }
}
