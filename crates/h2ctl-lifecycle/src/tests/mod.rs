//! Test suites for the lifecycle controller.

pub(crate) mod support;
mod tasks_behaviour;
