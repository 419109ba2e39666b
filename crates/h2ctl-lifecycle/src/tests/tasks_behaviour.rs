//! Behavioural tests for the task-graph integration.

use std::cell::RefCell;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use rstest::{fixture, rstest};
use rstest_bdd_macros::{given, scenario, then, when};

use h2ctl_config::{Credentials, ServerSettings};

use crate::controller::LifecycleController;
use crate::error::LifecycleError;
use crate::probe::socket_is_reachable;
use crate::registry::{InstanceInfo, Registry};
use crate::shutdown::StopOutcome;
use crate::state::ServerState;
use crate::tasks::{DatabaseTasks, TaskError};
use crate::tests::support::{EngineBehaviour, LoopbackEngine, free_port, loopback_config};

type StepResult = Result<(), String>;
type Controller = Arc<LifecycleController<LoopbackEngine>>;

fn cooperative_controller() -> Controller {
    Arc::new(LifecycleController::new(
        LoopbackEngine::new(EngineBehaviour::Cooperative),
        Arc::new(Registry::new()),
    ))
}

fn reachable(port: u16) -> bool {
    socket_is_reachable(SocketAddr::from((Ipv4Addr::LOCALHOST, port))).expect("probe loopback")
}

struct TasksWorld {
    controller: Controller,
    tasks: Option<DatabaseTasks<LoopbackEngine>>,
    rejected: Option<TaskError>,
    step_result: Option<Result<StepResult, TaskError>>,
    observed: Option<InstanceInfo>,
    listener: Option<TcpListener>,
}

impl TasksWorld {
    fn tasks(&self) -> Result<&DatabaseTasks<LoopbackEngine>, String> {
        self.tasks
            .as_ref()
            .ok_or_else(|| String::from("no database tasks configured"))
    }

    fn run(&mut self, outcome: StepResult) -> StepResult {
        let mut observed = None;
        let result = self.tasks()?.run_step(|info| {
            observed = Some(info.clone());
            outcome
        });
        self.observed = observed;
        self.step_result = Some(result);
        Ok(())
    }
}

#[fixture]
fn world() -> RefCell<TasksWorld> {
    RefCell::new(TasksWorld {
        controller: cooperative_controller(),
        tasks: None,
        rejected: None,
        step_result: None,
        observed: None,
        listener: None,
    })
}

#[given("database tasks on port {port}")]
fn given_tasks(world: &RefCell<TasksWorld>, port: u16) {
    let mut world = world.borrow_mut();
    let controller = Arc::clone(&world.controller);
    world.tasks = Some(DatabaseTasks::new(controller, loopback_config(port)));
}

#[given("another process listens on port {port}")]
fn given_listener(world: &RefCell<TasksWorld>, port: u16) -> StepResult {
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
        .map_err(|error| error.to_string())?;
    world.borrow_mut().listener = Some(listener);
    Ok(())
}

#[given("database settings whose start timeout is {millis} milliseconds")]
fn given_settings(world: &RefCell<TasksWorld>, millis: i64) {
    let mut world = world.borrow_mut();
    let settings = ServerSettings {
        start_timeout_ms: millis,
        ..ServerSettings::default()
    };
    match DatabaseTasks::from_settings(Arc::clone(&world.controller), &settings) {
        Ok(tasks) => world.tasks = Some(tasks),
        Err(error) => world.rejected = Some(error),
    }
}

#[when("a build step runs")]
fn when_step_runs(world: &RefCell<TasksWorld>) -> StepResult {
    world.borrow_mut().run(Ok(()))
}

#[when("a failing build step runs")]
fn when_failing_step_runs(world: &RefCell<TasksWorld>) -> StepResult {
    world
        .borrow_mut()
        .run(Err(String::from("assertion failed in integration test")))
}

#[then("the build step saw a running server on port {port}")]
fn then_step_saw_server(world: &RefCell<TasksWorld>, port: u16) {
    let world = world.borrow();
    let info = world.observed.as_ref().expect("build step should have run");
    assert_eq!(info.port, port);
    assert_eq!(info.state, ServerState::Running);
    assert!(matches!(world.step_result, Some(Ok(Ok(())))));
}

#[then("the build step failure is propagated")]
fn then_failure_propagated(world: &RefCell<TasksWorld>) {
    let world = world.borrow();
    let Some(Ok(Err(message))) = &world.step_result else {
        panic!("expected the step's own failure, got {:?}", world.step_result);
    };
    assert!(message.contains("assertion failed"));
}

#[then("the database on port {port} has been stopped")]
fn then_stopped(world: &RefCell<TasksWorld>, port: u16) {
    assert!(world.borrow().controller.status(port).is_none());
    assert!(!reachable(port));
}

#[then("the build step did not run")]
fn then_step_skipped(world: &RefCell<TasksWorld>) {
    assert!(world.borrow().observed.is_none());
}

#[then("the task error mentions {text}")]
fn then_error_mentions(world: &RefCell<TasksWorld>, text: String) {
    let world = world.borrow();
    let needle = text.trim_matches('"');
    let Some(Err(error)) = &world.step_result else {
        panic!("expected a task error, got {:?}", world.step_result);
    };
    assert!(matches!(error, TaskError::Start(_)));
    assert!(
        error.to_string().contains(needle),
        "expected '{needle}' in '{error}'"
    );
}

#[then("the tasks are rejected naming {field}")]
fn then_rejected(world: &RefCell<TasksWorld>, field: String) {
    let world = world.borrow();
    let Some(TaskError::Configuration(error)) = &world.rejected else {
        panic!("expected a configuration error, got {:?}", world.rejected);
    };
    assert_eq!(error.field(), field);
    assert!(world.tasks.is_none());
}

#[scenario(
    path = "tests/features/database_tasks.feature",
    name = "Build step runs against a live database"
)]
fn step_with_database(world: RefCell<TasksWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/database_tasks.feature",
    name = "Failing build step still stops the database"
)]
fn failing_step_stops_database(world: RefCell<TasksWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/database_tasks.feature",
    name = "Start failure aborts the build step"
)]
fn start_failure_aborts_step(world: RefCell<TasksWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/database_tasks.feature",
    name = "Unusable settings are rejected before anything starts"
)]
fn invalid_settings_rejected(world: RefCell<TasksWorld>) {
    drop(world);
}

#[rstest]
fn dropping_a_session_stops_the_server() {
    let controller = cooperative_controller();
    let port = free_port();
    let tasks = DatabaseTasks::new(Arc::clone(&controller), loopback_config(port));

    let session = tasks.session().expect("session starts");
    assert_eq!(session.info().port, port);
    assert!(reachable(port));
    drop(session);

    assert!(controller.status(port).is_none());
    assert!(!reachable(port));
}

#[rstest]
fn panicking_step_still_stops_the_server() {
    let controller = cooperative_controller();
    let port = free_port();
    let tasks = DatabaseTasks::new(Arc::clone(&controller), loopback_config(port));

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        tasks.run_step(|_| panic!("build step crashed"))
    }));

    assert!(outcome.is_err());
    assert!(controller.status(port).is_none());
}

#[rstest]
fn ephemeral_tasks_stop_the_port_they_started() {
    let tasks = DatabaseTasks::new(cooperative_controller(), loopback_config(0));

    let info = tasks.start_database().expect("start");
    assert_ne!(info.port, 0);
    assert_eq!(tasks.stop_database(), StopOutcome::Graceful);
    assert_eq!(tasks.stop_database(), StopOutcome::NotRunning);
    assert!(!reachable(info.port));
}

#[rstest]
fn rejected_tasks_leave_another_owners_server_running() {
    let controller = cooperative_controller();
    let port = free_port();
    let owner = DatabaseTasks::new(Arc::clone(&controller), loopback_config(port));
    let other = DatabaseTasks::new(
        Arc::clone(&controller),
        loopback_config(port).with_credentials(Credentials::new("sa", "pw")),
    );
    owner.start_database().expect("owner starts");

    let error = other
        .start_database()
        .expect_err("credentials differ from the running server");
    assert!(
        matches!(
            error,
            TaskError::Start(LifecycleError::ConfigurationConflict { .. })
        ),
        "unexpected error: {error:?}"
    );
    assert_eq!(other.stop_database(), StopOutcome::NotRunning);
    assert!(controller.status(port).is_some());
    assert!(reachable(port));

    assert_eq!(owner.stop_database(), StopOutcome::Graceful);
    assert!(!reachable(port));
}
