//! Execution of the `check`, `run` and `serve` subcommands.

use std::ffi::OsString;
use std::io::Write;
use std::process::{Command, ExitCode, ExitStatus};
use std::sync::Arc;

use tracing::info;

use h2ctl_config::{ServerConfig, ServerSettings};
use h2ctl_lifecycle::{
    DatabaseEngine, DatabaseTasks, ExitGuard, H2ProcessEngine, InstanceInfo, LifecycleController,
    Registry, telemetry,
};

use crate::shutdown::{ShutdownSignal, SystemShutdownSignal};
use crate::{AppError, CLI_TARGET, CliCommand};

/// Environment variable holding the JDBC URL handed to `run` commands.
pub(crate) const JDBC_URL_ENV: &str = "JDBC_URL";
/// Environment variable holding the server port handed to `run` commands.
pub(crate) const DATABASE_PORT_ENV: &str = "DATABASE_PORT";

/// Process-level collaborators for command execution.
pub(crate) struct Host<E, S> {
    pub(crate) engine: E,
    pub(crate) shutdown: S,
    /// Whether to install the exit guard's signal handler and panic hook.
    pub(crate) exit_hooks: bool,
}

impl Host<H2ProcessEngine, SystemShutdownSignal> {
    pub(crate) fn system() -> Self {
        Self {
            engine: H2ProcessEngine::new(),
            shutdown: SystemShutdownSignal::new(),
            exit_hooks: true,
        }
    }
}

pub(crate) fn execute<E, S, W>(
    command: CliCommand,
    settings: &ServerSettings,
    host: Host<E, S>,
    stdout: &mut W,
) -> Result<ExitCode, AppError>
where
    E: DatabaseEngine,
    S: ShutdownSignal,
    W: Write,
{
    telemetry::initialise(settings)?;
    let config = settings.validate()?;
    match command {
        CliCommand::Check { database } => check(&config, &database, stdout),
        CliCommand::Run { database, command } => run(host, config, &database, &command),
        CliCommand::Serve { database } => serve(host, config, &database, stdout),
    }
}

fn check<W: Write>(
    config: &ServerConfig,
    database: &str,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    writeln!(stdout, "{}", config.connection_url(database)).map_err(AppError::Output)?;
    Ok(ExitCode::SUCCESS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitHooks {
    None,
    PanicOnly,
    SignalsAndPanic,
}

fn database_tasks<E>(
    engine: E,
    config: ServerConfig,
    hooks: ExitHooks,
) -> Result<DatabaseTasks<E>, AppError>
where
    E: DatabaseEngine,
{
    let registry = Arc::new(Registry::new());
    let guard = ExitGuard::new(Arc::clone(&registry));
    if hooks == ExitHooks::SignalsAndPanic {
        guard.install_signal_handler()?;
    }
    if hooks != ExitHooks::None {
        guard.install_panic_hook();
    }
    let controller = Arc::new(LifecycleController::new(engine, registry));
    Ok(DatabaseTasks::new(controller, config))
}

fn run<E, S>(
    host: Host<E, S>,
    config: ServerConfig,
    database: &str,
    command: &[OsString],
) -> Result<ExitCode, AppError>
where
    E: DatabaseEngine,
{
    let hooks = if host.exit_hooks {
        ExitHooks::SignalsAndPanic
    } else {
        ExitHooks::None
    };
    let tasks = database_tasks(host.engine, config, hooks)?;
    let status = tasks.run_step(|info| run_child(command, info, database))??;
    Ok(exit_code_from_status(status))
}

fn run_child(
    command: &[OsString],
    info: &InstanceInfo,
    database: &str,
) -> Result<ExitStatus, AppError> {
    let Some((program, arguments)) = command.split_first() else {
        return Err(AppError::MissingCommand);
    };
    let program_name = program.to_string_lossy().into_owned();
    info!(
        target: CLI_TARGET,
        program = %program_name,
        port = info.port,
        "running build step"
    );
    let status = Command::new(program)
        .args(arguments)
        .env(JDBC_URL_ENV, info.connection_url(database))
        .env(DATABASE_PORT_ENV, info.port.to_string())
        .status()
        .map_err(|source| AppError::SpawnCommand {
            program: program_name.clone(),
            source,
        })?;
    info!(
        target: CLI_TARGET,
        program = %program_name,
        code = status.code(),
        "build step finished"
    );
    Ok(status)
}

fn serve<E, S, W>(
    host: Host<E, S>,
    config: ServerConfig,
    database: &str,
    stdout: &mut W,
) -> Result<ExitCode, AppError>
where
    E: DatabaseEngine,
    S: ShutdownSignal,
    W: Write,
{
    // `serve` waits for termination signals itself.
    let hooks = if host.exit_hooks {
        ExitHooks::PanicOnly
    } else {
        ExitHooks::None
    };
    let tasks = database_tasks(host.engine, config, hooks)?;
    let mut shutdown = host.shutdown;
    shutdown.register().map_err(AppError::ShutdownSignal)?;

    let session = tasks.session()?;
    writeln!(stdout, "{}", session.info().connection_url(database))
        .and_then(|()| stdout.flush())
        .map_err(AppError::Output)?;
    shutdown.wait().map_err(AppError::ShutdownSignal)?;
    drop(session);
    Ok(ExitCode::SUCCESS)
}

fn exit_code_from_status(status: ExitStatus) -> ExitCode {
    status
        .code()
        .and_then(|code| u8::try_from(code).ok())
        .map_or(ExitCode::FAILURE, ExitCode::from)
}
