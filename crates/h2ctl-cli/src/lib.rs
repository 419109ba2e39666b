//! Command-line runtime for `h2ctl`.
//!
//! The runtime splits settings flags from the subcommand, loads layered
//! [`h2ctl_config::ServerSettings`], and drives the database lifecycle around
//! the requested command. Configuration loading, the database engine and the
//! shutdown signal can all be substituted in tests.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use h2ctl_lifecycle::DatabaseEngine;

mod commands;
mod config;
mod errors;
mod shutdown;


use commands::Host;
use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
pub(crate) use errors::AppError;
use shutdown::ShutdownSignal;

pub(crate) const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cli");

const SETTINGS_HELP: &str = "\
Settings flags go before the subcommand, for example
`h2ctl --port 9101 run -- mvn verify`. Every setting can also be supplied
through an H2CTL_* environment variable or a configuration file.";

#[derive(Parser, Debug)]
#[command(
    name = "h2ctl",
    version,
    about = "Runs an H2 database server for the duration of a build step",
    after_help = SETTINGS_HELP
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Validate the settings and print the connection URL.
    Check {
        /// Database name used in the connection URL.
        #[arg(long, default_value = "test")]
        database: String,
    },
    /// Start the database, run a command against it, then stop the database.
    Run {
        /// Database name used in the `JDBC_URL` handed to the command.
        #[arg(long, default_value = "test")]
        database: String,
        /// Command and arguments to run.
        #[arg(
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true,
            value_name = "COMMAND"
        )]
        command: Vec<OsString>,
    },
    /// Start the database and keep it running until interrupted.
    Serve {
        /// Database name used in the printed connection URL.
        #[arg(long, default_value = "test")]
        database: String,
    },
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with(args, stdout, stderr, &OrthoConfigLoader, Host::system())
}

pub(crate) fn run_with<I, W, Er, L, E, S>(
    args: I,
    stdout: &mut W,
    stderr: &mut Er,
    loader: &L,
    host: Host<E, S>,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    Er: Write,
    L: ConfigLoader,
    E: DatabaseEngine,
    S: ShutdownSignal,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);

    let cli = match Cli::try_parse_from(&split.command_arguments) {
        Ok(cli) => cli,
        // `--help` and `--version` are rendered as errors that belong on
        // stdout.
        Err(error) if !error.use_stderr() => {
            let _ = write!(stdout, "{error}");
            return ExitCode::SUCCESS;
        }
        Err(error) => {
            let _ = write!(stderr, "{}", AppError::CliUsage(error));
            return ExitCode::FAILURE;
        }
    };

    let result = loader
        .load(&split.config_arguments)
        .and_then(|settings| commands::execute(cli.command, &settings, host, stdout));
    match result {
        Ok(exit_code) => exit_code,
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}
