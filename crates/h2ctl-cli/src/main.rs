//! CLI entrypoint for `h2ctl`.
//!
//! The binary delegates to [`h2ctl_cli::run`], which loads layered settings,
//! parses the subcommand and drives the database lifecycle around it.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    // Unlocked handles: background threads log to stderr while commands run.
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    h2ctl_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
