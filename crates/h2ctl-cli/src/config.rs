//! Configuration loading helpers for the `h2ctl` CLI.
//!
//! Settings flags precede the subcommand (`h2ctl --port 9101 run -- mvn
//! verify`). The splitter hands those flags to `ortho_config` and leaves the
//! subcommand and its arguments for `clap`.

use std::ffi::{OsStr, OsString};

use h2ctl_config::ServerSettings;
use ortho_config::OrthoConfig;

use crate::AppError;

/// Settings flags recognised before the subcommand, and whether each takes a
/// value.
///
/// Must list every field of [`ServerSettings`] plus `--config-path`.
const CONFIG_CLI_FLAGS: &[(&str, bool)] = &[
    ("--config-path", true),
    ("--port", true),
    ("--data-directory", true),
    ("--username", true),
    ("--password", true),
    ("--allow-remote-clients", false),
    ("--web-console", false),
    ("--web-port", true),
    ("--start-timeout-ms", true),
    ("--shutdown-grace-ms", true),
    ("--java", true),
    ("--classpath", true),
    ("--log-filter", true),
    ("--log-format", true),
];

pub(crate) trait ConfigLoader {
    /// Loads settings from the filtered configuration arguments.
    fn load(&self, args: &[OsString]) -> Result<ServerSettings, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<ServerSettings, AppError> {
        ServerSettings::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    let (flag, inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (text.as_ref(), false),
    };
    CONFIG_CLI_FLAGS
        .iter()
        .find(|(known, _)| *known == flag)
        .map_or(FlagAction::Stop, |(_, takes_value)| FlagAction::Include {
            needs_value: *takes_value && !inline_value,
        })
}

/// Arguments split between the settings loader and the command parser.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    /// Program name followed by the settings flags.
    pub(crate) config_arguments: Vec<OsString>,
    /// Program name followed by the subcommand and its arguments.
    pub(crate) command_arguments: Vec<OsString>,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let mut arguments = args.iter();
    let Some(program) = arguments.next() else {
        return ConfigArgumentSplit::default();
    };

    let mut config_arguments = vec![program.clone()];
    let mut remaining = arguments.as_slice();
    while let Some((argument, rest)) = remaining.split_first() {
        match classify(argument) {
            FlagAction::Include { needs_value } => {
                config_arguments.push(argument.clone());
                remaining = rest;
                if needs_value {
                    if let Some((value, rest)) = remaining.split_first() {
                        config_arguments.push(value.clone());
                        remaining = rest;
                    }
                }
            }
            FlagAction::Stop => break,
        }
    }

    let command_arguments = std::iter::once(program.clone())
        .chain(remaining.iter().cloned())
        .collect();
    ConfigArgumentSplit {
        config_arguments,
        command_arguments,
    }
}
