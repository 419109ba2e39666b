//! Shared configuration for the `h2ctl` toolchain.
//!
//! [`ServerSettings`] is the raw option surface. It is loaded by
//! `ortho_config` from command-line flags, `H2CTL_*` environment variables and
//! configuration files, then turned into an immutable [`ServerConfig`] by
//! [`ServerSettings::validate`]. Nothing downstream accepts raw settings.

mod defaults;
mod logging;
mod server;

#[cfg(test)]
mod server_tests;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    CLASSPATH_ENV_VAR, DEFAULT_CLASSPATH, DEFAULT_JAVA, DEFAULT_LOG_FILTER, DEFAULT_PORT,
    DEFAULT_SHUTDOWN_GRACE_MS, DEFAULT_START_TIMEOUT_MS, DEFAULT_WEB_PORT, default_classpath,
    default_java, default_log_filter_string, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use server::{ConfigError, Credentials, EngineCommand, ServerConfig, WebConsole};

/// Raw, layered settings for the database server and its host.
///
/// Numeric fields are wider than their validated counterparts so that
/// out-of-range input reaches [`ServerSettings::validate`] and is reported
/// against the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "H2CTL")]
pub struct ServerSettings {
    /// TCP port for the server; `0` picks an ephemeral port.
    #[ortho_config(default = DEFAULT_PORT)]
    pub port: u32,
    /// Directory for persisted databases; in-memory when absent.
    pub data_directory: Option<Utf8PathBuf>,
    /// Username handed to the engine.
    pub username: Option<String>,
    /// Password handed to the engine.
    pub password: Option<String>,
    /// Accept connections from other hosts instead of loopback only.
    #[ortho_config(default = false)]
    pub allow_remote_clients: bool,
    /// Start the engine's web console alongside the TCP server.
    #[ortho_config(default = false)]
    pub web_console: bool,
    /// Port for the web console.
    #[ortho_config(default = DEFAULT_WEB_PORT)]
    pub web_port: u32,
    /// Milliseconds to wait for the server to accept connections.
    #[ortho_config(default = DEFAULT_START_TIMEOUT_MS)]
    pub start_timeout_ms: i64,
    /// Milliseconds a graceful shutdown may take before the server is killed.
    #[ortho_config(default = DEFAULT_SHUTDOWN_GRACE_MS)]
    pub shutdown_grace_ms: i64,
    /// Java launcher used to run the engine.
    #[ortho_config(default = default_java())]
    pub java: String,
    /// Classpath containing the engine jar.
    #[ortho_config(default = default_classpath())]
    pub classpath: String,
    /// Tracing filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_directory: None,
            username: None,
            password: None,
            allow_remote_clients: false,
            web_console: false,
            web_port: DEFAULT_WEB_PORT,
            start_timeout_ms: DEFAULT_START_TIMEOUT_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            java: default_java(),
            classpath: default_classpath(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl ServerSettings {
    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
