//! Validated server configuration.
//!
//! [`ServerSettings`](crate::ServerSettings) is the raw, layered input;
//! [`ServerConfig`] is what the lifecycle controller accepts. The only way to
//! obtain a [`ServerConfig`] is [`ServerSettings::validate`], so every value
//! the controller sees has already been checked.

use std::fmt;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::ServerSettings;

/// Errors raised while validating raw settings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A single setting holds an unusable value.
    #[error("invalid configuration for '{field}': {reason}")]
    Invalid {
        /// Name of the offending setting.
        field: &'static str,
        /// Human-readable explanation.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the setting that failed validation.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::Invalid { field, .. } => field,
        }
    }
}

/// Username/password pair handed to the engine.
///
/// Both empty means an open server. The password never appears in `Debug`
/// output.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Builds a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Configured username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Configured password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Returns `true` when no credentials are required.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() {
            ""
        } else {
            "<redacted>"
        };
        formatter
            .debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &password)
            .finish()
    }
}

/// Web console settings, present only when the console is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebConsole {
    port: u16,
}

impl WebConsole {
    /// Port the web console listens on.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// How the engine process is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    java: String,
    classpath: String,
}

impl EngineCommand {
    /// Builds an engine command from a Java launcher and classpath.
    #[must_use]
    pub fn new(java: impl Into<String>, classpath: impl Into<String>) -> Self {
        Self {
            java: java.into(),
            classpath: classpath.into(),
        }
    }

    /// Java launcher executable.
    #[must_use]
    pub fn java(&self) -> &str {
        &self.java
    }

    /// Classpath containing the engine jar.
    #[must_use]
    pub fn classpath(&self) -> &str {
        &self.classpath
    }
}

/// Immutable, validated startup parameters for one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    port: u16,
    data_directory: Option<Utf8PathBuf>,
    credentials: Credentials,
    allow_remote_clients: bool,
    web_console: Option<WebConsole>,
    start_timeout: Duration,
    shutdown_grace: Duration,
    engine: EngineCommand,
}

impl ServerConfig {
    /// Listen port; `0` asks for an ephemeral port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Directory holding persisted data, or `None` for in-memory mode.
    #[must_use]
    pub fn data_directory(&self) -> Option<&Utf8Path> {
        self.data_directory.as_deref()
    }

    /// Credentials handed to the engine.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Whether clients on other hosts may connect.
    #[must_use]
    pub fn allow_remote_clients(&self) -> bool {
        self.allow_remote_clients
    }

    /// Web console settings when enabled.
    #[must_use]
    pub fn web_console(&self) -> Option<WebConsole> {
        self.web_console
    }

    /// Time allowed for the server to accept connections.
    #[must_use]
    pub fn start_timeout(&self) -> Duration {
        self.start_timeout
    }

    /// Time allowed for a graceful shutdown before the server is killed.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    /// Engine launch command.
    #[must_use]
    pub fn engine(&self) -> &EngineCommand {
        &self.engine
    }

    /// Returns a copy bound to `port`.
    ///
    /// Used once an ephemeral port has been chosen for a `port = 0` request.
    #[must_use]
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            port,
            ..self.clone()
        }
    }

    /// Returns a copy with a different start timeout.
    #[must_use]
    pub fn with_start_timeout(&self, start_timeout: Duration) -> Self {
        Self {
            start_timeout,
            ..self.clone()
        }
    }

    /// Returns a copy with a different shutdown grace period.
    #[must_use]
    pub fn with_shutdown_grace(&self, shutdown_grace: Duration) -> Self {
        Self {
            shutdown_grace,
            ..self.clone()
        }
    }

    /// Returns a copy with different credentials.
    #[must_use]
    pub fn with_credentials(&self, credentials: Credentials) -> Self {
        Self {
            credentials,
            ..self.clone()
        }
    }

    /// Address the server binds to.
    #[must_use]
    pub fn bind_address(&self) -> SocketAddr {
        let host = if self.allow_remote_clients {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        };
        SocketAddr::new(host, self.port)
    }

    /// Loopback address used to probe the server.
    #[must_use]
    pub fn probe_address(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.port)
    }

    /// JDBC URL for `database` on this server.
    #[must_use]
    pub fn connection_url(&self, database: &str) -> String {
        match self.data_directory {
            Some(_) => format!("jdbc:h2:tcp://localhost:{}/{database}", self.port),
            None => format!("jdbc:h2:tcp://localhost:{}/mem:{database}", self.port),
        }
    }

    /// Names the first setting that would make a running server started with
    /// `self` behave differently from one started with `other`.
    ///
    /// Timeouts are ignored: they only shape how the caller waits.
    #[must_use]
    pub fn first_difference(&self, other: &Self) -> Option<&'static str> {
        if self.port != other.port {
            return Some("port");
        }
        if self.data_directory != other.data_directory {
            return Some("data_directory");
        }
        if self.credentials != other.credentials {
            return Some("credentials");
        }
        if self.allow_remote_clients != other.allow_remote_clients {
            return Some("allow_remote_clients");
        }
        if self.web_console != other.web_console {
            return Some("web_console");
        }
        if self.engine != other.engine {
            return Some("engine");
        }
        None
    }
}

impl ServerSettings {
    /// Validates raw settings into a [`ServerConfig`].
    ///
    /// Filesystem metadata is read to check the data directory, but nothing
    /// is created or modified.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending setting.
    pub fn validate(&self) -> Result<ServerConfig, ConfigError> {
        let port = validate_port("port", self.port)?;
        let start_timeout = validate_start_timeout(self.start_timeout_ms)?;
        let shutdown_grace = validate_grace(self.shutdown_grace_ms)?;
        let credentials = validate_credentials(self.username.as_deref(), self.password.as_deref())?;
        let data_directory = self
            .data_directory
            .as_deref()
            .map(validate_data_directory)
            .transpose()?;
        let web_console = if self.web_console {
            Some(validate_web_console(self.web_port, port)?)
        } else {
            None
        };
        let engine = validate_engine(&self.java, &self.classpath)?;
        Ok(ServerConfig {
            port,
            data_directory,
            credentials,
            allow_remote_clients: self.allow_remote_clients,
            web_console,
            start_timeout,
            shutdown_grace,
            engine,
        })
    }
}

fn validate_port(field: &'static str, raw: u32) -> Result<u16, ConfigError> {
    u16::try_from(raw)
        .map_err(|_| ConfigError::invalid(field, format!("{raw} is outside 0-65535")))
}

fn validate_start_timeout(raw: i64) -> Result<Duration, ConfigError> {
    match u64::try_from(raw) {
        Ok(millis) if millis > 0 => Ok(Duration::from_millis(millis)),
        _ => Err(ConfigError::invalid(
            "start_timeout_ms",
            format!("{raw} ms; the start timeout must be greater than zero"),
        )),
    }
}

fn validate_grace(raw: i64) -> Result<Duration, ConfigError> {
    u64::try_from(raw).map(Duration::from_millis).map_err(|_| {
        ConfigError::invalid(
            "shutdown_grace_ms",
            format!("{raw} ms; the grace period cannot be negative"),
        )
    })
}

fn validate_credentials(
    username: Option<&str>,
    password: Option<&str>,
) -> Result<Credentials, ConfigError> {
    let username = username.unwrap_or_default();
    let password = password.unwrap_or_default();
    if !username.is_empty() && username.trim().is_empty() {
        return Err(ConfigError::invalid("username", "must not be blank"));
    }
    if username.is_empty() && !password.is_empty() {
        return Err(ConfigError::invalid(
            "username",
            "a password was supplied without a username",
        ));
    }
    Ok(Credentials::new(username, password))
}

fn validate_data_directory(path: &Utf8Path) -> Result<Utf8PathBuf, ConfigError> {
    if path.as_str().trim().is_empty() {
        return Err(ConfigError::invalid("data_directory", "must not be empty"));
    }
    match fs::metadata(path) {
        Ok(metadata) if !metadata.is_dir() => Err(ConfigError::invalid(
            "data_directory",
            format!("'{path}' is not a directory"),
        )),
        Ok(metadata) if metadata.permissions().readonly() => Err(ConfigError::invalid(
            "data_directory",
            format!("'{path}' is not writable"),
        )),
        Ok(_) => Ok(path.to_path_buf()),
        // Created by the engine on first start.
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(path.to_path_buf()),
        Err(error) => Err(ConfigError::invalid(
            "data_directory",
            format!("cannot inspect '{path}': {error}"),
        )),
    }
}

fn validate_web_console(raw: u32, server_port: u16) -> Result<WebConsole, ConfigError> {
    let port = validate_port("web_port", raw)?;
    if port == 0 {
        return Err(ConfigError::invalid(
            "web_port",
            "the web console needs a fixed port",
        ));
    }
    if port == server_port {
        return Err(ConfigError::invalid(
            "web_port",
            format!("{port} is already the server port"),
        ));
    }
    Ok(WebConsole { port })
}

fn validate_engine(java: &str, classpath: &str) -> Result<EngineCommand, ConfigError> {
    if java.trim().is_empty() {
        return Err(ConfigError::invalid("java", "must name a launcher"));
    }
    if classpath.trim().is_empty() {
        return Err(ConfigError::invalid("classpath", "must not be empty"));
    }
    Ok(EngineCommand::new(java, classpath))
}
