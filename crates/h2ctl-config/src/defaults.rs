use std::env;

use crate::logging::LogFormat;

/// Conventional H2 TCP server port.
pub const DEFAULT_PORT: u32 = 9092;

/// Conventional H2 web console port.
pub const DEFAULT_WEB_PORT: u32 = 8082;

/// Default time allowed for the server to accept connections.
pub const DEFAULT_START_TIMEOUT_MS: i64 = 5_000;

/// Default grace period granted to a graceful shutdown before forcing it.
pub const DEFAULT_SHUTDOWN_GRACE_MS: i64 = 5_000;

/// Default Java launcher.
pub const DEFAULT_JAVA: &str = "java";

/// Classpath used when neither configuration nor `H2CTL_CLASSPATH` names one.
pub const DEFAULT_CLASSPATH: &str = "h2.jar";

/// Environment variable consulted for the engine classpath.
pub const CLASSPATH_ENV_VAR: &str = "H2CTL_CLASSPATH";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default Java launcher as an owned value.
pub fn default_java() -> String {
    DEFAULT_JAVA.to_owned()
}

/// Resolves the default engine classpath.
///
/// `H2CTL_CLASSPATH` wins over the bundled default so build hosts can point
/// at a jar resolved by their own dependency manager.
pub fn default_classpath() -> String {
    env::var(CLASSPATH_ENV_VAR)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CLASSPATH.to_owned())
}
