//! Unit tests for settings validation.

use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use crate::{ConfigError, Credentials, ServerSettings};

#[fixture]
fn settings() -> ServerSettings {
    ServerSettings {
        classpath: String::from("/opt/h2/h2.jar"),
        ..ServerSettings::default()
    }
}

fn utf8_path(dir: &TempDir, name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join(name)).expect("temp path should be UTF-8")
}

#[rstest]
fn defaults_validate_to_loopback_in_memory_server(settings: ServerSettings) {
    let config = settings.validate().expect("defaults should validate");
    assert_eq!(config.port(), 9092);
    assert!(config.data_directory().is_none());
    assert!(config.credentials().is_open());
    assert!(!config.allow_remote_clients());
    assert!(config.web_console().is_none());
    assert_eq!(config.start_timeout(), Duration::from_secs(5));
    assert_eq!(config.bind_address().to_string(), "127.0.0.1:9092");
    assert_eq!(
        config.connection_url("test"),
        "jdbc:h2:tcp://localhost:9092/mem:test"
    );
}

#[rstest]
#[case::port_too_large(ServerSettings { port: 65_536, ..settings() }, "port")]
#[case::negative_timeout(ServerSettings { start_timeout_ms: -1, ..settings() }, "start_timeout_ms")]
#[case::zero_timeout(ServerSettings { start_timeout_ms: 0, ..settings() }, "start_timeout_ms")]
#[case::negative_grace(ServerSettings { shutdown_grace_ms: -10, ..settings() }, "shutdown_grace_ms")]
#[case::blank_username(
    ServerSettings { username: Some(String::from("   ")), ..settings() },
    "username"
)]
#[case::password_without_user(
    ServerSettings { password: Some(String::from("secret")), ..settings() },
    "username"
)]
#[case::web_port_clash(
    ServerSettings { web_console: true, web_port: 9092, ..settings() },
    "web_port"
)]
#[case::empty_java(ServerSettings { java: String::from(" "), ..settings() }, "java")]
#[case::empty_classpath(ServerSettings { classpath: String::new(), ..settings() }, "classpath")]
fn invalid_settings_name_the_offending_field(
    #[case] input: ServerSettings,
    #[case] field: &str,
) {
    let error = input.validate().expect_err("settings should be rejected");
    assert_eq!(error.field(), field, "unexpected error: {error}");
}

#[rstest]
fn web_port_is_ignored_while_console_disabled(settings: ServerSettings) {
    let config = ServerSettings {
        web_port: 9092,
        ..settings
    }
    .validate()
    .expect("disabled console should not validate its port");
    assert!(config.web_console().is_none());
}

#[rstest]
fn data_directory_must_be_a_directory(settings: ServerSettings) {
    let dir = TempDir::new().expect("create temp dir");
    let file = utf8_path(&dir, "not-a-dir");
    fs::write(&file, b"").expect("write placeholder file");

    let error = ServerSettings {
        data_directory: Some(file),
        ..settings
    }
    .validate()
    .expect_err("files are not data directories");
    let ConfigError::Invalid { field, reason } = error;
    assert_eq!(field, "data_directory");
    assert!(reason.contains("not a directory"), "reason was {reason}");
}

#[rstest]
fn missing_data_directory_is_accepted(settings: ServerSettings) {
    let dir = TempDir::new().expect("create temp dir");
    let missing = utf8_path(&dir, "later");
    let config = ServerSettings {
        data_directory: Some(missing.clone()),
        ..settings
    }
    .validate()
    .expect("missing directory is created on start");
    assert_eq!(config.data_directory(), Some(missing.as_path()));
    assert!(!missing.exists(), "validation must not create directories");
    assert_eq!(
        config.connection_url("app"),
        "jdbc:h2:tcp://localhost:9092/app"
    );
}

#[rstest]
fn credentials_are_redacted_in_debug_output(settings: ServerSettings) {
    let config = ServerSettings {
        username: Some(String::from("sa")),
        password: Some(String::from("hunter2")),
        ..settings
    }
    .validate()
    .expect("credentials should validate");
    let rendered = format!("{config:?}");
    assert!(rendered.contains("\"sa\""));
    assert!(!rendered.contains("hunter2"));
}

#[rstest]
fn remote_clients_bind_to_all_interfaces(settings: ServerSettings) {
    let config = ServerSettings {
        allow_remote_clients: true,
        port: 9200,
        ..settings
    }
    .validate()
    .expect("remote settings should validate");
    assert_eq!(config.bind_address().to_string(), "0.0.0.0:9200");
    assert_eq!(config.probe_address().to_string(), "127.0.0.1:9200");
}

#[rstest]
fn first_difference_ignores_timeouts(settings: ServerSettings) {
    let base = settings.validate().expect("defaults should validate");
    let slower = base
        .with_start_timeout(Duration::from_secs(30))
        .with_shutdown_grace(Duration::from_secs(1));
    assert_eq!(base.first_difference(&slower), None);

    let secured = base.with_credentials(Credentials::new("sa", "pw"));
    assert_eq!(base.first_difference(&secured), Some("credentials"));
    assert_eq!(base.first_difference(&base.with_port(9300)), Some("port"));
}
