//! H2 TCP server launched as a child JVM process.

use std::fs;
use std::io;
use std::process::{Child, Command, Stdio};

use tracing::{info, warn};

use h2ctl_config::ServerConfig;

use super::{DatabaseEngine, EngineError, HandleStatus, ServerHandle};
use crate::ENGINE_TARGET;

/// Entry point class of the H2 server tool.
pub const H2_SERVER_CLASS: &str = "org.h2.tools.Server";

/// Engine that runs `org.h2.tools.Server` through the configured Java launcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct H2ProcessEngine;

impl H2ProcessEngine {
    /// Builds the engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DatabaseEngine for H2ProcessEngine {
    fn launch(&self, config: &ServerConfig) -> Result<Box<dyn ServerHandle>, EngineError> {
        if let Some(path) = config.data_directory() {
            fs::create_dir_all(path).map_err(|source| EngineError::PrepareDataDirectory {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let program = config.engine().java().to_owned();
        let mut command = Command::new(&program);
        command
            .args(h2_server_arguments(config))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        let child = command
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: program.clone(),
                source,
            })?;
        info!(
            target: ENGINE_TARGET,
            pid = child.id(),
            port = config.port(),
            program = %program,
            "engine process spawned"
        );
        Ok(Box::new(ProcessHandle { child }))
    }
}

/// Command-line arguments passed to the Java launcher.
///
/// The username is not a server option: H2 creates the account on the first
/// connection, so it only appears in client connection settings. The password
/// doubles as the TCP administration password. H2 accepts it only as an
/// argument, so it is readable by local users through the process table
/// while the server runs.
#[must_use]
pub fn h2_server_arguments(config: &ServerConfig) -> Vec<String> {
    let mut arguments = vec![
        String::from("-cp"),
        config.engine().classpath().to_owned(),
        String::from(H2_SERVER_CLASS),
        String::from("-tcp"),
        String::from("-tcpPort"),
        config.port().to_string(),
    ];
    if config.allow_remote_clients() {
        arguments.push(String::from("-tcpAllowOthers"));
    }
    let password = config.credentials().password();
    if !password.is_empty() {
        arguments.push(String::from("-tcpPassword"));
        arguments.push(password.to_owned());
    }
    if let Some(path) = config.data_directory() {
        arguments.push(String::from("-baseDir"));
        arguments.push(path.as_str().to_owned());
    }
    arguments.push(String::from("-ifNotExists"));
    if let Some(console) = config.web_console() {
        arguments.push(String::from("-web"));
        arguments.push(String::from("-webPort"));
        arguments.push(console.port().to_string());
        if config.allow_remote_clients() {
            arguments.push(String::from("-webAllowOthers"));
        }
    }
    arguments
}

#[derive(Debug)]
struct ProcessHandle {
    child: Child,
}

impl ServerHandle for ProcessHandle {
    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn request_shutdown(&mut self) -> io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        send_terminate(&mut self.child)
    }

    fn status(&mut self) -> io::Result<HandleStatus> {
        Ok(match self.child.try_wait()? {
            Some(status) => HandleStatus::Exited {
                code: status.code(),
            },
            None => HandleStatus::Running,
        })
    }

    fn force_terminate(&mut self) -> io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        match self.child.kill() {
            Ok(()) => {}
            // Exited between the check and the kill.
            Err(error) if error.kind() == io::ErrorKind::InvalidInput => {}
            Err(error) => return Err(error),
        }
        self.child.wait().map(drop)
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if let Err(error) = self.force_terminate() {
            warn!(
                target: ENGINE_TARGET,
                pid = self.child.id(),
                error = %error,
                "failed to reap engine process"
            );
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = child.id();
    let raw = i32::try_from(pid).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("pid {pid} exceeds the platform pid range"),
        )
    })?;
    kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> io::Result<()> {
    // No graceful signal exists; the JVM is stopped outright.
    child.kill()
}
