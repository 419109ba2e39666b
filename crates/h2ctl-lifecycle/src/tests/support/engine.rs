//! In-process engine that stands in for the H2 JVM.
//!
//! Each launch binds a plain loopback `TcpListener`; the kernel completes
//! connections on its backlog, which is all the readiness probe needs.

use std::io;
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use h2ctl_config::ServerConfig;

use crate::engine::{DatabaseEngine, EngineError, HandleStatus, ServerHandle};

/// How launched servers react to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineBehaviour {
    /// Binds on launch and releases the port when asked to shut down.
    Cooperative,
    /// Binds on launch but ignores graceful shutdown requests.
    IgnoresShutdown,
    /// Never binds and never exits on its own.
    NeverReady,
    /// Exits immediately with the given code.
    ExitsImmediately(Option<i32>),
}

/// Engine double counting launches, live listeners and forced terminations.
#[derive(Debug, Clone)]
pub struct LoopbackEngine {
    behaviour: EngineBehaviour,
    launch_delay: Duration,
    launches: Arc<AtomicUsize>,
    forced: Arc<AtomicUsize>,
    listeners: Arc<ListenerCount>,
}

/// Listeners currently bound, and the most ever bound at once.
#[derive(Debug, Default)]
struct ListenerCount {
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl ListenerCount {
    fn bound(&self) {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
    }

    fn released(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LoopbackEngine {
    pub fn new(behaviour: EngineBehaviour) -> Self {
        Self {
            behaviour,
            launch_delay: Duration::ZERO,
            launches: Arc::new(AtomicUsize::new(0)),
            forced: Arc::new(AtomicUsize::new(0)),
            listeners: Arc::default(),
        }
    }

    /// Sleeps before binding, widening race windows for concurrency tests.
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn forced_terminations(&self) -> usize {
        self.forced.load(Ordering::SeqCst)
    }

    /// Listeners bound right now.
    pub fn live_listeners(&self) -> usize {
        self.listeners.live.load(Ordering::SeqCst)
    }

    /// Most listeners ever bound at the same time.
    pub fn peak_listeners(&self) -> usize {
        self.listeners.peak.load(Ordering::SeqCst)
    }
}

impl DatabaseEngine for LoopbackEngine {
    fn launch(&self, config: &ServerConfig) -> Result<Box<dyn ServerHandle>, EngineError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.launch_delay);
        let listener = match self.behaviour {
            EngineBehaviour::Cooperative | EngineBehaviour::IgnoresShutdown => {
                Some(bind(config)?)
            }
            EngineBehaviour::NeverReady | EngineBehaviour::ExitsImmediately(_) => None,
        };
        if listener.is_some() {
            self.listeners.bound();
        }
        Ok(Box::new(LoopbackHandle {
            listener,
            behaviour: self.behaviour,
            terminated: false,
            forced: Arc::clone(&self.forced),
            listeners: Arc::clone(&self.listeners),
        }))
    }
}

fn bind(config: &ServerConfig) -> Result<TcpListener, EngineError> {
    TcpListener::bind(config.bind_address()).map_err(|source| {
        if source.kind() == io::ErrorKind::AddrInUse {
            EngineError::PortInUse {
                port: config.port(),
            }
        } else {
            EngineError::Spawn {
                program: String::from("loopback"),
                source,
            }
        }
    })
}

#[derive(Debug)]
struct LoopbackHandle {
    listener: Option<TcpListener>,
    behaviour: EngineBehaviour,
    terminated: bool,
    forced: Arc<AtomicUsize>,
    listeners: Arc<ListenerCount>,
}

impl LoopbackHandle {
    fn close(&mut self) {
        if self.listener.take().is_some() {
            self.listeners.released();
        }
    }
}

impl Drop for LoopbackHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl ServerHandle for LoopbackHandle {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn request_shutdown(&mut self) -> io::Result<()> {
        if self.behaviour != EngineBehaviour::IgnoresShutdown {
            self.close();
        }
        Ok(())
    }

    fn status(&mut self) -> io::Result<HandleStatus> {
        if self.terminated {
            return Ok(HandleStatus::Exited { code: None });
        }
        Ok(match self.behaviour {
            EngineBehaviour::ExitsImmediately(code) => HandleStatus::Exited { code },
            EngineBehaviour::Cooperative if self.listener.is_none() => {
                HandleStatus::Exited { code: Some(0) }
            }
            _ => HandleStatus::Running,
        })
    }

    fn force_terminate(&mut self) -> io::Result<()> {
        if !self.terminated {
            self.terminated = true;
            self.close();
            self.forced.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
