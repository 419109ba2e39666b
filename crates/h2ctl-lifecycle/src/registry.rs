//! Registry of managed server instances.
//!
//! The registry maps ports to the instance that owns them. Its map lock is
//! held only for the duration of a map operation; the per-port locks handed
//! out by [`Registry::port_lock`] serialize the long-running start and stop
//! sequences instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use h2ctl_config::ServerConfig;

use crate::engine::ServerHandle;
use crate::state::{InvalidTransition, ServerState};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Handle shared between the stopping caller and the exit guard.
pub(crate) type SharedHandle = Arc<Mutex<Box<dyn ServerHandle>>>;

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-unique identifier of a server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "srv-{}", self.0)
    }
}

/// A launched server owned by the registry.
pub struct ServerInstance {
    id: InstanceId,
    config: ServerConfig,
    state: ServerState,
    started_at: SystemTime,
    pid: Option<u32>,
    handle: SharedHandle,
}

impl ServerInstance {
    pub(crate) fn new(
        config: ServerConfig,
        state: ServerState,
        handle: Box<dyn ServerHandle>,
    ) -> Self {
        Self {
            id: InstanceId::next(),
            pid: handle.pid(),
            config,
            state,
            started_at: SystemTime::now(),
            handle: Arc::new(Mutex::new(handle)),
        }
    }

    /// Identifier assigned at launch.
    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Port the instance listens on.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.config.port()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Configuration the instance was started with.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Detached snapshot of the instance.
    #[must_use]
    pub fn info(&self) -> InstanceInfo {
        InstanceInfo {
            id: self.id,
            port: self.port(),
            state: self.state,
            started_at: self.started_at,
            pid: self.pid,
            config: self.config.clone(),
        }
    }

    pub(crate) fn advance(&mut self, next: ServerState) -> Result<InstanceInfo, InvalidTransition> {
        self.state = self.state.transition(next)?;
        Ok(self.info())
    }

    pub(crate) fn handle(&self) -> SharedHandle {
        Arc::clone(&self.handle)
    }
}

impl fmt::Debug for ServerInstance {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ServerInstance")
            .field("id", &self.id)
            .field("port", &self.port())
            .field("state", &self.state)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

/// Snapshot of a registered instance handed to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    /// Identifier assigned at launch.
    pub id: InstanceId,
    /// Port the server listens on.
    pub port: u16,
    /// State when the snapshot was taken.
    pub state: ServerState,
    /// Wall-clock time the server was launched.
    pub started_at: SystemTime,
    /// Engine process id, when the engine runs out of process.
    pub pid: Option<u32>,
    /// Configuration the server was started with, with its resolved port.
    pub config: ServerConfig,
}

impl InstanceInfo {
    /// JDBC URL for `database` on this server.
    #[must_use]
    pub fn connection_url(&self, database: &str) -> String {
        self.config.connection_url(database)
    }
}

/// Another instance already owns the port.
#[derive(Debug)]
pub(crate) struct AlreadyPresent(pub(crate) ServerInstance);

/// Port-keyed table of managed servers.
#[derive(Default)]
pub struct Registry {
    instances: Mutex<HashMap<u16, ServerInstance>>,
    port_locks: Mutex<HashMap<u16, Arc<Mutex<()>>>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the instance on `port`.
    #[must_use]
    pub fn get(&self, port: u16) -> Option<InstanceInfo> {
        lock(&self.instances).get(&port).map(ServerInstance::info)
    }

    /// Snapshots of every registered instance ordered by port.
    #[must_use]
    pub fn snapshot(&self) -> Vec<InstanceInfo> {
        let mut infos: Vec<_> = lock(&self.instances)
            .values()
            .map(ServerInstance::info)
            .collect();
        infos.sort_by_key(|info| info.port);
        infos
    }

    /// Registered ports in ascending order.
    #[must_use]
    pub fn ports(&self) -> Vec<u16> {
        let mut ports: Vec<_> = lock(&self.instances).keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    /// Number of registered instances.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.instances).len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.instances).is_empty()
    }

    /// Lock serializing start and stop sequences on `port`.
    pub(crate) fn port_lock(&self, port: u16) -> Arc<Mutex<()>> {
        Arc::clone(lock(&self.port_locks).entry(port).or_default())
    }

    /// Returns a lock obtained from [`Registry::port_lock`], dropping the table
    /// entry once no other caller holds it and no instance owns the port.
    pub(crate) fn release_port_lock(&self, port: u16, port_lock: Arc<Mutex<()>>) {
        let mut locks = lock(&self.port_locks);
        // The table and `port_lock` account for two references.
        let idle = locks
            .get(&port)
            .is_some_and(|held| Arc::ptr_eq(held, &port_lock) && Arc::strong_count(held) == 2);
        drop(port_lock);
        if idle && !lock(&self.instances).contains_key(&port) {
            locks.remove(&port);
        }
    }

    #[cfg(test)]
    pub(crate) fn port_lock_count(&self) -> usize {
        lock(&self.port_locks).len()
    }

    pub(crate) fn try_insert(&self, instance: ServerInstance) -> Result<(), AlreadyPresent> {
        let mut instances = lock(&self.instances);
        if instances.contains_key(&instance.port()) {
            return Err(AlreadyPresent(instance));
        }
        instances.insert(instance.port(), instance);
        Ok(())
    }

    /// Applies `update` to the instance on `port` while holding the map lock.
    pub(crate) fn update<R>(
        &self,
        port: u16,
        update: impl FnOnce(&mut ServerInstance) -> R,
    ) -> Option<R> {
        lock(&self.instances).get_mut(&port).map(update)
    }

    /// Removes the instance on `port` if it is still the one identified by `id`.
    pub(crate) fn remove(&self, port: u16, id: InstanceId) -> Option<ServerInstance> {
        let mut instances = lock(&self.instances);
        if instances.get(&port).is_some_and(|instance| instance.id == id) {
            instances.remove(&port)
        } else {
            None
        }
    }

    /// Removes and returns every instance.
    pub(crate) fn drain(&self) -> Vec<ServerInstance> {
        lock(&self.instances).drain().map(|(_, instance)| instance).collect()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Registry")
            .field("ports", &self.ports())
            .finish_non_exhaustive()
    }
}
