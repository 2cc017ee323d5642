//! An in-memory ensemble reachable through a simulated network.
//!
//! 通过模拟网络访问的内存集群。

use super::{handle::InMemoryHandle, tree::DataTree};
use crate::{
    config::Config,
    error::{Error, Result},
    protocol::{Connector, SessionHandle, SessionId},
    session::ConnectionWatcher,
};
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tracing::{debug, info};

/// Server-side limits for negotiated session timeouts.
///
/// 服务端协商会话超时的上下限。
#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    pub min_session_timeout: Duration,
    pub max_session_timeout: Duration,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            min_session_timeout: Duration::from_secs(4),
            max_session_timeout: Duration::from_secs(40),
        }
    }
}

#[derive(Debug)]
pub(super) struct EnsembleShared {
    config: EnsembleConfig,
    network_up: AtomicBool,
    pub(super) tree: Mutex<DataTree>,
    sessions: DashMap<SessionId, Duration>,
    handles: DashMap<u64, Weak<InMemoryHandle>>,
    next_handle: AtomicU64,
    connect_attempts: AtomicUsize,
}

impl EnsembleShared {
    pub(super) fn is_network_up(&self) -> bool {
        self.network_up.load(Ordering::SeqCst)
    }

    /// Creates a server-side session with a fresh identifier.
    pub(super) fn open_session(&self, timeout: Duration) -> SessionId {
        loop {
            let candidate = SessionId(rand::random::<i64>() & i64::MAX);
            if candidate.0 == 0 || self.sessions.contains_key(&candidate) {
                continue;
            }
            self.sessions.insert(candidate, timeout);
            return candidate;
        }
    }

    pub(super) fn has_session(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Invalidates a session and removes the ephemeral nodes it owned.
    pub(super) fn close_session(&self, id: SessionId) -> bool {
        if self.sessions.remove(&id).is_none() {
            return false;
        }
        let removed = self.tree.lock().remove_ephemerals(id);
        debug!(session_id = %id, ephemerals = removed, "Session closed on the ensemble");
        true
    }

    pub(super) fn forget_handle(&self, id: u64) {
        self.handles.remove(&id);
    }

    fn negotiate(&self, requested: Duration) -> Duration {
        requested.clamp(self.config.min_session_timeout, self.config.max_session_timeout)
    }

    /// Snapshot of live handles; the map is never held while a handle is locked.
    fn live_handles(&self) -> Vec<Arc<InMemoryHandle>> {
        self.handles
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect()
    }
}

/// A coordination ensemble living in process memory.
///
/// It implements [`Connector`] with the behavior of a real client library:
/// connections are established asynchronously, survive network outages
/// shorter than their negotiated session timeout, and report state changes to
/// the connection's watcher from a dedicated event task.
///
/// 位于进程内存中的协调集群。它以真实客户端库的行为实现 [`Connector`]：
/// 异步建立连接，短于会话超时的网络中断后恢复同一会话，并通过专门的事件任务报告状态变化。
#[derive(Debug, Clone)]
pub struct InMemoryEnsemble {
    shared: Arc<EnsembleShared>,
}

impl Default for InMemoryEnsemble {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEnsemble {
    pub fn new() -> Self {
        Self::with_config(EnsembleConfig::default())
    }

    pub fn with_config(config: EnsembleConfig) -> Self {
        Self {
            shared: Arc::new(EnsembleShared {
                config,
                network_up: AtomicBool::new(true),
                tree: Mutex::new(DataTree::new()),
                sessions: DashMap::new(),
                handles: DashMap::new(),
                next_handle: AtomicU64::new(1),
                connect_attempts: AtomicUsize::new(0),
            }),
        }
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    /// Cuts every client off. Connected clients observe `Disconnected`.
    ///
    /// 切断所有客户端。已连接的客户端会收到 `Disconnected`。
    pub fn shutdown_network(&self) {
        info!("Network shut down");
        self.shared.network_up.store(false, Ordering::SeqCst);
        for handle in self.shared.live_handles() {
            handle.network_lost();
        }
    }

    /// Restores the network. Pending connections complete, interrupted ones
    /// resume their session or learn that it expired during the outage.
    ///
    /// 恢复网络。等待中的连接完成建立，中断的连接恢复原会话或得知其已在中断期间过期。
    pub fn restart_network(&self) {
        info!("Network restarted");
        self.shared.network_up.store(true, Ordering::SeqCst);
        for handle in self.shared.live_handles() {
            handle.establish();
        }
    }

    pub fn is_network_up(&self) -> bool {
        self.shared.is_network_up()
    }

    /// Expires a session as if its timeout had lapsed on the ensemble.
    pub fn expire_session(&self, id: SessionId) -> bool {
        if !self.shared.close_session(id) {
            return false;
        }
        info!(session_id = %id, "Session expired by the ensemble");
        for handle in self.shared.live_handles() {
            handle.session_expired(id);
        }
        true
    }

    /// Number of connections ever requested.
    pub fn connect_attempts(&self) -> usize {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    /// Number of connections not yet disconnected.
    pub fn live_connections(&self) -> usize {
        self.shared.live_handles().len()
    }

    pub fn session_count(&self) -> usize {
        self.shared.sessions.len()
    }

    /// Reads a node bypassing ACLs.
    pub fn node_data(&self, path: &str) -> Option<Bytes> {
        self.shared.tree.lock().data(path)
    }
}

impl Connector for InMemoryEnsemble {
    fn connect(
        &self,
        config: &Config,
        watcher: ConnectionWatcher,
    ) -> Result<Arc<dyn SessionHandle>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Connect(format!("no runtime to deliver events on: {e}")))?;

        self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let id = self.shared.next_handle.fetch_add(1, Ordering::Relaxed);
        let session_timeout = self.shared.negotiate(config.session_timeout);
        debug!(
            handle = id,
            epoch = watcher.epoch(),
            ?session_timeout,
            "Accepted connection request"
        );

        let handle = InMemoryHandle::start(
            id,
            self.shared.clone(),
            config.effective_chroot().map(str::to_owned),
            session_timeout,
            watcher,
            &runtime,
        );
        self.shared.handles.insert(id, Arc::downgrade(&handle));
        handle.establish();
        Ok(handle)
    }
}
