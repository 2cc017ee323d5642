//! A client connection to the in-memory ensemble.

use super::{ensemble::EnsembleShared, tree::Caller};
use crate::{
    error::{OperationError, OperationResult},
    protocol::{Acl, CreateMode, Id, SessionEvent, SessionHandle, SessionId, Stat},
    session::ConnectionWatcher,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, warn};

/// Connection-side view of the link to the ensemble.
#[derive(Debug, Default)]
struct Link {
    session: Option<SessionId>,
    connected: bool,
    closed: bool,
    expired: bool,
    /// When a connected link last lost the network.
    lost_at: Option<Instant>,
    pending_auth: Vec<(String, Bytes)>,
    principals: Vec<Id>,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl Link {
    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn authenticate(&mut self, scheme: &str, token: &[u8]) {
        match Id::digest_from_token(token) {
            Some(id) if scheme == "digest" => {
                if !self.principals.contains(&id) {
                    self.principals.push(id);
                }
            }
            _ => {
                warn!(%scheme, "Rejecting credentials");
                self.emit(SessionEvent::AuthFailed {
                    scheme: scheme.to_string(),
                });
            }
        }
    }
}

/// One connection to an [`InMemoryEnsemble`](super::InMemoryEnsemble).
///
/// Events are delivered to the connection's watcher by a dedicated task, in
/// order, never inline from the call that caused them.
///
/// 到内存集群的一个连接。事件由专门的任务按顺序投递给监视器，绝不会在引发事件的调用中内联投递。
pub struct InMemoryHandle {
    id: u64,
    ensemble: Arc<EnsembleShared>,
    chroot: Option<String>,
    session_timeout: Duration,
    link: Mutex<Link>,
}

impl std::fmt::Debug for InMemoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let link = self.link.lock();
        f.debug_struct("InMemoryHandle")
            .field("id", &self.id)
            .field("session", &link.session)
            .field("connected", &link.connected)
            .field("closed", &link.closed)
            .finish()
    }
}

impl InMemoryHandle {
    pub(super) fn start(
        id: u64,
        ensemble: Arc<EnsembleShared>,
        chroot: Option<String>,
        session_timeout: Duration,
        watcher: ConnectionWatcher,
        runtime: &tokio::runtime::Handle,
    ) -> Arc<Self> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        runtime.spawn(async move {
            while let Some(event) = events_rx.recv().await {
                watcher.process(event);
            }
        });

        Arc::new(Self {
            id,
            ensemble,
            chroot,
            session_timeout,
            link: Mutex::new(Link {
                events: Some(events_tx),
                ..Link::default()
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.link.lock().connected
    }

    /// Completes the handshake if the network is up: opens a session on first
    /// contact, otherwise resumes the existing one unless it expired.
    ///
    /// 若网络可用则完成握手：首次连接时开启会话，否则恢复已有会话（除非其已过期）。
    pub(super) fn establish(&self) {
        let mut link = self.link.lock();
        if link.closed || link.expired || link.connected || !self.ensemble.is_network_up() {
            return;
        }

        let session = link.session;
        match session {
            None => {
                let session = self.ensemble.open_session(self.session_timeout);
                debug!(handle = self.id, session_id = %session, "Session opened");
                link.session = Some(session);
            }
            Some(session) => {
                let outage_too_long = link
                    .lost_at
                    .is_some_and(|lost_at| lost_at.elapsed() > self.session_timeout);
                if outage_too_long || !self.ensemble.has_session(session) {
                    self.ensemble.close_session(session);
                    debug!(
                        handle = self.id,
                        session_id = %session,
                        "Session expired during outage"
                    );
                    link.expired = true;
                    link.emit(SessionEvent::Expired);
                    return;
                }
                debug!(handle = self.id, session_id = %session, "Session resumed");
            }
        }

        link.connected = true;
        link.lost_at = None;
        link.emit(SessionEvent::Connected);
        for (scheme, token) in std::mem::take(&mut link.pending_auth) {
            link.authenticate(&scheme, &token);
        }
    }

    pub(super) fn network_lost(&self) {
        let mut link = self.link.lock();
        if link.connected {
            link.connected = false;
            link.lost_at = Some(Instant::now());
            link.emit(SessionEvent::Disconnected);
        }
    }

    pub(super) fn session_expired(&self, session: SessionId) {
        let mut link = self.link.lock();
        if link.session == Some(session) && !link.closed && !link.expired {
            link.connected = false;
            link.expired = true;
            link.emit(SessionEvent::Expired);
        }
    }

    fn resolve(&self, path: &str) -> String {
        match &self.chroot {
            Some(root) if path == "/" => root.clone(),
            Some(root) => format!("{root}{path}"),
            None => path.to_string(),
        }
    }

    /// The session and principals to issue an operation with.
    fn caller(&self) -> OperationResult<(SessionId, Vec<Id>)> {
        let link = self.link.lock();
        if link.closed || link.expired {
            return Err(OperationError::SessionExpired);
        }
        if !link.connected || !self.ensemble.is_network_up() {
            return Err(OperationError::ConnectionLoss);
        }
        let session = link.session.ok_or(OperationError::ConnectionLoss)?;
        Ok((session, link.principals.clone()))
    }
}

#[async_trait]
impl SessionHandle for InMemoryHandle {
    fn session_id(&self) -> Option<SessionId> {
        self.link.lock().session
    }

    fn add_auth_info(&self, scheme: &str, token: &[u8]) {
        let mut link = self.link.lock();
        if link.closed {
            return;
        }
        if link.connected {
            link.authenticate(scheme, token);
        } else {
            link.pending_auth
                .push((scheme.to_string(), Bytes::copy_from_slice(token)));
        }
    }

    fn disconnect(&self) {
        let session = {
            let mut link = self.link.lock();
            if link.closed {
                return;
            }
            link.closed = true;
            link.connected = false;
            link.events = None;
            link.session
        };
        self.ensemble.forget_handle(self.id);
        if let Some(session) = session {
            self.ensemble.close_session(session);
        }
        debug!(handle = self.id, session_id = ?session, "Connection disconnected");
    }

    async fn create(
        &self,
        path: &str,
        data: Bytes,
        acl: Vec<Acl>,
        mode: CreateMode,
    ) -> OperationResult<String> {
        let (session, principals) = self.caller()?;
        let caller = Caller {
            session,
            principals: &principals,
        };
        self.ensemble
            .tree
            .lock()
            .create(&self.resolve(path), data, acl, mode, caller)?;
        Ok(path.to_string())
    }

    async fn get_data(&self, path: &str) -> OperationResult<(Bytes, Stat)> {
        let (session, principals) = self.caller()?;
        let caller = Caller {
            session,
            principals: &principals,
        };
        self.ensemble.tree.lock().get(&self.resolve(path), caller)
    }

    async fn set_data(&self, path: &str, data: Bytes, version: i32) -> OperationResult<Stat> {
        let (session, principals) = self.caller()?;
        let caller = Caller {
            session,
            principals: &principals,
        };
        self.ensemble
            .tree
            .lock()
            .set(&self.resolve(path), data, version, caller)
    }

    async fn exists(&self, path: &str) -> OperationResult<Option<Stat>> {
        self.caller()?;
        Ok(self.ensemble.tree.lock().stat(&self.resolve(path)))
    }

    async fn delete(&self, path: &str, version: i32) -> OperationResult<()> {
        let (session, principals) = self.caller()?;
        let caller = Caller {
            session,
            principals: &principals,
        };
        self.ensemble
            .tree
            .lock()
            .delete(&self.resolve(path), version, caller)
    }
}
