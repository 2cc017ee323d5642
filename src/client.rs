//! The user-facing client.

use crate::{
    config::Config,
    credentials::Credentials,
    error::Result,
    protocol::{Connector, SessionEvent, SessionId},
    session::{ListenerId, Session, SessionManager, SessionState},
};
use std::{future::Future, sync::Arc, time::Duration};

/// A shared, lazily connected handle to the ensemble.
///
/// Cloning is cheap; clones share the same session. While a session is live
/// every `get` returns it without connecting again. Transient disconnects are
/// left to the underlying client, which resumes the same session. After
/// [`close`](Self::close), or when the ensemble expires the session, the next
/// `get` connects anew and receives a different session.
///
/// 一个共享的、惰性连接的集群句柄。克隆开销很小，所有克隆共享同一会话。
#[derive(Debug, Clone)]
pub struct KeeperClient {
    manager: Arc<SessionManager>,
}

impl KeeperClient {
    /// Creates a client. No connection is made until the first `get`.
    ///
    /// 创建客户端。在第一次调用 `get` 之前不会建立连接。
    pub fn new(config: Config, credentials: Credentials, connector: Arc<dyn Connector>) -> Self {
        Self {
            manager: SessionManager::new(config, credentials, connector),
        }
    }

    /// Returns the live session, waiting as long as it takes to establish one.
    ///
    /// Dropping the returned future while it waits aborts the connection attempt.
    pub async fn get(&self) -> Result<Session> {
        self.manager.get(None, std::future::pending()).await
    }

    /// Returns the live session, or fails with
    /// [`Error::ConnectionTimeout`](crate::Error::ConnectionTimeout) if none is
    /// established within `timeout`. A timeout leaves the client closed.
    ///
    /// 返回当前会话；若在 `timeout` 内未建立则失败，并使客户端处于关闭状态。
    pub async fn get_timeout(&self, timeout: Duration) -> Result<Session> {
        self.manager.get(Some(timeout), std::future::pending()).await
    }

    /// Returns the live session, or fails with
    /// [`Error::Interrupted`](crate::Error::Interrupted) if `interrupt`
    /// resolves first. An interruption leaves the client closed.
    pub async fn get_or_interrupt<F>(&self, interrupt: F) -> Result<Session>
    where
        F: Future<Output = ()>,
    {
        self.manager.get(None, interrupt).await
    }

    /// Disposes the current session, if any. Idempotent.
    pub fn close(&self) {
        self.manager.close();
    }

    /// True when no usable session is held and the next `get` connects anew.
    pub fn is_closed(&self) -> bool {
        self.manager.is_closed()
    }

    pub fn state(&self) -> SessionState {
        self.manager.state()
    }

    /// The current session identifier, only while connected.
    pub fn session_id(&self) -> Option<SessionId> {
        self.manager.session_id()
    }

    pub fn has_credentials(&self) -> bool {
        !self.manager.credentials().is_empty()
    }

    /// Registers a listener for connection-state events of the current session.
    ///
    /// Listeners run outside the client's lock and may call back into it.
    ///
    /// 注册当前会话连接状态事件的监听器。监听器在客户端锁之外运行，可以回调客户端。
    pub fn register_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.manager.listeners().register(Arc::new(listener))
    }

    /// Registers a handler invoked when the ensemble expires the session.
    pub fn register_expiration_handler<F>(&self, handler: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register_listener(move |event| {
            if *event == SessionEvent::Expired {
                handler();
            }
        })
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.manager.listeners().unregister(id)
    }
}
