//! Traits for abstracting over the coordination-service client implementation.
use super::{
    acl::Acl,
    types::{CreateMode, SessionId, Stat},
};
use crate::{
    config::Config,
    error::{OperationResult, Result},
    session::ConnectionWatcher,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{fmt::Debug, sync::Arc};

/// A live (or still establishing) connection to the ensemble.
///
/// This trait allows for abstracting over the underlying client library,
/// enabling in-memory implementations for testing.
///
/// 到集群的活跃（或正在建立的）连接。
///
/// 此trait允许对底层客户端库进行抽象，从而可以使用内存实现进行测试。
#[async_trait]
pub trait SessionHandle: Debug + Send + Sync + 'static {
    /// The server-assigned session, once one has been established.
    fn session_id(&self) -> Option<SessionId>;

    /// Queues authentication information for this connection. The ensemble
    /// reports rejection through [`SessionEvent::AuthFailed`](super::SessionEvent).
    fn add_auth_info(&self, scheme: &str, token: &[u8]);

    /// Terminates the connection and invalidates its session server-side.
    /// Must not block and must not deliver further events.
    ///
    /// 终止连接并使其服务端会话失效。不得阻塞，也不得再投递事件。
    fn disconnect(&self);

    async fn create(
        &self,
        path: &str,
        data: Bytes,
        acl: Vec<Acl>,
        mode: CreateMode,
    ) -> OperationResult<String>;

    async fn get_data(&self, path: &str) -> OperationResult<(Bytes, Stat)>;

    async fn set_data(&self, path: &str, data: Bytes, version: i32) -> OperationResult<Stat>;

    async fn exists(&self, path: &str) -> OperationResult<Option<Stat>>;

    async fn delete(&self, path: &str, version: i32) -> OperationResult<()>;
}

/// Starts connections to the ensemble.
///
/// `connect` is called with the session manager's lock held. It must return
/// without waiting for the connection to be established, and it must deliver
/// events to `watcher` from its own context rather than inline.
///
/// 发起到集群的连接。`connect` 在会话管理器持有锁时被调用：必须立即返回，
/// 且必须在自身的上下文中（而非内联地）向 `watcher` 投递事件。
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, config: &Config, watcher: ConnectionWatcher)
    -> Result<Arc<dyn SessionHandle>>;
}
