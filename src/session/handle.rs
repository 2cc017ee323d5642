//! The user-facing handle to the current session.

use crate::{
    error::OperationResult,
    protocol::{Acl, CreateMode, SessionHandle, SessionId, Stat},
};
use bytes::Bytes;
use std::sync::Arc;

/// A borrowed reference to the manager's live connection.
///
/// Cloning is cheap. The connection stays owned by the session manager: a
/// `Session` can issue operations but can never dispose the connection, and
/// operation failures (connection loss, permission denied, version conflicts,
/// missing nodes) are returned exactly as the ensemble reported them.
///
/// 对管理器当前连接的借用引用。克隆开销很小。连接始终归会话管理器所有：
/// `Session` 可以发起操作，但不能释放连接；操作失败按集群报告原样返回。
#[derive(Debug, Clone)]
pub struct Session {
    handle: Arc<dyn SessionHandle>,
}

impl Session {
    pub(crate) fn new(handle: Arc<dyn SessionHandle>) -> Self {
        Self { handle }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.handle.session_id()
    }

    /// Returns true if both refer to the same underlying connection.
    ///
    /// 如果两者指向同一个底层连接，则返回 true。
    pub fn ptr_eq(&self, other: &Session) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.handle), Arc::as_ptr(&other.handle))
    }

    pub async fn create(
        &self,
        path: &str,
        data: impl Into<Bytes>,
        acl: Vec<Acl>,
        mode: CreateMode,
    ) -> OperationResult<String> {
        self.handle.create(path, data.into(), acl, mode).await
    }

    pub async fn get_data(&self, path: &str) -> OperationResult<(Bytes, Stat)> {
        self.handle.get_data(path).await
    }

    pub async fn set_data(
        &self,
        path: &str,
        data: impl Into<Bytes>,
        version: i32,
    ) -> OperationResult<Stat> {
        self.handle.set_data(path, data.into(), version).await
    }

    pub async fn exists(&self, path: &str) -> OperationResult<Option<Stat>> {
        self.handle.exists(path).await
    }

    pub async fn delete(&self, path: &str, version: i32) -> OperationResult<()> {
        self.handle.delete(path, version).await
    }
}
