//! Value types shared by the session core and connector implementations.
//!
//! 会话核心与连接器实现共享的值类型。

use std::fmt;

/// Version sentinel that matches any node version in conditional writes.
/// 条件写入中匹配任意节点版本的哨兵值。
pub const ANY_VERSION: i32 = -1;

/// Opaque identifier of a server-tracked session.
///
/// 服务端跟踪的会话的不透明标识符。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Connection-state notifications delivered by the underlying client.
///
/// 底层客户端投递的连接状态通知。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection is (re-)established and its session is live.
    /// 连接已（重新）建立，会话处于活跃状态。
    Connected,
    /// The connection dropped; the session survives if it reconnects in time.
    /// 连接断开；若能及时重连，会话仍然有效。
    Disconnected,
    /// The ensemble discarded the session.
    /// 集群已丢弃该会话。
    Expired,
    /// The ensemble rejected the credentials for `scheme`.
    /// 集群拒绝了 `scheme` 方案的凭据。
    AuthFailed { scheme: String },
}

impl SessionEvent {
    /// Gets the event name (for logging).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Expired => "Expired",
            Self::AuthFailed { .. } => "AuthFailed",
        }
    }
}

/// How a node outlives the session that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateMode {
    #[default]
    Persistent,
    /// Removed when the creating session closes or expires.
    Ephemeral,
}

/// Node metadata returned by reads and writes.
///
/// 读写操作返回的节点元数据。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Number of writes applied to the node's data.
    pub version: i32,
    pub data_length: usize,
    /// Owning session of an ephemeral node, `None` for persistent nodes.
    pub ephemeral_owner: Option<SessionId>,
}
