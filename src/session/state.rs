//! Defines the session state machine.
//!
//! 定义会话状态机。

use super::handle::Session;
use crate::{
    error::Error,
    protocol::{SessionHandle, SessionId},
};
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// Observable phase of the session manager.
///
/// 会话管理器可观察到的阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No connection has ever been requested.
    /// 尚未请求过任何连接。
    Initial,
    /// A connection attempt is in flight; callers wait for it.
    /// 连接尝试进行中；调用者等待其完成。
    Connecting,
    /// The session is established and shared with every caller.
    /// 会话已建立并与所有调用者共享。
    Connected,
    /// The last epoch ended; the next `get` starts a new one.
    /// 上一轮已结束；下一次 `get` 将开始新的一轮。
    Closed,
}

impl SessionState {
    /// Gets the state name (for logging).
    pub fn name(self) -> &'static str {
        match self {
            Self::Initial => "Initial",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Closed => "Closed",
        }
    }

    /// Validate if state transition is legal.
    /// 验证状态转换是否合法
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Initial | Closed, Connecting)
                | (Connecting, Connected)
                | (Connecting | Connected, Closed)
        )
    }
}

/// Why an epoch ended before or after its session was established.
///
/// 一轮连接结束的原因。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EndCause {
    TimedOut(Duration),
    Interrupted,
    /// The waiting future was dropped.
    Cancelled,
    Closed,
    Expired,
    AuthFailed(String),
}

impl EndCause {
    /// The error reported to the caller whose wait ended the epoch.
    pub(crate) fn to_error(&self) -> Error {
        match self {
            Self::TimedOut(timeout) => Error::ConnectionTimeout { timeout: *timeout },
            Self::AuthFailed(scheme) => Error::AuthFailed {
                scheme: scheme.clone(),
            },
            Self::Interrupted | Self::Cancelled | Self::Closed | Self::Expired => {
                Error::Interrupted
            }
        }
    }
}

/// One connection attempt and the session it produces.
///
/// The epoch exclusively owns its handle; dropping the epoch disconnects it, so
/// every path that leaves `Connecting`/`Connected` disposes the connection.
///
/// 一次连接尝试及其产生的会话。该轮独占其句柄；丢弃时断开连接，
/// 因此所有离开 `Connecting`/`Connected` 的路径都会释放连接。
#[derive(Debug)]
pub(crate) struct Epoch {
    id: u64,
    handle: Arc<dyn SessionHandle>,
    session_id: Option<SessionId>,
}

impl Epoch {
    pub(crate) fn new(id: u64, handle: Arc<dyn SessionHandle>) -> Self {
        Self {
            id,
            handle,
            session_id: None,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub(crate) fn session(&self) -> Session {
        Session::new(self.handle.clone())
    }

    /// Re-reads the server-assigned session from the handle.
    pub(crate) fn refresh_session_id(&mut self) -> Option<SessionId> {
        self.session_id = self.handle.session_id();
        self.session_id
    }
}

impl Drop for Epoch {
    fn drop(&mut self) {
        debug!(epoch = self.id, session_id = ?self.session_id, "Disposing connection");
        self.handle.disconnect();
    }
}

/// The manager's state, carrying the epoch while one is live.
///
/// 管理器的状态，在一轮连接存活期间携带该轮数据。
#[derive(Debug)]
pub(crate) enum ConnectionState {
    Initial,
    Connecting(Epoch),
    Connected(Epoch),
    Closed,
}

impl ConnectionState {
    pub(crate) fn phase(&self) -> SessionState {
        match self {
            Self::Initial => SessionState::Initial,
            Self::Connecting(_) => SessionState::Connecting,
            Self::Connected(_) => SessionState::Connected,
            Self::Closed => SessionState::Closed,
        }
    }

    pub(crate) fn epoch(&self) -> Option<&Epoch> {
        match self {
            Self::Connecting(epoch) | Self::Connected(epoch) => Some(epoch),
            Self::Initial | Self::Closed => None,
        }
    }

    pub(crate) fn epoch_id(&self) -> Option<u64> {
        self.epoch().map(Epoch::id)
    }

    /// The epoch still waiting for its session, if any.
    pub(crate) fn connecting_epoch(&self) -> Option<u64> {
        match self {
            Self::Connecting(epoch) => Some(epoch.id()),
            _ => None,
        }
    }

    /// The live session, only while connected.
    pub(crate) fn session(&self) -> Option<Session> {
        match self {
            Self::Connected(epoch) => Some(epoch.session()),
            _ => None,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        matches!(self, Self::Initial | Self::Closed)
    }
}
