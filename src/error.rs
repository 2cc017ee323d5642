//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use std::time::Duration;
use thiserror::Error;

/// The primary error type for the session client.
/// 会话客户端的主要错误类型。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// `get_timeout` did not observe an established session in time. The epoch
    /// was aborted; calling `get` again starts a fresh one.
    ///
    /// `get_timeout` 未能在时限内等到会话建立。本轮连接已中止，再次调用 `get` 会开始新一轮。
    #[error("Timed out after {timeout:?} waiting for a session")]
    ConnectionTimeout { timeout: Duration },

    /// A blocked `get` was interrupted before the session was established.
    /// 阻塞中的 `get` 在会话建立前被中断。
    #[error("Interrupted while waiting for a session")]
    Interrupted,

    /// The connection parameters can never produce a connection.
    /// 连接参数无效，永远无法建立连接。
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The underlying client refused to start a connection.
    /// 底层客户端拒绝发起连接。
    #[error("Failed to start connection: {0}")]
    Connect(String),

    /// The ensemble rejected the credentials applied to the epoch's connection.
    /// 集群拒绝了本轮连接所使用的凭据。
    #[error("Authentication failed for scheme {scheme:?}")]
    AuthFailed { scheme: String },

    /// The state machine was asked to perform a transition it does not allow.
    /// 状态机被要求执行不允许的状态转换。
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: &'static str,
        to: &'static str,
    },

    /// An operation on a live session failed. These are passed through verbatim.
    /// 会话上的操作失败，原样透传。
    #[error(transparent)]
    Operation(#[from] OperationError),
}

/// Server-reported failures of individual coordination operations.
///
/// 单个协调操作由服务端报告的失败。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("Connection to the ensemble was lost")]
    ConnectionLoss,

    #[error("Session has expired")]
    SessionExpired,

    #[error("Not authorized to access {path}")]
    NoAuth { path: String },

    #[error("Version mismatch on {path}: expected {expected}, found {actual}")]
    BadVersion {
        path: String,
        expected: i32,
        actual: i32,
    },

    #[error("Node {path} does not exist")]
    NoNode { path: String },

    #[error("Node {path} already exists")]
    NodeExists { path: String },

    #[error("Node {path} has children")]
    NotEmpty { path: String },

    #[error("Invalid ACL for {path}")]
    InvalidAcl { path: String },

    /// The path is malformed or names a node the operation cannot apply to.
    #[error("Invalid arguments for {path}")]
    BadArguments { path: String },

    #[error("Session authentication failed")]
    AuthFailed,
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

/// Result of a single operation issued on a [`Session`](crate::session::Session).
pub type OperationResult<T> = std::result::Result<T, OperationError>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        match err {
            Error::ConnectionTimeout { .. } => ErrorKind::TimedOut.into(),
            Error::Interrupted => ErrorKind::Interrupted.into(),
            Error::InvalidConfig(msg) => std::io::Error::new(ErrorKind::InvalidInput, msg),
            Error::Connect(msg) => std::io::Error::new(ErrorKind::ConnectionRefused, msg),
            Error::AuthFailed { .. } => ErrorKind::PermissionDenied.into(),
            e @ Error::InvalidStateTransition { .. } => std::io::Error::other(e),
            Error::Operation(op) => op.into(),
        }
    }
}

impl From<OperationError> for std::io::Error {
    fn from(err: OperationError) -> Self {
        use std::io::ErrorKind;
        let kind = match &err {
            OperationError::ConnectionLoss => ErrorKind::ConnectionAborted,
            OperationError::SessionExpired => ErrorKind::ConnectionReset,
            OperationError::NoAuth { .. } | OperationError::AuthFailed => {
                ErrorKind::PermissionDenied
            }
            OperationError::NoNode { .. } => ErrorKind::NotFound,
            OperationError::NodeExists { .. } => ErrorKind::AlreadyExists,
            OperationError::BadVersion { .. }
            | OperationError::NotEmpty { .. }
            | OperationError::InvalidAcl { .. }
            | OperationError::BadArguments { .. } => ErrorKind::InvalidInput,
        };
        std::io::Error::new(kind, err)
    }
}
