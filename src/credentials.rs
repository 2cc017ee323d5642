//! Authentication applied to every new connection.
//!
//! 应用于每个新连接的认证信息。

use crate::protocol::SessionHandle;
use bytes::Bytes;
use tracing::debug;

/// One `(scheme, token)` authentication pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    pub scheme: String,
    pub token: Bytes,
}

/// An immutable set of authentication pairs, fixed at construction.
///
/// Authentication is per connection, so the session manager applies the full
/// set to the handle of every epoch before exposing it to callers.
///
/// 构造后不可变的认证信息集合。认证针对连接而言，因此会话管理器会在每一轮
/// 连接的句柄暴露给调用者之前，重新应用全部认证信息。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    entries: Vec<AuthInfo>,
}

impl Credentials {
    /// Anonymous access.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Bytes)>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(scheme, token)| AuthInfo { scheme, token })
                .collect(),
        }
    }

    /// Digest authentication as `user` with `password`.
    ///
    /// 使用 `user` 和 `password` 的摘要认证。
    pub fn digest(user: &str, password: &str) -> Self {
        Self::new([(
            "digest".to_string(),
            Bytes::from(format!("{user}:{password}")),
        )])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[AuthInfo] {
        &self.entries
    }

    /// Adds every pair to a freshly created connection.
    pub fn apply(&self, handle: &dyn SessionHandle) {
        for auth in &self.entries {
            debug!(scheme = %auth.scheme, "Applying credentials to new connection");
            handle.add_auth_info(&auth.scheme, &auth.token);
        }
    }
}
