//! 定义了会话连接的可配置参数。
//! Defines configurable parameters for session connections.

use crate::error::{Error, Result};
use std::time::Duration;

/// A structure containing all configurable parameters for a session.
///
/// 包含会话所有可配置参数的结构体。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The ensemble members, each as `host:port`.
    /// 集群成员列表，每项格式为 `host:port`。
    pub servers: Vec<String>,

    /// The requested session timeout. The ensemble may negotiate it into its
    /// own bounds.
    /// 请求的会话超时时间。集群可能会将其协商到自身允许的范围内。
    pub session_timeout: Duration,

    /// An optional path every node path is resolved under.
    /// 可选的根路径，所有节点路径都将基于该路径解析。
    pub chroot_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: vec!["127.0.0.1:2181".to_string()],
            session_timeout: Duration::from_secs(10),
            chroot_path: None,
        }
    }
}

impl Config {
    /// Creates a configuration for the given ensemble members with default timeouts.
    ///
    /// 使用默认超时为给定集群成员创建配置。
    pub fn new<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            servers: servers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Checks that these parameters can produce a connection at all.
    ///
    /// Failures here are fatal: they are reported to the caller of `get` and
    /// never retried.
    ///
    /// 检查这些参数是否可能建立连接。此处的失败是致命的，不会重试。
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::InvalidConfig("no ensemble members configured".into()));
        }
        for server in &self.servers {
            validate_server(server)?;
        }
        if self.session_timeout.is_zero() {
            return Err(Error::InvalidConfig("session timeout must be non-zero".into()));
        }
        if let Some(chroot) = &self.chroot_path {
            validate_chroot(chroot)?;
        }
        Ok(())
    }

    /// The chroot path with the trivial root `/` normalised away.
    pub fn effective_chroot(&self) -> Option<&str> {
        self.chroot_path.as_deref().filter(|path| *path != "/")
    }
}

fn validate_server(server: &str) -> Result<()> {
    let invalid = || Error::InvalidConfig(format!("malformed ensemble member {server:?}"));
    let (host, port) = server.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(invalid());
    }
    Ok(())
}

fn validate_chroot(chroot: &str) -> Result<()> {
    if chroot == "/" {
        return Ok(());
    }
    let malformed = !chroot.starts_with('/')
        || chroot.ends_with('/')
        || chroot[1..].split('/').any(str::is_empty);
    if malformed {
        return Err(Error::InvalidConfig(format!("malformed chroot path {chroot:?}")));
    }
    Ok(())
}
