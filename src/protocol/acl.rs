//! Access-control lists attached to stored nodes.
//!
//! 附加在存储节点上的访问控制列表。

use sha2::{Digest, Sha256};
use std::{fmt::Write as _, ops::BitOr};

/// A set of node permissions.
///
/// 节点权限集合。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Perms(u8);

impl Perms {
    pub const READ: Perms = Perms(1);
    pub const WRITE: Perms = Perms(1 << 1);
    pub const CREATE: Perms = Perms(1 << 2);
    pub const DELETE: Perms = Perms(1 << 3);
    pub const ADMIN: Perms = Perms(1 << 4);
    pub const ALL: Perms = Perms(0b1_1111);

    /// Returns true if every permission in `other` is granted by `self`.
    pub fn contains(self, other: Perms) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Perms {
    type Output = Perms;

    fn bitor(self, rhs: Self) -> Self::Output {
        Perms(self.0 | rhs.0)
    }
}

/// An authenticated principal: a scheme plus a scheme-specific identity.
///
/// 已认证主体：认证方案加上方案相关的身份。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Id {
    pub scheme: String,
    pub id: String,
}

impl Id {
    pub fn new(scheme: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            id: id.into(),
        }
    }

    /// Every connection, authenticated or not.
    pub fn anyone() -> Self {
        Self::new("world", "anyone")
    }

    /// Placeholder expanded at creation time into the creator's principals.
    pub fn authenticated() -> Self {
        Self::new("auth", "")
    }

    /// The digest principal for `user` authenticating with `password`.
    ///
    /// 使用 `password` 认证的 `user` 对应的摘要主体。
    pub fn digest(user: &str, password: &str) -> Self {
        let hash = Sha256::digest(format!("{user}:{password}").as_bytes());
        let mut id = String::with_capacity(user.len() + 1 + hash.len() * 2);
        id.push_str(user);
        id.push(':');
        for byte in hash {
            let _ = write!(id, "{byte:02x}");
        }
        Self::new("digest", id)
    }

    /// Derives the digest principal from a `user:password` auth token.
    pub fn digest_from_token(token: &[u8]) -> Option<Self> {
        let token = std::str::from_utf8(token).ok()?;
        let (user, password) = token.split_once(':')?;
        if user.is_empty() {
            return None;
        }
        Some(Self::digest(user, password))
    }
}

/// One ACL entry: `perms` granted to principals matching `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Acl {
    pub perms: Perms,
    pub id: Id,
}

impl Acl {
    pub fn new(perms: Perms, id: Id) -> Self {
        Self { perms, id }
    }

    /// Full rights for everyone.
    pub fn open_unsafe() -> Vec<Acl> {
        vec![Acl::new(Perms::ALL, Id::anyone())]
    }

    /// Read-only for everyone, full rights for the creator's principals.
    ///
    /// 所有人只读，创建者拥有全部权限。
    pub fn everyone_read_creator_all() -> Vec<Acl> {
        vec![
            Acl::new(Perms::READ, Id::anyone()),
            Acl::new(Perms::ALL, Id::authenticated()),
        ]
    }
}
