//! The ensemble's node store with ACL enforcement.

use crate::{
    error::{OperationError, OperationResult},
    protocol::{ANY_VERSION, Acl, CreateMode, Id, Perms, SessionId, Stat},
};
use bytes::Bytes;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Node {
    data: Bytes,
    acl: Vec<Acl>,
    version: i32,
    ephemeral_owner: Option<SessionId>,
}

impl Node {
    fn stat(&self) -> Stat {
        Stat {
            version: self.version,
            data_length: self.data.len(),
            ephemeral_owner: self.ephemeral_owner,
        }
    }

    fn permits(&self, caller: &Caller<'_>, perm: Perms) -> bool {
        let anyone = Id::anyone();
        self.acl.iter().any(|entry| {
            entry.perms.contains(perm)
                && (entry.id == anyone || caller.principals.contains(&entry.id))
        })
    }
}

/// The session and authenticated principals issuing an operation.
#[derive(Debug, Clone, Copy)]
pub(super) struct Caller<'a> {
    pub(super) session: SessionId,
    pub(super) principals: &'a [Id],
}

#[derive(Debug)]
pub(super) struct DataTree {
    nodes: BTreeMap<String, Node>,
}

impl DataTree {
    pub(super) fn new() -> Self {
        let root = Node {
            data: Bytes::new(),
            acl: Acl::open_unsafe(),
            version: 0,
            ephemeral_owner: None,
        };
        Self {
            nodes: BTreeMap::from([("/".to_string(), root)]),
        }
    }

    pub(super) fn create(
        &mut self,
        path: &str,
        data: Bytes,
        acl: Vec<Acl>,
        mode: CreateMode,
        caller: Caller<'_>,
    ) -> OperationResult<()> {
        let parent = parent_of(path).ok_or_else(|| bad_arguments(path))?;
        if self.nodes.contains_key(path) {
            return Err(OperationError::NodeExists {
                path: path.to_string(),
            });
        }
        let parent_node = self.nodes.get(parent).ok_or_else(|| no_node(parent))?;
        if parent_node.ephemeral_owner.is_some() {
            return Err(no_node(parent));
        }
        if !parent_node.permits(&caller, Perms::CREATE) {
            return Err(no_auth(parent));
        }

        let acl = expand_acl(path, acl, caller)?;
        let ephemeral_owner = match mode {
            CreateMode::Persistent => None,
            CreateMode::Ephemeral => Some(caller.session),
        };
        self.nodes.insert(
            path.to_string(),
            Node {
                data,
                acl,
                version: 0,
                ephemeral_owner,
            },
        );
        Ok(())
    }

    pub(super) fn get(&self, path: &str, caller: Caller<'_>) -> OperationResult<(Bytes, Stat)> {
        let node = self.nodes.get(path).ok_or_else(|| no_node(path))?;
        if !node.permits(&caller, Perms::READ) {
            return Err(no_auth(path));
        }
        Ok((node.data.clone(), node.stat()))
    }

    pub(super) fn set(
        &mut self,
        path: &str,
        data: Bytes,
        version: i32,
        caller: Caller<'_>,
    ) -> OperationResult<Stat> {
        let node = self.nodes.get_mut(path).ok_or_else(|| no_node(path))?;
        if !node.permits(&caller, Perms::WRITE) {
            return Err(no_auth(path));
        }
        check_version(path, node, version)?;
        node.data = data;
        node.version += 1;
        Ok(node.stat())
    }

    pub(super) fn stat(&self, path: &str) -> Option<Stat> {
        self.nodes.get(path).map(Node::stat)
    }

    pub(super) fn delete(
        &mut self,
        path: &str,
        version: i32,
        caller: Caller<'_>,
    ) -> OperationResult<()> {
        let parent = parent_of(path).ok_or_else(|| bad_arguments(path))?;
        let node = self.nodes.get(path).ok_or_else(|| no_node(path))?;
        check_version(path, node, version)?;
        if self.has_children(path) {
            return Err(OperationError::NotEmpty {
                path: path.to_string(),
            });
        }
        let parent_node = self.nodes.get(parent).ok_or_else(|| no_node(parent))?;
        if !parent_node.permits(&caller, Perms::DELETE) {
            return Err(no_auth(path));
        }
        self.nodes.remove(path);
        Ok(())
    }

    /// Removes every ephemeral node owned by `session`.
    pub(super) fn remove_ephemerals(&mut self, session: SessionId) -> usize {
        let before = self.nodes.len();
        self.nodes
            .retain(|_, node| node.ephemeral_owner != Some(session));
        before - self.nodes.len()
    }

    pub(super) fn data(&self, path: &str) -> Option<Bytes> {
        self.nodes.get(path).map(|node| node.data.clone())
    }

    fn has_children(&self, path: &str) -> bool {
        let prefix = format!("{path}/");
        self.nodes
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&prefix))
    }
}

/// The parent of a well-formed absolute path; `None` for the root or a
/// malformed path.
fn parent_of(path: &str) -> Option<&str> {
    if path == "/" || !path.starts_with('/') || path.ends_with('/') || path.contains("//") {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Replaces the `auth` placeholder with the creator's principals.
fn expand_acl(path: &str, acl: Vec<Acl>, caller: Caller<'_>) -> OperationResult<Vec<Acl>> {
    let invalid = || OperationError::InvalidAcl {
        path: path.to_string(),
    };
    if acl.is_empty() {
        return Err(invalid());
    }
    let mut expanded = Vec::with_capacity(acl.len());
    for entry in acl {
        if entry.id.scheme != "auth" {
            expanded.push(entry);
            continue;
        }
        if caller.principals.is_empty() {
            return Err(invalid());
        }
        expanded.extend(
            caller
                .principals
                .iter()
                .map(|principal| Acl::new(entry.perms, principal.clone())),
        );
    }
    Ok(expanded)
}

fn check_version(path: &str, node: &Node, expected: i32) -> OperationResult<()> {
    if expected != ANY_VERSION && expected != node.version {
        return Err(OperationError::BadVersion {
            path: path.to_string(),
            expected,
            actual: node.version,
        });
    }
    Ok(())
}

fn no_node(path: &str) -> OperationError {
    OperationError::NoNode {
        path: path.to_string(),
    }
}

fn bad_arguments(path: &str) -> OperationError {
    OperationError::BadArguments {
        path: path.to_string(),
    }
}

fn no_auth(path: &str) -> OperationError {
    OperationError::NoAuth {
        path: path.to_string(),
    }
}
