//! The contract between this crate and the coordination-service client it drives.
//!
//! The session core never speaks the wire protocol itself. It asks a
//! [`Connector`] for a new connection once per epoch, applies credentials to
//! the returned [`SessionHandle`], and learns about connection state through the
//! [`SessionEvent`]s delivered to the epoch's watcher.
//!
//! 本库与其所驱动的协调服务客户端之间的契约。

pub mod acl;
pub mod traits;
pub mod types;

pub use acl::{Acl, Id, Perms};
pub use traits::{Connector, SessionHandle};
pub use types::{ANY_VERSION, CreateMode, SessionEvent, SessionId, Stat};
