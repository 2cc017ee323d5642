#![deny(clippy::expect_used, clippy::unwrap_used)]

//! A resilient handle to a coordination-service ensemble.
//! 协调服务集群的弹性会话句柄。
//!
//! [`KeeperClient`] lazily connects on first use, shares one live session
//! between every caller, rides out transient disconnects without losing the
//! session, and starts a brand-new session after an explicit close.

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod protocol;
pub mod session;
pub mod testing;

pub use client::KeeperClient;
pub use config::Config;
pub use credentials::Credentials;
pub use error::{Error, OperationError, Result};
pub use protocol::SessionEvent;
pub use session::{Session, SessionState};
