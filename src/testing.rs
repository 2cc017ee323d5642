//! 测试辅助工具模块
//! Test utilities module
//!
//! An in-process ensemble implementing [`Connector`](crate::protocol::Connector)
//! so the session core can be exercised without a live cluster: networks can be
//! cut and restored, sessions expired, and ACLs are enforced on a small node tree.

pub mod ensemble;
mod handle;
mod tree;

pub use ensemble::{EnsembleConfig, InMemoryEnsemble};
pub use handle::InMemoryHandle;
