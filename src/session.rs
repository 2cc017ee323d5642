//! The session core: connection state, the shared-lock manager, the per-epoch
//! watcher and the handle given out to callers.
//!
//! 会话核心：连接状态、共享锁管理器、每轮的监视器以及交给调用者的句柄。

mod handle;
mod listeners;
mod manager;
mod state;
mod watcher;

pub use handle::Session;
pub use listeners::{EventListener, ListenerId};
pub use state::SessionState;
pub use watcher::ConnectionWatcher;

pub(crate) use manager::SessionManager;

#[cfg(test)]
mod tests;
