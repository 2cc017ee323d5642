//! Bridges connection-state callbacks of the underlying client into the
//! session manager.
//!
//! 将底层客户端的连接状态回调桥接到会话管理器。

use super::manager::SessionManager;
use crate::protocol::SessionEvent;
use std::sync::Weak;
use tracing::{trace, warn};

/// Receives connection-state events for the connection of one epoch.
///
/// A watcher is handed to [`Connector::connect`](crate::protocol::Connector)
/// and may be invoked from any thread, at any time, including after its epoch
/// has ended. Events from a connection that is no longer current are dropped.
///
/// 接收某一轮连接的状态事件。监视器可能在任意线程、任意时刻被调用，
/// 包括其所属轮次结束之后；来自非当前连接的事件会被丢弃。
#[derive(Clone)]
pub struct ConnectionWatcher {
    manager: Weak<SessionManager>,
    epoch: u64,
}

impl std::fmt::Debug for ConnectionWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionWatcher")
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl ConnectionWatcher {
    pub(crate) fn new(manager: Weak<SessionManager>, epoch: u64) -> Self {
        Self { manager, epoch }
    }

    /// The epoch whose connection this watcher observes.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Delivers one event.
    ///
    /// The lock is held only while the state machine runs; waiters are woken
    /// and listeners invoked after it is released.
    ///
    /// 投递一个事件。仅在状态机运行期间持有锁；唤醒等待者和调用监听器都在释放锁之后。
    pub fn process(&self, event: SessionEvent) {
        let Some(manager) = self.manager.upgrade() else {
            trace!(
                epoch = self.epoch,
                event = event.name(),
                "Session manager gone, dropping event"
            );
            return;
        };

        let current = {
            let mut inner = manager.lock();
            if inner.state().epoch_id() == Some(self.epoch) {
                if let Err(e) = manager.on_state_event(&mut inner, &event) {
                    warn!(
                        epoch = self.epoch,
                        event = event.name(),
                        error = %e,
                        "Failed to apply session event"
                    );
                }
                true
            } else {
                trace!(
                    epoch = self.epoch,
                    current = ?inner.state().epoch_id(),
                    event = event.name(),
                    "Ignoring event from a stale connection"
                );
                false
            }
        };

        // Broadcast even for no-op events.
        manager.wake_all();
        if current {
            manager.listeners().dispatch(&event);
        }
    }
}
